// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The `execution-worker` binary (spec.md §4.2): one process, `worker_concurrency` concurrent
//! job slots, each draining the shared `job_queue` and running submissions through the
//! sandbox. A deployment runs a pool of these, any replica able to pick up any job.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use execution_worker::{run_pool, Worker};
use job_queue::{JobQueue, JobQueueConfig};
use kvs::RedisKvs;
use runtime_config::{LanguageTable, ProcessConfig};
use sandbox_executor::SandboxExecutor;
use tokio::sync::watch;

const LEASE_RECOVERY_INTERVAL: Duration = Duration::from_secs(10);
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<(), String> {
    logging::init();
    let config = ProcessConfig::from_env();

    if let Some(endpoint) = &config.container_runtime_endpoint {
        // SAFETY: single-threaded startup path, before any other task reads the environment.
        std::env::set_var("DOCKER_HOST", endpoint);
    }

    let languages = Arc::new(
        match std::env::var("RUNTIME_CONFIG_LANGUAGE_FILE") {
            Ok(path) => LanguageTable::load_from_file(std::path::Path::new(&path)),
            Err(_) => LanguageTable::load_default(),
        }
        .map_err(|e| format!("failed to load language table: {e}"))?,
    );

    let kvs = Arc::new(
        RedisKvs::connect(&config.kvs_url)
            .await
            .map_err(|e| format!("failed to start: KVS unreachable: {e}"))?,
    );

    let queue = JobQueue::new(
        kvs.clone(),
        JobQueueConfig {
            max_attempts: config.job_max_attempts,
            backoff_base_ms: config.job_backoff_base_ms,
            ..JobQueueConfig::default()
        },
    );

    let executor = Arc::new(
        SandboxExecutor::connect(std::env::temp_dir())
            .map_err(|e| format!("failed to start: container runtime unreachable: {e}"))?,
    );

    let worker = Arc::new(Worker::new(
        queue.clone(),
        kvs,
        languages,
        executor,
        config.max_source_bytes,
        config.kvs_result_ttl_secs,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_router = Router::new().route("/healthz", get(|| async { "ok" }));
    let health_addr = format!("0.0.0.0:{}", config.worker_health_port);
    let health_listener = tokio::net::TcpListener::bind(&health_addr)
        .await
        .map_err(|e| format!("failed to bind health endpoint on {health_addr}: {e}"))?;
    let health_shutdown = shutdown_tx.subscribe();
    let health_server = tokio::spawn(async move {
        let mut health_shutdown = health_shutdown;
        let _ = axum::serve(health_listener, health_router)
            .with_graceful_shutdown(async move {
                let _ = health_shutdown.changed().await;
            })
            .await;
    });

    let lease_recovery_queue = queue.clone();
    let mut lease_shutdown = shutdown_tx.subscribe();
    let lease_recovery = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(LEASE_RECOVERY_INTERVAL) => {
                    if let Err(e) = lease_recovery_queue.recover_expired_leases().await {
                        log::warn!("lease recovery sweep failed: {e}");
                    }
                }
                _ = lease_shutdown.changed() => break,
            }
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| format!("failed to install SIGTERM handler: {e}"))?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("shutdown signal received, draining in-flight executions");
        let _ = shutdown_tx.send(true);
    });

    run_pool(worker, config.worker_concurrency, QUEUE_POLL_INTERVAL, shutdown_rx).await;

    let _ = lease_recovery.await;
    let _ = health_server.await;
    Ok(())
}
