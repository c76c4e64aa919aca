// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The `server` binary: terminates HTTP and WebSocket connections, authenticates every one of
//! them, and bridges into the durable job queue (for execution) and the in-process room fabric
//! (for realtime collaboration). A deployment runs one or a small fixed number of these in
//! front of the `execution-worker` pool, which scales independently (spec.md §4).

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use durable_store::{InMemoryHistoryStore, InMemoryRoomStore};
use job_queue::{JobQueue, JobQueueConfig};
use kvs::RedisKvs;
use result_coordinator::{ResultCoordinator, ResultCoordinatorConfig};
use room_fabric::{ExecutionSubmitter, RoomFabric};
use runtime_config::{LanguageTable, ProcessConfig};
use server::{router, AppState, CoordinatorSubmitter};
use task_executor::Executor;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), String> {
    logging::init();
    let config = ProcessConfig::from_env();

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

    let rooms = Arc::new(InMemoryRoomStore::new());
    let history = Arc::new(InMemoryHistoryStore::new());

    let sockets = kvs.clone();

    let coordinator = Arc::new(ResultCoordinator::new(
        queue,
        kvs,
        rooms.clone(),
        history.clone(),
        languages.clone(),
        Executor::new(),
        ResultCoordinatorConfig {
            max_source_bytes: config.max_source_bytes,
            poll_budget: Duration::from_millis(config.result_poll_budget_ms),
            poll_interval: Duration::from_millis(config.result_poll_interval_ms),
            result_ttl_secs: config.kvs_result_ttl_secs,
        },
    ));

    let submitter: Arc<dyn ExecutionSubmitter> = Arc::new(CoordinatorSubmitter::new(coordinator.clone()));
    let fabric = Arc::new(RoomFabric::new(
        rooms.clone(),
        history.clone(),
        submitter.clone(),
        Executor::new(),
        sockets,
        config.socket_map_ttl_secs,
    ));

    let state = AppState {
        jwt: server::auth::JwtVerifier::new(config.token_signing_secret.clone()),
        rooms,
        history,
        languages,
        submitter,
        fabric,
    };

    let cors = match config.frontend_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        Err(e) => {
            log::warn!(
                "frontend origin {:?} is not a valid header value ({e}); falling back to a permissive CORS policy",
                config.frontend_origin
            );
            CorsLayer::permissive()
        }
    };

    let app = router(state, cors);

    let addr = format!("0.0.0.0:{}", config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;
    log::info!("server listening on {addr}");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| format!("failed to install SIGTERM handler: {e}"))?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("shutdown signal received, draining in-flight connections");
        let _ = shutdown_tx.send(true);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await
        .map_err(|e| format!("server exited with an error: {e}"))
}
