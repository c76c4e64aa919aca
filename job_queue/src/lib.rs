// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! A durable, at-least-once FIFO job queue built on top of `kvs` (spec.md §4.3). One job moves
//! through `waiting -> active -> (completed | failed)`; a failed job with attempts remaining
//! returns to `waiting` after an exponential backoff delay instead of going terminal.
//!
//! Built on the `kvs` primitives rather than talking to Redis directly, the same layering the
//! teacher draws between `sharded_lmdb` (raw storage) and `graph`/`engine` (the thing that
//! actually schedules work on top of it).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use domain::{Job, JobState};
use kvs::KvStore;
use uuid::Uuid;

const WAITING_KEY: &str = "jobqueue:waiting";
const ACTIVE_KEY: &str = "jobqueue:active";
const LEASES_KEY: &str = "jobqueue:leases";
const COMPLETED_KEY: &str = "jobqueue:completed";
const FAILED_KEY: &str = "jobqueue:failed";
/// Orphaned job records (never claimed, never trimmed) expire on their own rather than
/// accumulating forever if a worker crashes mid-job.
const JOB_RECORD_TTL_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone, Copy)]
pub struct JobQueueConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub remove_on_complete: usize,
    pub remove_on_fail: usize,
    /// A lease older than this is assumed to belong to a crashed worker and is recovered by
    /// `recover_expired_leases`.
    pub visibility_timeout_ms: u64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: domain::job::DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: 500,
            remove_on_complete: domain::job::DEFAULT_REMOVE_ON_COMPLETE,
            remove_on_fail: domain::job::DEFAULT_REMOVE_ON_FAIL,
            visibility_timeout_ms: 30_000,
        }
    }
}

pub struct JobQueue<K: KvStore> {
    kvs: Arc<K>,
    config: JobQueueConfig,
}

impl<K: KvStore> Clone for JobQueue<K> {
    fn clone(&self) -> Self {
        Self {
            kvs: self.kvs.clone(),
            config: self.config,
        }
    }
}

impl<K: KvStore> JobQueue<K> {
    pub fn new(kvs: Arc<K>, config: JobQueueConfig) -> Self {
        Self { kvs, config }
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }

    /// Enqueues `job`, immediately eligible for dequeue.
    pub async fn enqueue(&self, job: &Job) -> Result<(), String> {
        self.save(job).await?;
        self.kvs
            .zadd(WAITING_KEY, &job.job_id.to_string(), now_millis())
            .await
    }

    /// Claims the single oldest job whose eligible-time has arrived, if any, marking it
    /// `active` and recording a lease for crash recovery.
    pub async fn dequeue(&self) -> Result<Option<Job>, String> {
        let ready = self.kvs.zpop_ready(WAITING_KEY, now_millis(), 1).await?;
        let Some(job_id) = ready.into_iter().next() else {
            return Ok(None);
        };
        let Some(mut job) = self.load(&job_id).await? else {
            log::warn!("dequeued job {job_id} has no stored record, dropping");
            return Ok(None);
        };
        job.attempt_count += 1;
        job.state = JobState::Active;
        self.save(&job).await?;
        self.kvs.sadd(ACTIVE_KEY, &job_id).await?;
        self.kvs
            .hset(LEASES_KEY, &job_id, &now_millis().to_string())
            .await?;
        Ok(Some(job))
    }

    /// Marks `job` completed and trims the completed set down to `remove_on_complete` entries,
    /// deleting the trimmed-out job records.
    pub async fn complete(&self, mut job: Job) -> Result<(), String> {
        job.state = JobState::Completed;
        self.release_active(&job.job_id).await?;
        self.save(&job).await?;
        self.retire(COMPLETED_KEY, &job.job_id, self.config.remove_on_complete)
            .await
    }

    /// Records a failed attempt. Reschedules `job` onto `waiting` with an exponential backoff
    /// if attempts remain, otherwise marks it terminally `failed`.
    pub async fn fail(&self, mut job: Job, error: String) -> Result<(), String> {
        self.release_active(&job.job_id).await?;
        job.last_error = Some(error);

        if job.has_attempts_remaining(self.config.max_attempts) {
            job.state = JobState::Waiting;
            self.save(&job).await?;
            let delay_ms = self.config.backoff_base_ms * 2u64.pow(job.attempt_count.saturating_sub(1));
            self.kvs
                .zadd(
                    WAITING_KEY,
                    &job.job_id.to_string(),
                    now_millis() + delay_ms as f64,
                )
                .await
        } else {
            job.state = JobState::Failed;
            self.save(&job).await?;
            self.retire(FAILED_KEY, &job.job_id, self.config.remove_on_fail)
                .await
        }
    }

    /// Sweeps the active set for leases older than `visibility_timeout_ms` and requeues their
    /// jobs, treating an expired lease the same as a failed attempt (spec.md §4.3: workers can
    /// die mid-execution; a submission must not be stuck forever as a result).
    pub async fn recover_expired_leases(&self) -> Result<usize, String> {
        let active_ids = self.kvs.smembers(ACTIVE_KEY).await?;
        let now = now_millis();
        let mut recovered = 0usize;

        for job_id in active_ids {
            let Some(leased_at) = self.kvs.hget(LEASES_KEY, &job_id).await? else {
                continue;
            };
            let leased_at: f64 = leased_at.parse().unwrap_or(now);
            if now - leased_at < self.config.visibility_timeout_ms as f64 {
                continue;
            }
            let Some(job) = self.load(&job_id).await? else {
                self.release_active(&parse_job_id(&job_id)?).await?;
                continue;
            };
            log::warn!("recovering job {job_id} whose lease expired without completion");
            self.fail(job, "worker lease expired before completion".to_owned())
                .await?;
            recovered += 1;
        }

        Ok(recovered)
    }

    async fn release_active(&self, job_id: &Uuid) -> Result<(), String> {
        let id = job_id.to_string();
        self.kvs.srem(ACTIVE_KEY, &id).await?;
        self.kvs.hdel(LEASES_KEY, &id).await
    }

    async fn retire(&self, retention_key: &str, job_id: &Uuid, keep: usize) -> Result<(), String> {
        self.kvs
            .zadd(retention_key, &job_id.to_string(), now_millis())
            .await?;
        let trimmed = self.kvs.ztrim(retention_key, keep).await?;
        for stale_id in trimmed {
            self.kvs.del(&job_key(&stale_id)).await?;
        }
        Ok(())
    }

    async fn save(&self, job: &Job) -> Result<(), String> {
        let payload = serde_json::to_string(job).map_err(|e| format!("failed to encode job: {e}"))?;
        self.kvs
            .set_ex(&job_key(&job.job_id.to_string()), &payload, JOB_RECORD_TTL_SECS)
            .await
    }

    /// Reads the current record for `job_id` without claiming it. Used by
    /// `result_coordinator`'s poll loop to observe state transitions it doesn't own.
    pub async fn get(&self, job_id: Uuid) -> Result<Option<Job>, String> {
        self.load(&job_id.to_string()).await
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>, String> {
        let Some(payload) = self.kvs.get(&job_key(job_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| format!("failed to decode job {job_id}: {e}"))
    }
}

fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

fn parse_job_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw).map_err(|e| format!("malformed job id {raw}: {e}"))
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Submission;
    use kvs::InMemoryKvs;

    fn sample_job() -> Job {
        Job::new(Submission::new(
            "python",
            "print('hi')",
            None,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn enqueued_job_is_immediately_dequeueable() {
        let queue = JobQueue::new(Arc::new(InMemoryKvs::new()), JobQueueConfig::default());
        let job = sample_job();
        queue.enqueue(&job).await.unwrap();

        let dequeued = queue.dequeue().await.unwrap().expect("job should be ready");
        assert_eq!(dequeued.job_id, job.job_id);
        assert_eq!(dequeued.attempt_count, 1);
        assert_eq!(dequeued.state, JobState::Active);
    }

    #[tokio::test]
    async fn empty_queue_dequeues_nothing() {
        let queue = JobQueue::new(Arc::new(InMemoryKvs::new()), JobQueueConfig::default());
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_job_with_attempts_remaining_is_rescheduled_not_dropped() {
        let config = JobQueueConfig {
            max_attempts: 3,
            ..JobQueueConfig::default()
        };
        let queue = JobQueue::new(Arc::new(InMemoryKvs::new()), config);
        let job = sample_job();
        queue.enqueue(&job).await.unwrap();
        let dequeued = queue.dequeue().await.unwrap().unwrap();

        queue.fail(dequeued, "boom".to_owned()).await.unwrap();

        // Backoff pushes the next-eligible-time into the future, so it isn't ready yet.
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_job_past_max_attempts_goes_terminal() {
        let config = JobQueueConfig {
            max_attempts: 1,
            ..JobQueueConfig::default()
        };
        let queue = JobQueue::new(Arc::new(InMemoryKvs::new()), config);
        let job = sample_job();
        queue.enqueue(&job).await.unwrap();
        let dequeued = queue.dequeue().await.unwrap().unwrap();

        queue.fail(dequeued, "boom".to_owned()).await.unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_observes_state_without_claiming_the_job() {
        let queue = JobQueue::new(Arc::new(InMemoryKvs::new()), JobQueueConfig::default());
        let job = sample_job();
        queue.enqueue(&job).await.unwrap();

        let observed = queue.get(job.job_id).await.unwrap().expect("job should exist");
        assert_eq!(observed.state, JobState::Waiting);

        // Observing does not claim it — dequeue still sees it as ready.
        assert!(queue.dequeue().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn completing_a_job_releases_its_lease() {
        let queue = JobQueue::new(Arc::new(InMemoryKvs::new()), JobQueueConfig::default());
        let job = sample_job();
        queue.enqueue(&job).await.unwrap();
        let dequeued = queue.dequeue().await.unwrap().unwrap();
        let job_id = dequeued.job_id;

        queue.complete(dequeued).await.unwrap();

        assert_eq!(queue.recover_expired_leases().await.unwrap(), 0);
        let _ = job_id;
    }
}
