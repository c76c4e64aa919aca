// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submission::Submission;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_REMOVE_ON_COMPLETE: usize = 10;
pub const DEFAULT_REMOVE_ON_FAIL: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

/// Enqueued by ResultCoordinator, dequeued by a single worker at a time, removed after the
/// result is published or attempts are exhausted. State transitions are monotonic through
/// `waiting -> active -> (completed | failed)`; a `failed` job with retries remaining returns
/// to `waiting` after its backoff delay (see `job_queue::retry`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub job_id: Uuid,
    pub submission: Submission,
    pub attempt_count: u32,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(submission: Submission) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            submission,
            attempt_count: 0,
            state: JobState::Waiting,
            last_error: None,
        }
    }

    pub fn has_attempts_remaining(&self, max_attempts: u32) -> bool {
        self.attempt_count < max_attempts
    }
}
