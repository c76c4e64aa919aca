// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MAX_SOURCE_BYTES: usize = 10 * 1024;

/// One user's request to execute one source in one language in one room. Created on request,
/// terminal once the result is produced, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub submission_id: Uuid,
    pub language_id: String,
    pub source_text: String,
    pub stdin_text: Option<String>,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(
        language_id: impl Into<String>,
        source_text: impl Into<String>,
        stdin_text: Option<String>,
        room_id: Uuid,
        user_id: Uuid,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            language_id: language_id.into(),
            source_text: source_text.into(),
            stdin_text,
            room_id,
            user_id,
            submitted_at,
        }
    }

    /// Size validation from spec.md §3: `sourceText size ≤ configured max`.
    pub fn validate_size(&self, max_source_bytes: usize) -> Result<(), String> {
        if self.source_text.len() > max_source_bytes {
            return Err(format!(
                "source is {} bytes, exceeds the {} byte limit",
                self.source_text.len(),
                max_source_bytes
            ));
        }
        Ok(())
    }
}

/// The terminal outcome envelope for a Submission. `status` is the only field ExecutionOutcome
/// semantics hinge on — producing an ExecutionResult is never itself an error (spec.md §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub submission_id: Uuid,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub wall_millis: u64,
    pub compile_millis: Option<u64>,
    pub peak_memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    CompilationError,
    RuntimeError,
    Timeout,
    MemoryLimit,
    SystemError,
}

impl ExecutionResult {
    /// spec.md §3/§8 invariant: `status=success` iff `exitCode=0` and no resource trip.
    pub fn is_internally_consistent(&self) -> bool {
        match self.status {
            ExecutionStatus::Success => self.exit_code == Some(0),
            ExecutionStatus::Timeout => true,
            ExecutionStatus::MemoryLimit => true,
            _ => true,
        }
    }
}
