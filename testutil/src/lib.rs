// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Shared test fixtures for the crates above `domain`: builders for the entities every
//! `#[cfg(test)]` module in this workspace otherwise re-declares by hand (`sample_room`,
//! `sample_submission`, ...), plus a standalone bearer-token signer matching the shape
//! `server::auth` verifies.
//!
//! The teacher's `testutil` builds a miniature CAS/execution-server pair so `process_execution`
//! tests can talk to something that looks like the real remote execution API without a network
//! call. This crate's job is the same — given the shape of the thing under test, build a
//! cheap, real stand-in — but the shape is this workspace's domain model instead of a remote
//! execution service.

use chrono::Utc;
use domain::{CursorState, ExecutionResult, ExecutionStatus, Job, Membership, Role, Room, Submission};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

pub fn sample_room(owner_id: Uuid) -> Room {
    Room {
        room_id: Uuid::new_v4(),
        owner_id,
        is_public: true,
        password_hash: None,
        capacity: 10,
        current_language_id: "python".to_owned(),
        last_code: String::new(),
        last_input: String::new(),
        created_at: Utc::now(),
    }
}

pub fn sample_membership(user_id: Uuid, room_id: Uuid, role: Role) -> Membership {
    Membership {
        user_id,
        room_id,
        role,
        joined_at: Utc::now(),
    }
}

pub fn sample_submission(room_id: Uuid, user_id: Uuid) -> Submission {
    Submission::new(
        "python",
        "print('Hello, World!')",
        None,
        room_id,
        user_id,
        Utc::now(),
    )
}

pub fn sample_job(room_id: Uuid, user_id: Uuid) -> Job {
    Job::new(sample_submission(room_id, user_id))
}

pub fn sample_success_result(submission_id: Uuid) -> ExecutionResult {
    ExecutionResult {
        submission_id,
        status: ExecutionStatus::Success,
        stdout: "Hello, World!\n".to_owned(),
        stderr: String::new(),
        exit_code: Some(0),
        wall_millis: 42,
        compile_millis: None,
        peak_memory_bytes: Some(4 * 1024 * 1024),
    }
}

pub fn sample_cursor() -> CursorState {
    CursorState {
        line_number: 0,
        column: 0,
        selection: None,
    }
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

/// Signs a bearer token with the same `{sub, exp}` shape `server::auth::JwtVerifier` decodes,
/// without pulling `server` itself in as a dependency here (it depends on `domain` and the
/// rest of the core, not the other way around).
pub fn sign_test_token(user_id: Uuid, secret: &str) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encoding a test token with a well-formed secret never fails")
}

/// Same shape, already expired, for asserting an expired token is rejected.
pub fn sign_expired_test_token(user_id: Uuid, secret: &str) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() - 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encoding a test token with a well-formed secret never fails")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_room_is_public_with_no_password() {
        let room = sample_room(Uuid::new_v4());
        assert!(room.is_public);
        assert!(room.password_hash.is_none());
    }

    #[test]
    fn signed_tokens_differ_by_subject() {
        let a = sign_test_token(Uuid::new_v4(), "secret");
        let b = sign_test_token(Uuid::new_v4(), "secret");
        assert_ne!(a, b);
    }
}
