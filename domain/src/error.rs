// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::fmt;

/// The taxonomy of errors a caller (HTTP handler or realtime event handler) can see. Every
/// fallible operation in this workspace resolves to one of these, never to a raw `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Missing/invalid bearer credential, or the user it names no longer exists.
    AuthFailure(String),
    /// The caller is authenticated but lacks the membership/role the operation requires.
    AuthorizationFailure(String),
    /// Malformed payload, unknown language, oversize source, or similar caller mistake.
    ValidationFailure(String),
    /// Room full, room not found, duplicate join, and other state conflicts.
    ResourceFailure(String),
    /// Queue, KVS, durable store, or container runtime unreachable. Logged with a correlation
    /// id by the caller; never allowed to unwind past the request/event boundary.
    SystemFailure(String),
}

impl CoreError {
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::AuthFailure(_) => 401,
            CoreError::AuthorizationFailure(_) => 403,
            CoreError::ValidationFailure(_) => 400,
            CoreError::ResourceFailure(_) => 404,
            CoreError::SystemFailure(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CoreError::AuthFailure(m)
            | CoreError::AuthorizationFailure(m)
            | CoreError::ValidationFailure(m)
            | CoreError::ResourceFailure(m)
            | CoreError::SystemFailure(m) => m,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for CoreError {}

pub type CoreResult<T> = Result<T, CoreError>;
