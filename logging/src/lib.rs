// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Process-wide logging bootstrap shared by the `server` and `execution-worker` binaries.
//!
//! The teacher's own `logging` crate bridges pantsd's Python log levels into `log::Level` and
//! writes a `fatal_log!` escape hatch that bypasses the usual sinks. Neither concern applies
//! here — there is no embedding Python process and no pantsd-style daemon log file — so this
//! crate is trimmed to what every binary in this workspace actually needs: one
//! `env_logger::Builder` initialized exactly once, with a correlation id attached to every
//! `SystemFailure` line (spec.md §7) so it can be traced across the gateway/worker boundary.

use std::io::Write;

use uuid::Uuid;

/// Generates a correlation id for a single request/event/job, to be logged alongside every
/// `SystemFailure` per spec.md §7 ("logged with a correlation id"). Callers thread the
/// returned string through their own log lines; this crate does not hold any task-local state
/// for it, unlike the teacher's `stdio`/`workunit_store` context propagation, because nothing
/// here crosses an FFI boundary that would make implicit propagation worth the complexity.
pub fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Initializes the process-wide logger from `RUST_LOG`, defaulting to `info` when unset.
/// Idempotent: a second call is a no-op rather than a panic, since library crates' own tests
/// may race a binary's `main` for initialization order.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    builder
        .parse_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                chrono::Utc::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(correlation_id(), correlation_id());
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
