// Copyright 2019 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! A cloneable handle to the process's tokio runtime, trimmed from the teacher's `Executor`
//! (`engine/task_executor`) down to what this core's fire-and-forget spawns need.
//!
//! The teacher's version ferries thread-local stdio destinations and workunit-store parent
//! handles into every spawned task, because pantsd multiplexes many concurrent Pants runs
//! through one process and a spawned future must inherit the run that spawned it. This
//! workspace has no such multiplexing — one `server` process serves every connection — so
//! that context-propagation machinery has no counterpart here. What does carry over is the
//! "spawn and log, never silently drop, never panic the caller" posture, used by
//! `result_coordinator`'s best-effort audit-history write (spec.md §4.4 step 6: "failure to
//! persist history MUST NOT fail the request") and by `room_fabric`'s per-connection fan-out.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Executor {
    handle: Handle,
}

impl Executor {
    /// Captures the `Handle` of the tokio runtime this is called from. Panics outside of a
    /// runtime context, the same contract as `tokio::runtime::Handle::current`.
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Spawns `future` and logs (rather than propagates) a panic or early-drop, for call sites
    /// that must never let a background failure surface to the caller awaiting something
    /// else — e.g. the audit-history append after a submission's result has already been
    /// returned to the HTTP caller.
    pub fn spawn_and_log<F>(&self, description: &'static str, future: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.handle.spawn(async move {
            if let Err(e) = future.await {
                log::warn!("background task {description} failed: {e}");
            }
        });
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawn_runs_the_future() {
        let executor = Executor::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        executor
            .spawn(async move {
                ran2.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawn_and_log_does_not_propagate_failure() {
        let executor = Executor::new();
        executor.spawn_and_log("test task", async { Err("boom".to_owned()) });
        // Give the spawned task a tick to run; the call above must not have panicked or
        // blocked regardless.
        tokio::task::yield_now().await;
    }
}
