// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! `AppState` builders for this crate's own handler tests, standing in for the Redis-backed
//! coordinator a real deployment wires up in `bin/server.rs` with a stub that never actually
//! executes anything — the handler tests below only exercise the HTTP/room-membership surface.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{CoreResult, ExecutionResult, Submission};
use durable_store::{InMemoryHistoryStore, InMemoryRoomStore};
use room_fabric::{ExecutionSubmitter, RoomFabric};
use runtime_config::LanguageTable;
use task_executor::Executor;

use crate::auth::JwtVerifier;
use crate::AppState;

struct UnreachableSubmitter;

#[async_trait]
impl ExecutionSubmitter for UnreachableSubmitter {
    async fn submit(&self, _submission: Submission) -> CoreResult<ExecutionResult> {
        panic!("test tried to execute code through a stub submitter");
    }
}

pub fn state_with(rooms: Arc<InMemoryRoomStore>, languages: Arc<LanguageTable>) -> AppState {
    let history = Arc::new(InMemoryHistoryStore::new());
    let submitter: Arc<dyn ExecutionSubmitter> = Arc::new(UnreachableSubmitter);
    let sockets = Arc::new(kvs::InMemoryKvs::new());
    let fabric = Arc::new(RoomFabric::new(
        rooms.clone(),
        history.clone(),
        submitter.clone(),
        Executor::new(),
        sockets,
        3600,
    ));

    AppState {
        jwt: JwtVerifier::new("test-secret".to_owned()),
        rooms,
        history,
        languages,
        submitter,
        fabric,
    }
}
