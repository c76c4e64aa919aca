// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Wires the sandboxed execution engine, durable job queue, and realtime room fabric
//! (spec.md's three [MODULE]s) behind one HTTP + WebSocket surface.
//!
//! `AppState` fixes concrete types rather than threading `ResultCoordinator<K, R, H>`'s three
//! generic parameters through every axum handler signature — a handler's `State<AppState>`
//! extraction needs a single concrete, `Clone`-able type, the same reason the teacher's own
//! `pantsd` process state (`PantsDaemonCore`) is a concrete struct rather than a generic one
//! even though the engine underneath it is built from generic `Rule` graphs. Room/membership
//! storage stays on `durable_store`'s in-memory reference implementation (see that crate's
//! doc comment: the real store is an external collaborator, out of this core's scope); the job
//! queue and execution-result handoff use `RedisKvs` because that leg genuinely crosses a
//! process boundary, to the worker pool.

pub mod auth;
pub mod code;
pub mod rooms;
pub mod ws;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use domain::{CoreError, CoreResult, ExecutionResult, Submission};
use durable_store::{InMemoryHistoryStore, InMemoryRoomStore};
use kvs::RedisKvs;
use result_coordinator::ResultCoordinator;
use room_fabric::{ExecutionSubmitter, RoomFabric};
use runtime_config::LanguageTable;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::JwtVerifier;

pub type Coordinator = ResultCoordinator<RedisKvs, InMemoryRoomStore, InMemoryHistoryStore>;

/// State shared by every handler. Execution submission is reached only through the
/// `ExecutionSubmitter` trait object, the same boundary `room_fabric` programs against, so
/// this struct never names `ResultCoordinator`'s backing `KvStore`/`RoomStore`/`HistoryStore`
/// type parameters and stays trivially constructible in tests.
#[derive(Clone)]
pub struct AppState {
    pub jwt: JwtVerifier,
    pub rooms: Arc<InMemoryRoomStore>,
    pub history: Arc<InMemoryHistoryStore>,
    pub languages: Arc<LanguageTable>,
    pub submitter: Arc<dyn ExecutionSubmitter>,
    pub fabric: Arc<RoomFabric<InMemoryRoomStore>>,
}

/// Bridges `room_fabric`'s narrow `ExecutionSubmitter` trait to the concrete coordinator, so
/// `room_fabric` and `AppState` never have to know `ResultCoordinator`'s generic parameters.
pub struct CoordinatorSubmitter {
    coordinator: Arc<Coordinator>,
}

impl CoordinatorSubmitter {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl ExecutionSubmitter for CoordinatorSubmitter {
    async fn submit(&self, submission: Submission) -> CoreResult<ExecutionResult> {
        self.coordinator.submit_and_await(submission).await
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps every `CoreError` to its spec.md §7 HTTP status, with a JSON body a frontend can parse
/// without string-matching the message.
pub(crate) fn error_response(error: CoreError) -> Response {
    let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody { error: error.message().to_owned() })).into_response()
}

/// `cors` is built by the caller from `ProcessConfig::frontend_origin` (`bin/server.rs`) rather
/// than hardcoded here, so a test can pass a permissive layer without this crate needing to
/// know about `runtime_config`'s env-parsing.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/rooms", post(rooms::create_room))
        .route("/api/rooms/:room_id", get(rooms::get_room))
        .route("/api/code/execute", post(code::execute))
        .route("/api/code/languages", get(code::list_languages))
        .route("/api/code/history/:room_id", get(code::history))
        .route("/ws", get(ws::ws_upgrade))
        .route("/healthz", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}
