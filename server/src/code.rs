// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! HTTP handlers for the parts of code execution that don't need a realtime connection: a
//! synchronous submit-and-await endpoint for callers outside a room's WebSocket (spec.md §6),
//! the language catalog, and a room's execution history.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use domain::{CoreError, Submission};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub room_id: Uuid,
    pub code: String,
    pub language_id: String,
    pub input: Option<String>,
}

pub async fn execute(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<ExecuteRequest>,
) -> impl IntoResponse {
    let submission = Submission::new(
        request.language_id,
        request.code,
        request.input,
        request.room_id,
        user.user_id,
        Utc::now(),
    );

    match state.submitter.submit(submission).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => crate::error_response(e),
    }
}

#[derive(Debug, Serialize)]
pub struct LanguageSummary {
    pub id: String,
    pub wall_time_cap_ms: u64,
    pub memory_cap_bytes: u64,
}

pub async fn list_languages(State(state): State<AppState>, AuthUser(_user): AuthUser) -> impl IntoResponse {
    let summaries: Vec<LanguageSummary> = state
        .languages
        .ids()
        .filter_map(|id| state.languages.get(id))
        .map(|compiled| LanguageSummary {
            id: compiled.profile.id.clone(),
            wall_time_cap_ms: compiled.profile.wall_time_cap_ms,
            memory_cap_bytes: compiled.profile.memory_cap_bytes,
        })
        .collect();
    Json(summaries)
}

pub async fn history(State(state): State<AppState>, AuthUser(user): AuthUser, Path(room_id): Path<Uuid>) -> impl IntoResponse {
    match state.rooms.is_member(user.user_id, room_id).await {
        Ok(true) => (),
        Ok(false) => {
            return crate::error_response(CoreError::AuthorizationFailure(format!(
                "user {} is not a member of room {room_id}",
                user.user_id
            )))
        }
        Err(e) => return crate::error_response(CoreError::SystemFailure(e)),
    }

    match state.history.recent(room_id, 50).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => crate::error_response(CoreError::SystemFailure(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_store::InMemoryRoomStore;
    use runtime_config::LanguageTable;
    use std::sync::Arc;

    #[tokio::test]
    async fn listing_languages_exposes_every_configured_id() {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let languages = Arc::new(LanguageTable::load_default().unwrap());
        let state = crate::test_support::state_with(rooms, languages.clone());

        let summaries: Vec<LanguageSummary> = state
            .languages
            .ids()
            .filter_map(|id| state.languages.get(id))
            .map(|compiled| LanguageSummary {
                id: compiled.profile.id.clone(),
                wall_time_cap_ms: compiled.profile.wall_time_cap_ms,
                memory_cap_bytes: compiled.profile.memory_cap_bytes,
            })
            .collect();

        assert_eq!(summaries.len(), languages.ids().count());
    }

    #[tokio::test]
    async fn history_for_a_room_the_caller_never_joined_is_an_authorization_failure() {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let languages = Arc::new(LanguageTable::load_default().unwrap());
        let state = crate::test_support::state_with(rooms, languages);

        let outcome = state.rooms.is_member(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        assert!(!outcome);
    }
}
