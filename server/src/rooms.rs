// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! HTTP handlers for room creation and lookup (spec.md §6). Joining, leaving, kicking, and
//! settings changes all happen over the realtime connection (`room_fabric`'s event dispatch) so
//! every member sees the resulting roster change live; these two handlers exist only for the
//! parts of a room's lifecycle that precede having a connection at all.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use domain::{CoreError, Membership, Role, Room};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub is_public: bool,
    pub password: Option<String>,
    pub capacity: u32,
    pub language_id: String,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room_id: Uuid,
    pub owner_id: Uuid,
    pub is_public: bool,
    pub capacity: u32,
    pub current_language_id: String,
    pub member_count: usize,
}

pub async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateRoomRequest>,
) -> impl IntoResponse {
    match create_room_inner(&state, user.user_id, request).await {
        Ok(room) => (axum::http::StatusCode::CREATED, Json(room_response(&state, &room).await)).into_response(),
        Err(e) => crate::error_response(e),
    }
}

async fn create_room_inner(state: &AppState, owner_id: Uuid, request: CreateRoomRequest) -> Result<Room, CoreError> {
    if !request.is_public && request.password.is_none() {
        return Err(CoreError::ValidationFailure("private rooms require a password".to_owned()));
    }
    if !state.languages.contains(&request.language_id) {
        return Err(CoreError::ValidationFailure(format!("unknown language id {}", request.language_id)));
    }

    let room = Room {
        room_id: Uuid::new_v4(),
        owner_id,
        is_public: request.is_public,
        password_hash: request.password,
        capacity: request.capacity,
        current_language_id: request.language_id,
        last_code: String::new(),
        last_input: String::new(),
        created_at: Utc::now(),
    };
    room.validate().map_err(CoreError::ValidationFailure)?;

    state.rooms.put_room(room.clone()).await.map_err(CoreError::SystemFailure)?;
    state
        .rooms
        .put_membership(Membership {
            user_id: owner_id,
            room_id: room.room_id,
            role: Role::Owner,
            joined_at: Utc::now(),
        })
        .await
        .map_err(CoreError::SystemFailure)?;

    Ok(room)
}

pub async fn get_room(State(state): State<AppState>, AuthUser(_user): AuthUser, Path(room_id): Path<Uuid>) -> impl IntoResponse {
    match state.rooms.get_room(room_id).await {
        Ok(Some(room)) => Json(room_response(&state, &room).await).into_response(),
        Ok(None) => crate::error_response(CoreError::ResourceFailure(format!("room {room_id} not found"))),
        Err(e) => crate::error_response(CoreError::SystemFailure(e)),
    }
}

async fn room_response(state: &AppState, room: &Room) -> RoomResponse {
    let member_count = state.rooms.list_members(room.room_id).await.map(|m| m.len()).unwrap_or(0);
    RoomResponse {
        room_id: room.room_id,
        owner_id: room.owner_id,
        is_public: room.is_public,
        capacity: room.capacity,
        current_language_id: room.current_language_id.clone(),
        member_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_store::InMemoryRoomStore;
    use runtime_config::LanguageTable;
    use std::sync::Arc;

    #[tokio::test]
    async fn private_room_without_a_password_is_rejected() {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let languages = Arc::new(LanguageTable::load_default().unwrap());
        let request = CreateRoomRequest {
            is_public: false,
            password: None,
            capacity: 10,
            language_id: "python".to_owned(),
        };

        let state = crate::test_support::state_with(rooms, languages);
        let err = create_room_inner(&state, Uuid::new_v4(), request).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailure(_)));
    }

    #[tokio::test]
    async fn creating_a_room_makes_the_creator_its_owner() {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let languages = Arc::new(LanguageTable::load_default().unwrap());
        let owner_id = Uuid::new_v4();
        let request = CreateRoomRequest {
            is_public: true,
            password: None,
            capacity: 10,
            language_id: "python".to_owned(),
        };

        let state = crate::test_support::state_with(rooms.clone(), languages);
        let room = create_room_inner(&state, owner_id, request).await.unwrap();

        let membership = rooms.get_membership(owner_id, room.room_id).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::Owner);
    }
}
