// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use domain::{CursorState, ExecutionResult, UserDescriptor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound events a connected client may send, namespaced `room:`/`code:`/`cursor:` per
/// spec.md §4.5's event table. `disconnect` has no client payload — the transport layer
/// (`server::ws`) calls `RoomFabric::disconnect` directly instead of routing it through here.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "room:join")]
    RoomJoin { room_id: Uuid, password: Option<String> },
    #[serde(rename = "room:leave")]
    RoomLeave { room_id: Uuid },
    #[serde(rename = "room:kick-user")]
    RoomKickUser { room_id: Uuid, target_user_id: Uuid },
    #[serde(rename = "room:update-settings")]
    RoomUpdateSettings {
        room_id: Uuid,
        is_public: Option<bool>,
        capacity: Option<u32>,
    },
    #[serde(rename = "code:update")]
    CodeUpdate {
        room_id: Uuid,
        code: String,
        language_id: Option<String>,
    },
    #[serde(rename = "code:language-change")]
    CodeLanguageChange { room_id: Uuid, language_id: String },
    #[serde(rename = "code:input-update")]
    CodeInputUpdate { room_id: Uuid, input: String },
    #[serde(rename = "code:execute")]
    CodeExecute {
        room_id: Uuid,
        code: String,
        language_id: String,
        input: Option<String>,
    },
    #[serde(rename = "cursor:position")]
    CursorPosition { room_id: Uuid, cursor: CursorState },
    #[serde(rename = "code:sync-request")]
    CodeSyncRequest { room_id: Uuid },
}

impl ClientEvent {
    /// The `roomId` every event carries — used to run the universal `isMember` check
    /// (spec.md §4.5) before any handler-specific logic runs.
    pub fn room_id(&self) -> Uuid {
        match self {
            ClientEvent::RoomJoin { room_id, .. }
            | ClientEvent::RoomLeave { room_id }
            | ClientEvent::RoomKickUser { room_id, .. }
            | ClientEvent::RoomUpdateSettings { room_id, .. }
            | ClientEvent::CodeUpdate { room_id, .. }
            | ClientEvent::CodeLanguageChange { room_id, .. }
            | ClientEvent::CodeInputUpdate { room_id, .. }
            | ClientEvent::CodeExecute { room_id, .. }
            | ClientEvent::CursorPosition { room_id, .. }
            | ClientEvent::CodeSyncRequest { room_id } => *room_id,
        }
    }

    /// The `<domain>:error` prefix an authorization/validation failure for this event is
    /// reported under (spec.md §4.5: "non-members receive a typed error event").
    pub fn error_domain(&self) -> &'static str {
        match self {
            ClientEvent::RoomJoin { .. }
            | ClientEvent::RoomLeave { .. }
            | ClientEvent::RoomKickUser { .. }
            | ClientEvent::RoomUpdateSettings { .. } => "room",
            ClientEvent::CodeUpdate { .. }
            | ClientEvent::CodeLanguageChange { .. }
            | ClientEvent::CodeInputUpdate { .. }
            | ClientEvent::CodeExecute { .. }
            | ClientEvent::CodeSyncRequest { .. } => "code",
            ClientEvent::CursorPosition { .. } => "cursor",
        }
    }
}

/// Outbound events, fanned out to one connection, a room except its sender, or an entire room.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "room:user-joined")]
    RoomUserJoined { user: UserDescriptor },
    #[serde(rename = "room:users")]
    RoomUsers { users: Vec<UserDescriptor> },
    #[serde(rename = "room:user-left")]
    RoomUserLeft { user_id: Uuid },
    /// Sent to every remaining member when the owner leaves (spec.md §8 scenario S5: the room
    /// itself is deleted, not just the owner's membership).
    #[serde(rename = "room:closed")]
    RoomClosed { room_id: Uuid },
    #[serde(rename = "code:updated")]
    CodeUpdated {
        code: String,
        language_id: Option<String>,
    },
    #[serde(rename = "code:language-changed")]
    CodeLanguageChanged { language_id: String },
    #[serde(rename = "code:input-updated")]
    CodeInputUpdated { input: String },
    #[serde(rename = "code:execution-started")]
    CodeExecutionStarted { submission_id: Uuid },
    #[serde(rename = "code:execution-result")]
    CodeExecutionResult { result: ExecutionResult },
    #[serde(rename = "cursor:position-updated")]
    CursorPositionUpdated { user_id: Uuid, cursor: CursorState },
    #[serde(rename = "code:sync-response")]
    CodeSyncResponse {
        code: String,
        language_id: String,
        input: String,
    },
    /// `domain` carries the `room`/`code`/`cursor` prefix so the client can route the error to
    /// the right part of its UI without parsing `message`.
    #[serde(rename = "error")]
    Error { domain: String, message: String },
}
