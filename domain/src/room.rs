// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_CAPACITY: u32 = 2;
pub const MAX_CAPACITY: u32 = 50;

/// Created on demand, deleted when the owner leaves. The durable store owns this entity;
/// this core only reads/writes it through the `durable_store::RoomStore` trait.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub room_id: Uuid,
    pub owner_id: Uuid,
    pub is_public: bool,
    pub password_hash: Option<String>,
    pub capacity: u32,
    pub current_language_id: String,
    pub last_code: String,
    pub last_input: String,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&self.capacity) {
            return Err(format!(
                "capacity {} out of [{MIN_CAPACITY}, {MAX_CAPACITY}]",
                self.capacity
            ));
        }
        if !self.is_public && self.password_hash.is_none() {
            return Err("private rooms must carry a password hash".to_owned());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

/// A (userId, roomId) relation with a role. Exactly one owner per room; at most one membership
/// per (user, room).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// One entry in a Room's durable execution history, appended by ResultCoordinator as the
/// audit record for a finished (or timed-out) submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionLogEntry {
    pub room_id: Uuid,
    pub submission_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
