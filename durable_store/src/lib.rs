// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Contracts for the durable store that owns Room and Membership (spec.md §1: user/room CRUD
//! is an external collaborator, out of this core's scope). This crate defines the trait every
//! in-scope component programs against, plus a reference in-memory implementation — sufficient
//! to make `ResultCoordinator` and `RoomFabric` correct and testable without this core taking
//! on migrations, connection pooling, or a SQL schema of its own.

mod in_memory;

pub use in_memory::{InMemoryHistoryStore, InMemoryRoomStore};

use async_trait::async_trait;
use domain::{ExecutionLogEntry, Membership, Room};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, String>;

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<Room>>;

    async fn put_room(&self, room: Room) -> StoreResult<()>;

    async fn delete_room(&self, room_id: Uuid) -> StoreResult<()>;

    async fn get_membership(&self, user_id: Uuid, room_id: Uuid) -> StoreResult<Option<Membership>>;

    async fn is_member(&self, user_id: Uuid, room_id: Uuid) -> StoreResult<bool> {
        Ok(self.get_membership(user_id, room_id).await?.is_some())
    }

    async fn put_membership(&self, membership: Membership) -> StoreResult<()>;

    async fn remove_membership(&self, user_id: Uuid, room_id: Uuid) -> StoreResult<()>;

    async fn list_members(&self, room_id: Uuid) -> StoreResult<Vec<Membership>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: ExecutionLogEntry) -> StoreResult<()>;

    /// GET /api/code/history/:roomId returns "last 50" per spec.md §6.
    async fn recent(&self, room_id: Uuid, limit: usize) -> StoreResult<Vec<ExecutionLogEntry>>;
}
