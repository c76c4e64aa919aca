// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ExecutionLogEntry, Membership, Room};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{HistoryStore, RoomStore, StoreResult};

#[derive(Clone, Default)]
pub struct InMemoryRoomStore {
    rooms: Arc<RwLock<HashMap<Uuid, Room>>>,
    memberships: Arc<RwLock<HashMap<(Uuid, Uuid), Membership>>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<Room>> {
        Ok(self.rooms.read().get(&room_id).cloned())
    }

    async fn put_room(&self, room: Room) -> StoreResult<()> {
        self.rooms.write().insert(room.room_id, room);
        Ok(())
    }

    async fn delete_room(&self, room_id: Uuid) -> StoreResult<()> {
        self.rooms.write().remove(&room_id);
        self.memberships
            .write()
            .retain(|(_, room), _| *room != room_id);
        Ok(())
    }

    async fn get_membership(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(self.memberships.read().get(&(user_id, room_id)).cloned())
    }

    async fn put_membership(&self, membership: Membership) -> StoreResult<()> {
        self.memberships
            .write()
            .insert((membership.user_id, membership.room_id), membership);
        Ok(())
    }

    async fn remove_membership(&self, user_id: Uuid, room_id: Uuid) -> StoreResult<()> {
        self.memberships.write().remove(&(user_id, room_id));
        Ok(())
    }

    async fn list_members(&self, room_id: Uuid) -> StoreResult<Vec<Membership>> {
        Ok(self
            .memberships
            .read()
            .values()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    entries: Arc<RwLock<Vec<ExecutionLogEntry>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: ExecutionLogEntry) -> StoreResult<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn recent(&self, room_id: Uuid, limit: usize) -> StoreResult<Vec<ExecutionLogEntry>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.room_id == room_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn room(owner: Uuid) -> Room {
        Room {
            room_id: Uuid::new_v4(),
            owner_id: owner,
            is_public: true,
            password_hash: None,
            capacity: 10,
            current_language_id: "python".to_owned(),
            last_code: String::new(),
            last_input: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_user_is_not_a_member() {
        let store = InMemoryRoomStore::new();
        assert!(!store.is_member(Uuid::new_v4(), Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_room_drops_its_memberships() {
        let store = InMemoryRoomStore::new();
        let owner = Uuid::new_v4();
        let r = room(owner);
        let room_id = r.room_id;
        store.put_room(r).await.unwrap();
        store
            .put_membership(Membership {
                user_id: owner,
                room_id,
                role: domain::Role::Owner,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(store.is_member(owner, room_id).await.unwrap());

        store.delete_room(room_id).await.unwrap();
        assert!(store.get_room(room_id).await.unwrap().is_none());
        assert!(!store.is_member(owner, room_id).await.unwrap());
    }

    #[tokio::test]
    async fn history_recent_is_capped_and_newest_first() {
        let store = InMemoryHistoryStore::new();
        let room_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append(ExecutionLogEntry {
                    room_id,
                    submission_id: Uuid::new_v4(),
                    user_id: Uuid::new_v4(),
                    status: format!("entry-{i}"),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let recent = store.recent(room_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, "entry-4");
    }
}
