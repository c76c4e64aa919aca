// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::collections::{HashMap, HashSet};

use domain::{CursorState, UserDescriptor};
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::events::ServerEvent;

pub type ConnectionId = Uuid;

struct Connection {
    user: UserDescriptor,
    sender: UnboundedSender<ServerEvent>,
    /// Rooms this connection has an active `room:join` for. A user's other open tabs are
    /// tracked separately in `user_connections` and are not implied by this set.
    rooms: HashSet<Uuid>,
}

#[derive(Default)]
struct State {
    connections: HashMap<ConnectionId, Connection>,
    room_members: HashMap<Uuid, HashSet<ConnectionId>>,
    user_connections: HashMap<Uuid, HashSet<ConnectionId>>,
    cursors: HashMap<(Uuid, Uuid), CursorState>,
}

/// The in-process bipartite relation between connections, rooms, and users that backs every
/// `RoomFabric` dispatch decision (spec.md §4.5). One process owns one `Registry`; there is no
/// cross-process fan-out here, matching the "single realtime process" scope spec.md §1 assumes.
#[derive(Default)]
pub struct Registry {
    state: RwLock<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, connection_id: ConnectionId, user: UserDescriptor, sender: UnboundedSender<ServerEvent>) {
        let mut state = self.state.write();
        state.user_connections.entry(user.user_id).or_default().insert(connection_id);
        state.connections.insert(
            connection_id,
            Connection {
                user,
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Drops a connection from every room it had joined, returning `(room_id, user_id)` pairs
    /// for rooms whose membership actually changed (i.e. this was the user's last open
    /// connection to that room) so the caller can decide whether to broadcast `room:user-left`.
    pub fn disconnect(&self, connection_id: ConnectionId) -> Vec<(Uuid, Uuid)> {
        let mut state = self.state.write();
        let Some(connection) = state.connections.remove(&connection_id) else {
            return Vec::new();
        };
        let user_id = connection.user.user_id;

        if let Some(conns) = state.user_connections.get_mut(&user_id) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                state.user_connections.remove(&user_id);
            }
        }

        let mut left = Vec::new();
        for room_id in connection.rooms {
            if let Some(members) = state.room_members.get_mut(&room_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    state.room_members.remove(&room_id);
                }
            }
            state.cursors.remove(&(room_id, user_id));
            if !state.user_still_in_room(user_id, room_id) {
                left.push((room_id, user_id));
            }
        }
        left
    }

    pub fn join_room(&self, connection_id: ConnectionId, room_id: Uuid) {
        let mut state = self.state.write();
        state.room_members.entry(room_id).or_default().insert(connection_id);
        if let Some(connection) = state.connections.get_mut(&connection_id) {
            connection.rooms.insert(room_id);
        }
    }

    /// Removes one connection from a room, returning `true` if the departing user has no other
    /// open connection left in that room (i.e. a `room:user-left` broadcast is warranted).
    pub fn leave_room(&self, connection_id: ConnectionId, room_id: Uuid) -> bool {
        let mut state = self.state.write();
        if let Some(members) = state.room_members.get_mut(&room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                state.room_members.remove(&room_id);
            }
        }
        let user_id = if let Some(connection) = state.connections.get_mut(&connection_id) {
            connection.rooms.remove(&room_id);
            connection.user.user_id
        } else {
            return false;
        };
        state.cursors.remove(&(room_id, user_id));
        !state.user_still_in_room(user_id, room_id)
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<UserDescriptor> {
        self.state.read().connections.get(&connection_id).map(|c| c.user.clone())
    }

    /// Whether `user_id` still has at least one open connection anywhere (not just in a
    /// particular room). Used to decide whether the `socket:<userId>` KVS entry should be
    /// torn down on disconnect, since a user's other open tabs may still be live.
    pub fn user_has_any_connection(&self, user_id: Uuid) -> bool {
        self.state.read().user_connections.contains_key(&user_id)
    }

        pub fn is_in_room(&self, connection_id: ConnectionId, room_id: Uuid) -> bool {
        self.state
            .read()
            .connections
            .get(&connection_id)
            .is_some_and(|c| c.rooms.contains(&room_id))
    }

    pub fn set_cursor(&self, room_id: Uuid, user_id: Uuid, cursor: CursorState) {
        self.state.write().cursors.insert((room_id, user_id), cursor);
    }

    /// Every distinct user currently joined to `room_id`, deduplicated across that user's
    /// open connections, for `room:users` roster snapshots.
    pub fn roster(&self, room_id: Uuid) -> Vec<UserDescriptor> {
        let state = self.state.read();
        let Some(members) = state.room_members.get(&room_id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        members
            .iter()
            .filter_map(|id| state.connections.get(id))
            .filter(|c| seen.insert(c.user.user_id))
            .map(|c| c.user.clone())
            .collect()
    }

    /// Delivers `event` to every connection currently joined to `room_id`, optionally skipping
    /// `exclude`. A send failing (receiver dropped, socket task already exiting) is dropped
    /// silently here; the connection's own read loop will observe the disconnect and call
    /// `disconnect` on its own.
    pub fn broadcast(&self, room_id: Uuid, exclude: Option<ConnectionId>, event: ServerEvent) {
        let state = self.state.read();
        let Some(members) = state.room_members.get(&room_id) else {
            return;
        };
        for id in members {
            if Some(*id) == exclude {
                continue;
            }
            if let Some(connection) = state.connections.get(id) {
                let _ = connection.sender.send(event.clone());
            }
        }
    }

    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.state.read().connections.get(&connection_id) {
            let _ = connection.sender.send(event);
        }
    }

    /// Every connection currently joined to `room_id`, used to clear the registry's side of a
    /// room's membership once the room itself has been deleted (owner-leaves path).
    pub fn connections_in_room(&self, room_id: Uuid) -> Vec<ConnectionId> {
        self.state
            .read()
            .room_members
            .get(&room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every connection belonging to every user in `room_id`, used to kick all of a target
    /// user's tabs out of a room at once (`room:kick-user`).
    pub fn connections_of_user_in_room(&self, room_id: Uuid, user_id: Uuid) -> Vec<ConnectionId> {
        let state = self.state.read();
        let Some(members) = state.room_members.get(&room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| state.connections.get(*id).is_some_and(|c| c.user.user_id == user_id))
            .copied()
            .collect()
    }
}

impl State {
    fn user_still_in_room(&self, user_id: Uuid, room_id: Uuid) -> bool {
        let Some(members) = self.room_members.get(&room_id) else {
            return false;
        };
        members.iter().any(|id| self.connections.get(id).is_some_and(|c| c.user.user_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn descriptor() -> UserDescriptor {
        UserDescriptor {
            user_id: Uuid::new_v4(),
            display_name: "ada".to_owned(),
        }
    }

    #[test]
    fn disconnect_reports_left_only_when_no_connection_remains() {
        let registry = Registry::new();
        let room_id = Uuid::new_v4();
        let user = descriptor();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        registry.connect(conn_a, user.clone(), tx_a);
        registry.connect(conn_b, user.clone(), tx_b);
        registry.join_room(conn_a, room_id);
        registry.join_room(conn_b, room_id);

        let left = registry.disconnect(conn_a);
        assert!(left.is_empty(), "user still has conn_b open in the room");

        let left = registry.disconnect(conn_b);
        assert_eq!(left, vec![(room_id, user.user_id)]);
    }

    #[test]
    fn roster_deduplicates_a_users_multiple_connections() {
        let registry = Registry::new();
        let room_id = Uuid::new_v4();
        let user = descriptor();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        registry.connect(conn_a, user.clone(), tx_a);
        registry.connect(conn_b, user, tx_b);
        registry.join_room(conn_a, room_id);
        registry.join_room(conn_b, room_id);

        assert_eq!(registry.roster(room_id).len(), 1);
    }

    #[test]
    fn broadcast_excludes_the_named_connection() {
        let registry = Registry::new();
        let room_id = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        registry.connect(conn_a, descriptor(), tx_a);
        registry.connect(conn_b, descriptor(), tx_b);
        registry.join_room(conn_a, room_id);
        registry.join_room(conn_b, room_id);

        registry.broadcast(room_id, Some(conn_a), ServerEvent::RoomUserLeft { user_id: Uuid::new_v4() });

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }
}
