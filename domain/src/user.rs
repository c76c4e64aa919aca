// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The minimal projection of a user that `RoomFabric` attaches to a connection after the
/// handshake verifies its bearer credential (spec.md §4.5). Full user CRUD — registration,
/// profile fields, password hashing — lives outside this core (spec.md §1); this is only
/// enough identity to authorize events and to label a roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserDescriptor {
    pub user_id: Uuid,
    pub display_name: String,
}
