// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use serde::{Deserialize, Serialize};

/// Ephemeral; not persisted beyond RoomFabric's in-memory connection state. Replaced on every
/// `cursor:position` event, dropped on disconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorState {
    pub line_number: u32,
    pub column: u32,
    pub selection: Option<Selection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}
