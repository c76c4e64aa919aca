// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Shared data model and error taxonomy for the collaborative code-execution core. Leaf crate:
//! every other crate in this workspace depends on `domain`, and `domain` depends on nothing in
//! this workspace.

pub mod cursor;
pub mod error;
pub mod job;
pub mod language;
pub mod room;
pub mod submission;
pub mod user;

pub use cursor::{CursorState, Selection};
pub use error::{CoreError, CoreResult};
pub use job::{Job, JobState};
pub use language::LanguageProfile;
pub use room::{ExecutionLogEntry, Membership, Role, Room};
pub use submission::{ExecutionResult, ExecutionStatus, Submission};
pub use user::UserDescriptor;
