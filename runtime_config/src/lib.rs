// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Process configuration and the LanguageProfile table. Grounded on the teacher's `options`
//! crate pattern (typed option struct, env override, documented default) but trimmed to what
//! this core needs: no CLI flag parser, no `.pants.rc`-style config file chain.

pub mod languages;
pub mod process_config;

pub use languages::{CompiledProfile, LanguageTable};
pub use process_config::ProcessConfig;
