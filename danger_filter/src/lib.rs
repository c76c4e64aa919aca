// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! The static danger filter (spec.md §4.6): a language-aware pattern match that rejects
//! obvious egress, filesystem-mutation, subprocess-spawning, infinite-loop, and
//! program-termination constructs before a submission ever reaches the sandbox.
//!
//! This is defense in depth, not the authority boundary — the sandbox's container isolation
//! is (spec.md §9 design note). The patterns themselves are data on `LanguageProfile`, loaded
//! by `runtime_config`, so a deployment can tighten or loosen them without a code change.

use runtime_config::CompiledProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DangerMatch {
    pub language_id: String,
}

impl DangerMatch {
    pub fn message(&self) -> String {
        format!(
            "source matches a denylisted construct for language {}",
            self.language_id
        )
    }
}

/// Returns `Err(DangerMatch)` the first time any denylisted pattern in `profile` matches
/// `source_text`. `regex::RegexSet::is_match` short-circuits on the first hit, so this stays
/// a single linear scan even for profiles with dozens of patterns.
pub fn check(profile: &CompiledProfile, source_text: &str) -> Result<(), DangerMatch> {
    if profile.denylist.is_match(source_text) {
        return Err(DangerMatch {
            language_id: profile.profile.id.clone(),
        });
    }
    Ok(())
}
