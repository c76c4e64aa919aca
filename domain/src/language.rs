// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use serde::{Deserialize, Serialize};

/// Defined at build time from the runtime_config profile table, immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageProfile {
    pub id: String,
    /// Filename the source is written to inside the sandbox, e.g. `Main.java` for languages
    /// that require a fixed class name, `main.py` otherwise.
    pub source_file_name: String,
    pub compile_command: Option<Vec<String>>,
    pub run_command: Vec<String>,
    pub wall_time_cap_ms: u64,
    pub memory_cap_bytes: u64,
    pub container_image: String,
    /// Regex patterns a submission in this language must not match. Checked by
    /// `danger_filter` before the submission ever reaches the sandbox.
    #[serde(default)]
    pub denylist_patterns: Vec<String>,
    /// Interpreter stderr patterns that should be promoted from `runtime_error` to
    /// `compilation_error`, e.g. "SyntaxError" for Python.
    #[serde(default)]
    pub compile_error_stderr_patterns: Vec<String>,
}

impl LanguageProfile {
    pub const MIN_MEMORY_CAP_BYTES: u64 = 64 * 1024 * 1024;
    pub const MAX_MEMORY_CAP_BYTES: u64 = 1024 * 1024 * 1024;
    pub const MAX_WALL_TIME_CAP_MS: u64 = 60_000;

    /// Checks the invariants spec.md §3 requires of every profile in the table.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("LanguageProfile.id must not be empty".to_owned());
        }
        if self.run_command.is_empty() {
            return Err(format!("LanguageProfile {} has no run_command", self.id));
        }
        if !(Self::MIN_MEMORY_CAP_BYTES..=Self::MAX_MEMORY_CAP_BYTES)
            .contains(&self.memory_cap_bytes)
        {
            return Err(format!(
                "LanguageProfile {} memory_cap_bytes {} out of [64MiB, 1GiB]",
                self.id, self.memory_cap_bytes
            ));
        }
        if self.wall_time_cap_ms == 0 || self.wall_time_cap_ms > Self::MAX_WALL_TIME_CAP_MS {
            return Err(format!(
                "LanguageProfile {} wall_time_cap_ms {} out of (0, 60000]",
                self.id, self.wall_time_cap_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> LanguageProfile {
        LanguageProfile {
            id: "python".to_owned(),
            source_file_name: "main.py".to_owned(),
            compile_command: None,
            run_command: vec!["python3".to_owned(), "main.py".to_owned()],
            wall_time_cap_ms: 5_000,
            memory_cap_bytes: 128 * 1024 * 1024,
            container_image: "code-runner/python:3.12".to_owned(),
            denylist_patterns: vec![],
            compile_error_stderr_patterns: vec!["SyntaxError".to_owned()],
        }
    }

    #[test]
    fn rejects_memory_cap_below_minimum() {
        let mut p = profile();
        p.memory_cap_bytes = 1024;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_wall_time_cap_above_maximum() {
        let mut p = profile();
        p.wall_time_cap_ms = 120_000;
        assert!(p.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_profile() {
        assert!(profile().validate().is_ok());
    }
}
