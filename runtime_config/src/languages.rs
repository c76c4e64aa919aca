// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use domain::LanguageProfile;
use regex::RegexSet;

/// The built-in profile table, embedded at compile time. `ProcessConfig::language_table`
/// overrides this with `RUNTIME_CONFIG_LANGUAGE_FILE` when set.
const DEFAULT_PROFILES_YAML: &str = include_str!("../languages/default.yaml");

/// A LanguageProfile plus its pre-built danger-filter RegexSet (§4.6). Cheap to clone: the
/// RegexSet is `Arc`-backed internally by the `regex` crate's compiled program.
#[derive(Clone)]
pub struct CompiledProfile {
    pub profile: LanguageProfile,
    pub denylist: Arc<RegexSet>,
    /// Matched against a failed run's stderr to promote an otherwise-ambiguous nonzero exit
    /// to `ExecutionStatus::CompilationError` for languages with no separate compile step
    /// (e.g. a Python `SyntaxError` only ever surfaces when the interpreter tries to run it).
    pub compile_error_stderr: Arc<RegexSet>,
}

#[derive(Clone)]
pub struct LanguageTable {
    profiles: HashMap<String, CompiledProfile>,
}

impl LanguageTable {
    pub fn load_default() -> Result<Self, String> {
        Self::from_yaml(DEFAULT_PROFILES_YAML)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read language table {}: {e}", path.display()))?;
        Self::from_yaml(&contents)
    }

    fn from_yaml(yaml: &str) -> Result<Self, String> {
        let raw: Vec<LanguageProfile> =
            serde_yaml::from_str(yaml).map_err(|e| format!("invalid language table: {e}"))?;
        let mut profiles = HashMap::with_capacity(raw.len());
        for profile in raw {
            profile.validate()?;
            let denylist = RegexSet::new(&profile.denylist_patterns)
                .map_err(|e| format!("invalid denylist pattern for {}: {e}", profile.id))?;
            let compile_error_stderr = RegexSet::new(&profile.compile_error_stderr_patterns)
                .map_err(|e| {
                    format!(
                        "invalid compile-error stderr pattern for {}: {e}",
                        profile.id
                    )
                })?;
            profiles.insert(
                profile.id.clone(),
                CompiledProfile {
                    profile,
                    denylist: Arc::new(denylist),
                    compile_error_stderr: Arc::new(compile_error_stderr),
                },
            );
        }
        Ok(Self { profiles })
    }

    pub fn get(&self, language_id: &str) -> Option<&CompiledProfile> {
        self.profiles.get(language_id)
    }

    pub fn contains(&self, language_id: &str) -> bool {
        self.profiles.contains_key(language_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_loads_and_validates() {
        let table = LanguageTable::load_default().unwrap();
        for id in ["python", "javascript", "java", "cpp"] {
            assert!(table.contains(id), "missing profile {id}");
        }
    }

    #[test]
    fn python_denylist_flags_os_import() {
        let table = LanguageTable::load_default().unwrap();
        let python = table.get("python").unwrap();
        assert!(python.denylist.is_match("import os\nos.system('rm -rf /')"));
        assert!(!python.denylist.is_match("print('hello world')"));
    }

    #[test]
    fn unknown_language_is_absent() {
        let table = LanguageTable::load_default().unwrap();
        assert!(table.get("cobol").is_none());
    }
}
