//! Configuration for opening a [`Record`](super::Record).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::RecordError;
use crate::{Path, Result};

/// Where a record reads, materializes and keeps its state.
///
/// ```
/// use layerconf::RecordOptions;
///
/// let options = RecordOptions::from_json(
///     r#"{
///         "search_branches": ["master", "defaults"],
///         "defaults_branch": "defaults",
///         "state_branch": "state",
///         "base_path": ["tests"]
///     }"#,
/// )?;
/// assert_eq!(options.primary_branch(), "master");
/// # Ok::<(), layerconf::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOptions {
    /// Branches to resolve values from, highest priority first.
    pub search_branches: Vec<String>,
    /// Branch that registered defaults are written into. Must appear in
    /// `search_branches` below the primary branch.
    pub defaults_branch: String,
    /// Branch holding runtime state and the schema version.
    pub state_branch: String,
    /// Prefix under which every field of the record lives.
    #[serde(default = "Path::root")]
    pub base_path: Path,
}

impl RecordOptions {
    pub fn new(
        search_branches: impl IntoIterator<Item = impl Into<String>>,
        defaults_branch: impl Into<String>,
        state_branch: impl Into<String>,
        base_path: Path,
    ) -> Self {
        Self {
            search_branches: search_branches.into_iter().map(Into::into).collect(),
            defaults_branch: defaults_branch.into(),
            state_branch: state_branch.into(),
            base_path,
        }
    }

    /// Parses options from JSON and validates them.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// The highest-priority search branch, which upgrade steps write to.
    pub fn primary_branch(&self) -> &str {
        self.search_branches
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Checks the options are usable.
    ///
    /// The search list must be non-empty and without duplicates. It must
    /// contain the defaults branch, but not as the primary branch: the primary
    /// branch holds operator values, which materialized defaults would
    /// overwrite. Branch names must be non-empty.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> crate::Error { RecordError::InvalidOptions { reason }.into() };

        if self.search_branches.is_empty() {
            return Err(invalid("search branch list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for branch in &self.search_branches {
            if branch.trim().is_empty() {
                return Err(invalid("search branch names cannot be empty".to_string()));
            }
            if !seen.insert(branch.as_str()) {
                return Err(invalid(format!("branch '{branch}' is searched twice")));
            }
        }

        if !seen.contains(self.defaults_branch.as_str()) {
            return Err(invalid(format!(
                "defaults branch '{}' is not in the search list",
                self.defaults_branch
            )));
        }

        if self.primary_branch() == self.defaults_branch {
            return Err(invalid(format!(
                "defaults branch '{}' cannot be the primary search branch",
                self.defaults_branch
            )));
        }

        if self.state_branch.trim().is_empty() {
            return Err(invalid("state branch name cannot be empty".to_string()));
        }

        Ok(())
    }
}
