//! Schema migrations.
//!
//! An upgrade step is a plain function over a [`Migration`]. The migration
//! shows the step every leaf value under the record's base path, nested ones
//! included, merged across the search branches, and stages changes against
//! the primary branch. Changes
//! that would not alter the primary branch are dropped, so a step that sets a
//! value is naturally idempotent.

use std::{collections::BTreeMap, sync::Arc};

use super::{RecordError, field::FieldValue};
use crate::{Error, Path, Result, path::IntoPath, store::Op};

/// A registered migration step.
pub(crate) type UpgradeStep = Arc<dyn Fn(&mut Migration) -> Result<()> + Send + Sync>;

/// The view an upgrade step works on.
///
/// Keys are paths relative to the record's base path, the same names fields
/// are registered under (`"workers"`, `"net/port"`).
#[derive(Debug)]
pub struct Migration {
    version: u64,
    base_path: Path,
    /// Values held by the primary branch, with staged changes applied
    primary: BTreeMap<String, String>,
    /// Values from every lower-priority branch, merged
    lower: BTreeMap<String, String>,
    staged: Vec<Op>,
}

impl Migration {
    pub(crate) fn new(
        version: u64,
        base_path: Path,
        primary: BTreeMap<String, String>,
        lower: BTreeMap<String, String>,
    ) -> Self {
        Self {
            version,
            base_path,
            primary,
            lower,
            staged: Vec::new(),
        }
    }

    /// The schema version this step upgrades to.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The effective raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.primary
            .get(key)
            .or_else(|| self.lower.get(key))
            .map(String::as_str)
    }

    /// The effective value of `key` parsed as `T`, if present and well formed.
    pub fn get_as<T: FieldValue>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::parse)
    }

    /// Every key with an effective value, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .primary
            .keys()
            .chain(self.lower.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Whether `key` is set in the primary branch itself.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.primary.contains_key(key)
    }

    /// Sets `key` in the primary branch.
    ///
    /// Nothing is staged if the primary branch already holds `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if self.primary.get(key) == Some(&value) {
            return Ok(());
        }
        let path = self.path_of(key)?;
        self.staged.push(Op::Write {
            path,
            value: value.clone(),
        });
        self.primary.insert(key.to_string(), value);
        Ok(())
    }

    /// Typed form of [`Migration::set`].
    pub fn set_as<T: FieldValue>(&mut self, key: &str, value: T) -> Result<()> {
        self.set(key, value.render())
    }

    /// Removes `key` from the primary branch, exposing any lower-priority value.
    ///
    /// Nothing is staged if the primary branch does not hold `key`.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.primary.remove(key).is_none() {
            return Ok(());
        }
        let path = self.path_of(key)?;
        self.staged.push(Op::Remove { path });
        Ok(())
    }

    /// Moves a value from `from` to `to` in the primary branch.
    ///
    /// Does nothing once `from` is gone, so re-running it is harmless.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let Some(value) = self.primary.get(from).cloned() else {
            return Ok(());
        };
        self.set(to, value)?;
        self.remove(from)
    }

    /// An error that aborts this upgrade step.
    pub fn fail(&self, reason: impl Into<String>) -> Error {
        RecordError::UpgradeFailed {
            version: self.version,
            reason: reason.into(),
        }
        .into()
    }

    fn path_of(&self, key: &str) -> Result<Path> {
        let relative = key.into_path()?;
        relative.require_non_empty()?;
        Ok(self.base_path.join(&relative))
    }

    pub(crate) fn into_ops(self) -> Vec<Op> {
        self.staged
    }
}
