//! The branch-and-commit versioned store.
//!
//! This module provides the [`Backend`] trait, the seam between the
//! configuration engine and whatever store actually holds the data, plus the
//! client-side handles built on top of it:
//!
//! * [`Client`]: a cheap-to-clone connection handle passed to every constructor.
//! * [`Transaction`]: stages writes and removals against one branch and commits
//!   them atomically as a single new commit.
//! * [`Snapshot`]: a read-only view of one immutable commit.
//!
//! The store gives git-like guarantees: a commit never changes once created,
//! and a branch head moves atomically when a commit succeeds. [`InMemory`] is
//! a complete reference implementation suitable for tests and embedding.


use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Path, Result};

mod client;
mod errors;
mod in_memory;
mod snapshot;
mod transaction;
mod tree;

pub use client::Client;
pub use errors::StoreError;
pub use in_memory::InMemory;
pub use snapshot::Snapshot;
pub use transaction::Transaction;

/// Name of the branch every fresh store starts with.
pub const DEFAULT_BRANCH: &str = "master";

/// Content address of one immutable commit.
///
/// Represents a hex-encoded SHA-256 of the commit's full tree. Two ids are
/// equal exactly when the trees they point to are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first 12 hex digits, for log output.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// One staged modification inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Upsert a leaf value.
    Write { path: Path, value: String },
    /// Delete a leaf or a whole subtree.
    Remove { path: Path },
}

impl Op {
    pub fn path(&self) -> &Path {
        match self {
            Op::Write { path, .. } | Op::Remove { path } => path,
        }
    }
}

/// Metadata recorded for every commit that advanced a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The new head.
    pub id: CommitId,
    /// The head the commit was based on.
    pub parent: CommitId,
    pub message: String,
    /// Milliseconds since Unix epoch, from the store's clock.
    pub timestamp: u64,
}

impl CommitInfo {
    /// The commit timestamp formatted as RFC 3339.
    pub fn time(&self) -> String {
        crate::clock::millis_to_rfc3339(self.timestamp)
    }
}

/// Storage abstraction for the versioned store.
///
/// Implementations own branches, immutable commits and their trees. All
/// methods are async so network-backed stores can suspend on I/O; callers
/// never hold engine locks that a backend needs.
///
/// Errors follow [`StoreError`]: `Unreachable` when the store cannot be
/// contacted, the `*NotFound` variants for absent branches, commits and
/// paths, and `Conflict` when a commit's base is no longer the branch head.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Checks that the store can be reached.
    async fn ping(&self) -> Result<()>;

    /// Resolves a branch name to its current head.
    async fn head(&self, branch: &str) -> Result<CommitId>;

    /// Lists all branch names.
    async fn branches(&self) -> Result<Vec<String>>;

    /// Creates a branch pointing at `at`, or at an empty tree when `None`.
    ///
    /// Fails with `BranchAlreadyExists` if the branch is present.
    async fn create_branch(&self, branch: &str, at: Option<&CommitId>) -> Result<CommitId>;

    /// Atomically applies `ops` on top of `base` and advances `branch`.
    ///
    /// Fails with `Conflict` if the branch head is no longer `base`. Returns
    /// the new head, which equals `base` when the ops changed nothing.
    async fn commit(
        &self,
        branch: &str,
        base: &CommitId,
        ops: &[Op],
        message: &str,
    ) -> Result<CommitId>;

    /// Reads the leaf value at `path` in `commit`.
    async fn read(&self, commit: &CommitId, path: &Path) -> Result<String>;

    /// Lists the child names of the directory at `path` in `commit`.
    async fn list(&self, commit: &CommitId, path: &Path) -> Result<Vec<String>>;

    /// Returns the commits that advanced `branch`, oldest first.
    async fn history(&self, branch: &str) -> Result<Vec<CommitInfo>>;
}
