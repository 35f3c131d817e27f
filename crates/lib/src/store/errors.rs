//! Error types for the versioned store.
//!
//! These cover the failure modes of the external store collaborator: the
//! store being unreachable, branches, commits or paths that do not exist, and
//! compare-and-swap conflicts when two writers race on one branch.

use thiserror::Error;

use super::CommitId;
use crate::Path;

/// Errors that can occur during store operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be contacted.
    #[error("Store unreachable: {reason}")]
    Unreachable {
        /// Why the connection failed
        reason: String,
    },

    /// Branch does not exist.
    #[error("Branch not found: {branch}")]
    BranchNotFound {
        /// The name of the missing branch
        branch: String,
    },

    /// Branch already exists and cannot be created again.
    #[error("Branch already exists: {branch}")]
    BranchAlreadyExists {
        /// The name of the existing branch
        branch: String,
    },

    /// Branch name is not usable.
    #[error("Invalid branch name '{branch}'")]
    InvalidBranchName {
        /// The rejected branch name
        branch: String,
    },

    /// No commit is stored under this reference.
    #[error("Commit not found: {id}")]
    CommitNotFound {
        /// The missing commit reference
        id: CommitId,
    },

    /// No leaf value exists at the path.
    #[error("Path not found in commit {commit}: {path}")]
    PathNotFound {
        /// The commit that was searched
        commit: CommitId,
        /// The path that does not hold a value
        path: Path,
    },

    /// The path exists but is a leaf, so it has no children to list.
    #[error("Path is not a directory in commit {commit}: {path}")]
    NotADirectory {
        /// The commit that was searched
        commit: CommitId,
        /// The leaf path
        path: Path,
    },

    /// A concurrent commit moved the branch head after the transaction opened.
    ///
    /// The caller must re-stage its writes in a new transaction.
    #[error("Commit conflict on branch '{branch}': expected head {expected}, found {actual}")]
    Conflict {
        /// The branch being committed to
        branch: String,
        /// The head the transaction was based on
        expected: CommitId,
        /// The head found at commit time
        actual: CommitId,
    },

    /// Serialization of the store state failed.
    #[error("Serialization failed")]
    SerializationFailed {
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization of a saved store state failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        #[source]
        source: serde_json::Error,
    },

    /// Saved store state failed an integrity check.
    #[error("Store state corrupted: {reason}")]
    Corrupted {
        /// Description of the inconsistency
        reason: String,
    },

    /// File I/O error while saving or loading.
    #[error("File I/O error")]
    FileIo {
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Check if this error indicates a branch, commit or path was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::BranchNotFound { .. }
                | StoreError::CommitNotFound { .. }
                | StoreError::PathNotFound { .. }
                | StoreError::NotADirectory { .. }
        )
    }

    /// Check if this error indicates the store could not be reached.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::Unreachable { .. })
    }

    /// Check if this error is a commit conflict that requires a retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Check if this error is related to saving or loading store state.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            StoreError::FileIo { .. }
                | StoreError::Corrupted { .. }
                | StoreError::SerializationFailed { .. }
                | StoreError::DeserializationFailed { .. }
        )
    }

    /// Get the branch name if this error is about a specific branch.
    pub fn branch(&self) -> Option<&str> {
        match self {
            StoreError::BranchNotFound { branch }
            | StoreError::BranchAlreadyExists { branch }
            | StoreError::InvalidBranchName { branch }
            | StoreError::Conflict { branch, .. } => Some(branch),
            _ => None,
        }
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
