//!
//! layerconf: layered configuration records over a versioned key/value store.
//!
//! A process describes its configuration as typed fields and reads them through
//! a [`Record`] that merges several branches of a git-like store by priority.
//!
//! ## Core Concepts
//!
//! * **Store (`store::Backend`)**: An external branch-and-commit store. Commits are
//!   immutable, content-addressed trees; branches are names pointing at commits.
//!   [`InMemory`] is a complete reference backend.
//! * **Client (`store::Client`)**: A cheap-to-clone handle to a store, passed explicitly
//!   to every constructor. There is no process-wide connection.
//! * **Transactions and Snapshots**: Atomic multi-path writes against one branch, and
//!   read-only views of one commit.
//! * **Records (`record::Record`)**: Configuration handles over an ordered branch search
//!   list. The first branch holding a value wins; defaults are materialized into a
//!   dedicated branch so resolved configuration is explainable from store state alone.
//! * **Fields (`record::Field`)**: Typed, named values with version tokens for cheap
//!   change detection after [`Record::wait`].
//! * **Upgrades**: Ordered, idempotent migration steps that move stored configuration
//!   forward across schema versions.

pub mod cancel;
pub mod clock;
pub mod constants;
pub mod path;
pub mod record;
pub mod store;

use std::time::Duration;

pub use cancel::with_timeout;
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use path::Path;
pub use record::{Field, FieldKind, Migration, Record, RecordOptions, Version};
pub use store::{Client, CommitId, InMemory, Snapshot, Transaction};

/// Result type used throughout the layerconf library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the layerconf library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the versioned store
    #[error(transparent)]
    Store(store::StoreError),

    /// Path validation errors
    #[error(transparent)]
    Path(path::PathError),

    /// Structured errors from records, fields and upgrades
    #[error(transparent)]
    Record(record::RecordError),

    /// A caller-supplied deadline elapsed before the operation finished.
    #[error("Operation cancelled after {timeout:?}")]
    Cancelled {
        /// The deadline that elapsed
        timeout: Duration,
    },
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Store(_) => "store",
            Error::Path(_) => "path",
            Error::Record(_) => "record",
            Error::Cancelled { .. } => "cancel",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a branch, commit or path was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a commit conflict that requires a retry.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error indicates the store could not be reached.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_connection_error(),
            _ => false,
        }
    }

    /// Check if a caller-supplied deadline cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Store(store_err) => store_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Path(_) => true,
            Error::Record(record_err) => record_err.is_validation_error(),
            _ => false,
        }
    }

    /// Check if this error is type-related.
    pub fn is_type_error(&self) -> bool {
        match self {
            Error::Record(record_err) => record_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error came from the versioned store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}
