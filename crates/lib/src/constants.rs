//! Constants used throughout the layerconf library.
//!
//! This module provides central definitions for reserved keys, default
//! values and commit messages written by the configuration engine.

/// Key under a record's base path, in the state branch, holding the schema version.
pub const SCHEMA_VERSION_KEY: &str = "schema-version";

/// Schema version assumed when the state branch holds none.
pub const DEFAULT_SCHEMA_VERSION: u64 = 1;

/// Commit message used when materializing defaults.
pub const DEFAULTS_COMMIT_MESSAGE: &str = "Materialize configuration defaults";

/// Commit message used when persisting the schema version.
pub const SCHEMA_COMMIT_MESSAGE: &str = "Record schema version";

/// Commit message used when writing runtime state.
pub const STATE_COMMIT_MESSAGE: &str = "Update runtime state";
