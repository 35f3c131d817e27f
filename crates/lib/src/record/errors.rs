//! Error types for records, fields and schema upgrades.
//!
//! Missing or malformed configuration values are never errors: they resolve
//! to the field's default. These variants cover misuse of the record API
//! and failed migrations.

use thiserror::Error;

use super::FieldKind;

/// Errors that can occur during record operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record configuration is unusable.
    #[error("Invalid record options: {reason}")]
    InvalidOptions {
        /// What is wrong with the options
        reason: String,
    },

    /// A field name was registered again with a different type.
    #[error("Field '{name}' is registered as {registered}, not {requested}")]
    FieldTypeMismatch {
        /// The field name
        name: String,
        /// The type the field was first registered with
        registered: FieldKind,
        /// The type of the conflicting registration
        requested: FieldKind,
    },

    /// Two upgrade steps were registered for the same schema version.
    #[error("Upgrade step for schema version {version} is already registered")]
    DuplicateUpgradeStep {
        /// The schema version
        version: u64,
    },

    /// An upgrade step reported a failure.
    #[error("Upgrade to schema version {version} failed: {reason}")]
    UpgradeFailed {
        /// The schema version whose step failed
        version: u64,
        /// Description from the step
        reason: String,
    },

    /// The key is managed by the record itself.
    #[error("Key '{key}' is reserved")]
    ReservedKey {
        /// The rejected key
        key: String,
    },
}

impl RecordError {
    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            RecordError::InvalidOptions { .. }
                | RecordError::DuplicateUpgradeStep { .. }
                | RecordError::ReservedKey { .. }
        )
    }

    /// Check if this error is type-related.
    pub fn is_type_error(&self) -> bool {
        matches!(self, RecordError::FieldTypeMismatch { .. })
    }

    /// Check if this error came from an upgrade step.
    pub fn is_upgrade_error(&self) -> bool {
        matches!(self, RecordError::UpgradeFailed { .. })
    }
}

impl From<RecordError> for crate::Error {
    fn from(err: RecordError) -> Self {
        crate::Error::Record(err)
    }
}
