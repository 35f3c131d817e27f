//! Persistence operations for the InMemory store
//!
//! This module handles serialization and file I/O for saving/loading
//! the in-memory store state to/from JSON files.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};

use serde::{Deserialize, Deserializer, Serialize};

use super::{InMemory, StoreState};
use crate::{
    Clock, Error, Result,
    store::{CommitId, CommitInfo, StoreError, tree::Node},
};

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

/// Validates the persistence version during deserialization.
fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

/// Serializable form of the InMemory store
#[derive(Serialize, Deserialize)]
struct SerializableStore {
    /// File format version for compatibility checking
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    commits: HashMap<CommitId, Node>,
    branches: BTreeMap<String, CommitId>,
    #[serde(default)]
    history: HashMap<String, Vec<CommitInfo>>,
}

impl SerializableStore {
    fn from_state(state: &StoreState) -> Self {
        Self {
            version: PERSISTENCE_VERSION,
            commits: state
                .commits
                .iter()
                .map(|(id, node)| (id.clone(), Node::clone(node)))
                .collect(),
            branches: state.branches.clone(),
            history: state.history.clone(),
        }
    }

    /// Rebuilds the live state, re-checking every content address.
    fn into_state(self) -> Result<StoreState> {
        let mut commits = HashMap::with_capacity(self.commits.len());
        for (id, node) in self.commits {
            let actual = node.id();
            if actual != id {
                return Err(StoreError::Corrupted {
                    reason: format!("commit {id} hashes to {actual}"),
                }
                .into());
            }
            commits.insert(id, Arc::new(node));
        }

        for (branch, head) in &self.branches {
            if !commits.contains_key(head) {
                return Err(StoreError::Corrupted {
                    reason: format!("branch '{branch}' points at missing commit {head}"),
                }
                .into());
            }
        }

        Ok(StoreState {
            commits,
            branches: self.branches,
            history: self.history,
        })
    }
}

/// Saves the entire store state to a specified file as JSON.
///
/// # Arguments
/// * `store` - The InMemory store to save
/// * `path` - The path to the file where the state should be saved.
///
/// # Returns
/// A `Result` indicating success or an I/O or serialization error.
pub(crate) async fn save_to_file<P: AsRef<Path>>(store: &InMemory, path: P) -> Result<()> {
    let serializable = {
        let state = store.state.read().await;
        SerializableStore::from_state(&state)
    };

    let json = serde_json::to_string_pretty(&serializable)
        .map_err(|e| -> Error { StoreError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path.as_ref(), json)
        .await
        .map_err(|e| -> Error { StoreError::FileIo { source: e }.into() })?;

    tracing::debug!(path = %path.as_ref().display(), "Saved store state");
    Ok(())
}

/// Loads the store state from a specified JSON file.
///
/// If the file does not exist, a new `InMemory` store is returned.
///
/// # Arguments
/// * `path` - The path to the file from which to load the state.
/// * `clock` - Clock used for timestamps of subsequent commits.
///
/// # Returns
/// A `Result` containing the loaded store or an I/O, deserialization or
/// integrity error.
pub(crate) async fn load_from_file<P: AsRef<Path>>(
    path: P,
    clock: Arc<dyn Clock>,
) -> Result<InMemory> {
    match tokio::fs::read_to_string(path.as_ref()).await {
        Ok(json) => {
            let serializable: SerializableStore =
                serde_json::from_str(&json).map_err(|e| -> Error {
                    StoreError::DeserializationFailed { source: e }.into()
                })?;
            let state = serializable.into_state()?;
            tracing::debug!(
                path = %path.as_ref().display(),
                branches = state.branches.len(),
                commits = state.commits.len(),
                "Loaded store state"
            );
            Ok(InMemory::from_state(state, clock))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(InMemory::with_clock(clock)),
        Err(e) => Err(StoreError::FileIo { source: e }.into()),
    }
}
