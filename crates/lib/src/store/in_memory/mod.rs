//! In-memory store backend
//!
//! This module provides an in-memory implementation of the [`Backend`] trait,
//! suitable for testing, embedding, or scenarios where the store is persisted
//! by saving and loading its whole state as JSON.

mod persistence;

use std::{
    collections::{BTreeMap, HashMap},
    path::Path as FsPath,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Backend, CommitId, CommitInfo, DEFAULT_BRANCH, Op, StoreError, tree::Node};
use crate::{Clock, Path, Result, SystemClock};

/// Branches, commits and per-branch history.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    /// Immutable trees keyed by their content address
    pub(crate) commits: HashMap<CommitId, Arc<Node>>,
    /// Branch name -> current head
    pub(crate) branches: BTreeMap<String, CommitId>,
    /// Branch name -> commits that advanced it, oldest first
    pub(crate) history: HashMap<String, Vec<CommitInfo>>,
}

impl StoreState {
    /// A store holding only the empty tree, with [`DEFAULT_BRANCH`] pointing at it.
    fn initial() -> Self {
        let empty = Node::default();
        let id = empty.id();
        let mut state = Self::default();
        state.commits.insert(id.clone(), Arc::new(empty));
        state.branches.insert(DEFAULT_BRANCH.to_string(), id);
        state
    }

    fn tree(&self, id: &CommitId) -> Result<&Arc<Node>> {
        self.commits
            .get(id)
            .ok_or_else(|| StoreError::CommitNotFound { id: id.clone() }.into())
    }

    fn head(&self, branch: &str) -> Result<&CommitId> {
        self.branches.get(branch).ok_or_else(|| {
            StoreError::BranchNotFound {
                branch: branch.to_string(),
            }
            .into()
        })
    }
}

/// A versioned store held entirely in memory.
///
/// Commits are immutable trees addressed by the SHA-256 of their contents;
/// branches are names pointing at a commit. A fresh store has a single
/// `master` branch at the empty tree.
///
/// Reachability can be switched off with [`InMemory::set_reachable`] to
/// simulate a store that cannot be contacted: every backend call then fails
/// with [`StoreError::Unreachable`].
#[derive(Debug)]
pub struct InMemory {
    pub(crate) state: RwLock<StoreState>,
    reachable: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl InMemory {
    /// Creates a new store using the system clock for commit timestamps.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a new store with a custom clock for commit timestamps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_state(StoreState::initial(), clock)
    }

    pub(crate) fn from_state(state: StoreState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(state),
            reachable: AtomicBool::new(true),
            clock,
        }
    }

    /// Makes the store appear reachable or unreachable to every caller.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Saves branches, commits and history to a JSON file.
    ///
    /// # Arguments
    /// * `path` - The path to the file where the state should be saved.
    ///
    /// # Returns
    /// A `Result` indicating success or an I/O or serialization error.
    pub async fn save_to_file<P: AsRef<FsPath>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads a store from a JSON file written by [`InMemory::save_to_file`].
    ///
    /// If the file does not exist, a fresh store is returned. Every stored
    /// tree is re-hashed and checked against its commit id, and every branch
    /// head must refer to a stored commit.
    pub async fn load_from_file<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        persistence::load_from_file(path, Arc::new(SystemClock)).await
    }

    fn check_reachable(&self) -> Result<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(StoreError::Unreachable {
                reason: "in-memory store marked unreachable".to_string(),
            }
            .into())
        }
    }
}

impl Default for InMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_branch_name(branch: &str) -> Result<()> {
    if branch.is_empty() || branch.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(StoreError::InvalidBranchName {
            branch: branch.to_string(),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl Backend for InMemory {
    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn head(&self, branch: &str) -> Result<CommitId> {
        self.check_reachable()?;
        let state = self.state.read().await;
        state.head(branch).cloned()
    }

    async fn branches(&self) -> Result<Vec<String>> {
        self.check_reachable()?;
        let state = self.state.read().await;
        Ok(state.branches.keys().cloned().collect())
    }

    async fn create_branch(&self, branch: &str, at: Option<&CommitId>) -> Result<CommitId> {
        self.check_reachable()?;
        validate_branch_name(branch)?;

        let mut state = self.state.write().await;
        if state.branches.contains_key(branch) {
            return Err(StoreError::BranchAlreadyExists {
                branch: branch.to_string(),
            }
            .into());
        }

        let head = match at {
            Some(id) => {
                state.tree(id)?;
                id.clone()
            }
            None => {
                let empty = Node::default();
                let id = empty.id();
                state
                    .commits
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(empty));
                id
            }
        };

        state.branches.insert(branch.to_string(), head.clone());
        tracing::debug!(branch, head = head.short(), "Created branch");
        Ok(head)
    }

    async fn commit(
        &self,
        branch: &str,
        base: &CommitId,
        ops: &[Op],
        message: &str,
    ) -> Result<CommitId> {
        self.check_reachable()?;

        let mut state = self.state.write().await;
        let head = state.head(branch)?.clone();
        if &head != base {
            return Err(StoreError::Conflict {
                branch: branch.to_string(),
                expected: base.clone(),
                actual: head,
            }
            .into());
        }

        let mut tree = Node::clone(state.tree(base)?);
        tree.apply(ops);
        let id = tree.id();

        if &id == base {
            tracing::debug!(branch, head = base.short(), "Commit produced no changes");
            return Ok(id);
        }

        state
            .commits
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tree));
        state.branches.insert(branch.to_string(), id.clone());
        let info = CommitInfo {
            id: id.clone(),
            parent: base.clone(),
            message: message.to_string(),
            timestamp: self.clock.now_millis(),
        };
        tracing::debug!(
            branch,
            parent = base.short(),
            head = id.short(),
            ops = ops.len(),
            time = %info.time(),
            message,
            "Committed"
        );
        state
            .history
            .entry(branch.to_string())
            .or_default()
            .push(info);
        Ok(id)
    }

    async fn read(&self, commit: &CommitId, path: &Path) -> Result<String> {
        self.check_reachable()?;
        let state = self.state.read().await;
        state
            .tree(commit)?
            .read(path)
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::PathNotFound {
                    commit: commit.clone(),
                    path: path.clone(),
                }
                .into()
            })
    }

    async fn list(&self, commit: &CommitId, path: &Path) -> Result<Vec<String>> {
        self.check_reachable()?;
        let state = self.state.read().await;
        match state.tree(commit)?.list(path) {
            Some(Ok(children)) => Ok(children),
            Some(Err(())) => Err(StoreError::NotADirectory {
                commit: commit.clone(),
                path: path.clone(),
            }
            .into()),
            None => Err(StoreError::PathNotFound {
                commit: commit.clone(),
                path: path.clone(),
            }
            .into()),
        }
    }

    async fn history(&self, branch: &str) -> Result<Vec<CommitInfo>> {
        self.check_reachable()?;
        let state = self.state.read().await;
        state.head(branch)?;
        Ok(state.history.get(branch).cloned().unwrap_or_default())
    }
}
