//! Connection handle to a versioned store.

use std::sync::Arc;

use handle_trait::Handle;

use super::{Backend, CommitId, CommitInfo, Snapshot, StoreError, Transaction};
use crate::{Path, Result, path::IntoPath};

/// A handle to a connected store.
///
/// Cloning a `Client` is cheap; every clone talks to the same backend.
/// Records, transactions and snapshots each hold a clone.
#[derive(Clone, Handle)]
pub struct Client {
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Connects to a backend, verifying that it can be reached.
    ///
    /// # Errors
    /// Returns [`StoreError::Unreachable`] if the backend does not answer.
    pub async fn dial(backend: impl Backend + 'static) -> Result<Self> {
        Self::dial_shared(Arc::new(backend)).await
    }

    /// Connects to a backend that is shared with other owners.
    pub async fn dial_shared(backend: Arc<dyn Backend>) -> Result<Self> {
        backend.ping().await?;
        tracing::debug!("Connected to store");
        Ok(Self { backend })
    }

    /// The backend this client talks to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Resolves a branch name to its current head.
    pub async fn head(&self, branch: &str) -> Result<CommitId> {
        self.backend.head(branch).await
    }

    /// Lists all branch names.
    pub async fn branches(&self) -> Result<Vec<String>> {
        self.backend.branches().await
    }

    /// Creates a branch at `at`, or at an empty tree when `None`.
    pub async fn create_branch(&self, branch: &str, at: Option<&CommitId>) -> Result<CommitId> {
        self.backend.create_branch(branch, at).await
    }

    /// Returns the head of `branch`, creating it at an empty tree if missing.
    pub async fn ensure_branch(&self, branch: &str) -> Result<CommitId> {
        match self.backend.head(branch).await {
            Ok(head) => Ok(head),
            Err(crate::Error::Store(StoreError::BranchNotFound { .. })) => {
                match self.backend.create_branch(branch, None).await {
                    Ok(head) => {
                        tracing::info!(branch, "Created missing branch");
                        Ok(head)
                    }
                    // Lost a race with another creator
                    Err(crate::Error::Store(StoreError::BranchAlreadyExists { .. })) => {
                        self.backend.head(branch).await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Starts a transaction on `branch`, based on its current head.
    ///
    /// # Errors
    /// Returns a not-found error if the branch does not exist.
    pub async fn new_transaction(&self, branch: &str) -> Result<Transaction> {
        let base = self.backend.head(branch).await?;
        tracing::trace!(branch, base = base.short(), "Opened transaction");
        Ok(Transaction::new(self.handle(), branch.to_string(), base))
    }

    /// Returns a read-only view of `commit`.
    ///
    /// The commit is not checked here; reads on an unknown commit fail with
    /// [`StoreError::CommitNotFound`].
    pub fn snapshot(&self, commit: CommitId) -> Snapshot {
        Snapshot::new(self.handle(), commit)
    }

    /// Returns a view of the current head of `branch`.
    pub async fn snapshot_of(&self, branch: &str) -> Result<Snapshot> {
        let head = self.backend.head(branch).await?;
        Ok(self.snapshot(head))
    }

    /// Returns the commits that advanced `branch`, oldest first.
    pub async fn history(&self, branch: &str) -> Result<Vec<CommitInfo>> {
        self.backend.history(branch).await
    }

    /// Reads one value from the current head of `branch`.
    pub async fn read(&self, branch: &str, path: impl IntoPath) -> Result<String> {
        let path: Path = path.into_path()?;
        let head = self.backend.head(branch).await?;
        self.backend.read(&head, &path).await
    }
}
