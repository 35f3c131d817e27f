//! Read-only views of one commit.

use super::{Client, CommitId};
use crate::{Result, path::IntoPath};

/// A read-only view of one immutable commit.
///
/// Reads through a snapshot always see the same data, however the branch
/// it came from moves afterwards.
#[derive(Debug, Clone)]
pub struct Snapshot {
    client: Client,
    commit: CommitId,
}

impl Snapshot {
    pub(crate) fn new(client: Client, commit: CommitId) -> Self {
        Self { client, commit }
    }

    pub fn commit(&self) -> &CommitId {
        &self.commit
    }

    /// Reads the leaf value at `path`.
    ///
    /// # Errors
    /// Returns a not-found error if there is no leaf at `path`.
    pub async fn read(&self, path: impl IntoPath) -> Result<String> {
        let path = path.into_path()?;
        self.client.backend().read(&self.commit, &path).await
    }

    /// Like [`Snapshot::read`], but maps a missing value to `None`.
    pub async fn try_read(&self, path: impl IntoPath) -> Result<Option<String>> {
        match self.read(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists the child names of the directory at `path`, sorted.
    pub async fn list(&self, path: impl IntoPath) -> Result<Vec<String>> {
        let path = path.into_path()?;
        self.client.backend().list(&self.commit, &path).await
    }

    /// Like [`Snapshot::list`], but maps a missing directory to `None`.
    pub async fn try_list(&self, path: impl IntoPath) -> Result<Option<Vec<String>>> {
        match self.list(path).await {
            Ok(children) => Ok(Some(children)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
