//! Staged writes against one branch.

use super::{Client, CommitId, Op};
use crate::{Result, path::IntoPath};

/// A set of writes and removals staged against one branch.
///
/// The transaction is based on the branch head at the time it was opened.
/// Nothing is visible to readers until [`Transaction::commit`] succeeds, and
/// the commit fails with a conflict if the branch moved in the meantime.
/// Dropping a transaction without committing discards it.
#[derive(Debug)]
pub struct Transaction {
    client: Client,
    branch: String,
    base: CommitId,
    ops: Vec<Op>,
}

impl Transaction {
    pub(crate) fn new(client: Client, branch: String, base: CommitId) -> Self {
        Self {
            client,
            branch,
            base,
            ops: Vec::new(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The head this transaction is based on.
    pub fn base(&self) -> &CommitId {
        &self.base
    }

    /// Operations staged so far, in order.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Stages `value` at `path`. Later writes to the same path win.
    ///
    /// # Errors
    /// Returns a path error if `path` is malformed or the root.
    pub fn write(&mut self, path: impl IntoPath, value: impl Into<String>) -> Result<()> {
        let path = path.into_path()?;
        path.require_non_empty()?;
        self.ops.push(Op::Write {
            path,
            value: value.into(),
        });
        Ok(())
    }

    /// Stages removal of the leaf or subtree at `path`.
    ///
    /// Removing a path that does not exist is not an error.
    pub fn remove(&mut self, path: impl IntoPath) -> Result<()> {
        let path = path.into_path()?;
        path.require_non_empty()?;
        self.ops.push(Op::Remove { path });
        Ok(())
    }

    /// Atomically applies the staged operations and advances the branch.
    ///
    /// Returns the new head. If nothing changed the head is returned as is
    /// and no commit is recorded.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`](super::StoreError::Conflict) if the
    /// branch head moved since this transaction was opened.
    pub async fn commit(self, message: &str) -> Result<CommitId> {
        let head = self
            .client
            .backend()
            .commit(&self.branch, &self.base, &self.ops, message)
            .await?;
        tracing::debug!(
            branch = %self.branch,
            head = head.short(),
            ops = self.ops.len(),
            "Transaction committed"
        );
        Ok(head)
    }
}
