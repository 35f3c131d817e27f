use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use layerconf::{
    Client, CommitId, InMemory, Path, Record, Result,
    store::{Backend, CommitInfo, Op, StoreError},
};

// ==========================
// CORE TEST FACTORIES
// ==========================

/// Connects a client to a fresh in-memory store.
pub async fn test_client() -> Client {
    Client::dial(InMemory::new())
        .await
        .expect("In-memory store should be reachable")
}

/// Opens the record used across tests: `["master", "defaults"]`, rooted at `tests`.
pub async fn test_record(client: &Client) -> Record {
    Record::new(client, ["master", "defaults"], "defaults", "state", "tests")
        .await
        .expect("Record should open")
}

/// Creates a client and the standard test record.
pub async fn setup() -> (Client, Record) {
    let client = test_client().await;
    let record = test_record(&client).await;
    (client, record)
}

/// Writes one value to `branch` in its own commit.
pub async fn write(client: &Client, branch: &str, path: &str, value: &str) {
    let mut txn = client
        .new_transaction(branch)
        .await
        .expect("Branch should exist");
    txn.write(path, value).expect("Path should be valid");
    txn.commit("Write test").await.expect("Commit should succeed");
}

/// Removes one path from `branch` in its own commit.
pub async fn rm(client: &Client, branch: &str, path: &str) {
    let mut txn = client
        .new_transaction(branch)
        .await
        .expect("Branch should exist");
    txn.remove(path).expect("Path should be valid");
    txn.commit("Remove test").await.expect("Commit should succeed");
}

/// Reads the value at `path` on the current head of `branch`, if any.
pub async fn read(client: &Client, branch: &str, path: &str) -> Option<String> {
    match client.read(branch, path).await {
        Ok(value) => Some(value),
        Err(e) if e.is_not_found() => None,
        Err(e) => panic!("Unexpected store error: {e}"),
    }
}

// ==========================
// FAULT INJECTION
// ==========================

/// A backend wrapper that can stall reads or reject commits on chosen branches.
#[derive(Debug, Default)]
pub struct Faulty {
    inner: InMemory,
    stall: AtomicBool,
    stall_after_commit: AtomicBool,
    conflicting: Mutex<HashSet<String>>,
}

impl Faulty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemory {
        &self.inner
    }

    /// While set, every head lookup hangs.
    pub fn set_stall(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    /// Starts stalling head lookups once the next commit has gone through.
    pub fn stall_after_next_commit(&self) {
        self.stall_after_commit.store(true, Ordering::SeqCst);
    }

    /// While set, commits to `branch` fail as if another writer got there first.
    pub fn set_conflicting(&self, branch: &str, conflicting: bool) {
        let mut branches = self.conflicting.lock().unwrap();
        if conflicting {
            branches.insert(branch.to_string());
        } else {
            branches.remove(branch);
        }
    }
}

#[async_trait]
impl Backend for Faulty {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn head(&self, branch: &str) -> Result<CommitId> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.head(branch).await
    }

    async fn branches(&self) -> Result<Vec<String>> {
        self.inner.branches().await
    }

    async fn create_branch(&self, branch: &str, at: Option<&CommitId>) -> Result<CommitId> {
        self.inner.create_branch(branch, at).await
    }

    async fn commit(
        &self,
        branch: &str,
        base: &CommitId,
        ops: &[Op],
        message: &str,
    ) -> Result<CommitId> {
        if self.conflicting.lock().unwrap().contains(branch) {
            return Err(StoreError::Conflict {
                branch: branch.to_string(),
                expected: base.clone(),
                actual: CommitId::from("0000000000000000"),
            }
            .into());
        }
        let head = self.inner.commit(branch, base, ops, message).await?;
        if self.stall_after_commit.swap(false, Ordering::SeqCst) {
            self.set_stall(true);
        }
        Ok(head)
    }

    async fn read(&self, commit: &CommitId, path: &Path) -> Result<String> {
        self.inner.read(commit, path).await
    }

    async fn list(&self, commit: &CommitId, path: &Path) -> Result<Vec<String>> {
        self.inner.list(commit, path).await
    }

    async fn history(&self, branch: &str) -> Result<Vec<CommitInfo>> {
        self.inner.history(branch).await
    }
}

/// Connects a client to a shared [`Faulty`] backend.
pub async fn faulty_client() -> (Client, Arc<Faulty>) {
    let backend = Arc::new(Faulty::new());
    let client = Client::dial_shared(backend.clone())
        .await
        .expect("Backend should be reachable");
    (client, backend)
}
