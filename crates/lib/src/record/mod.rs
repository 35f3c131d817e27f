//! Configuration records resolved across prioritized branches.
//!
//! A [`Record`] binds an ordered list of search branches, a defaults branch,
//! a state branch and a base path. Typed [`Field`]s registered on it resolve
//! to the first value found under `base_path/name`, scanning the search
//! branches in order.
//!
//! ## Defaults
//!
//! Registering a field whose default is not what the defaults branch holds
//! queues the default for materialization. Queued defaults take the place of
//! the defaults branch's content immediately and are written to it by
//! [`Record::wait`] or [`Record::seal`]. After sealing, defaults are no longer
//! written: a field no branch holds simply reports its in-process default.
//!
//! ## Change detection
//!
//! Every field carries a [`Version`]. [`Record::wait`] re-resolves all fields
//! against the current branch heads and moves a field's version only when its
//! raw stored content changed, so [`Field::has_changed`] is a cheap comparison.
//!
//! ## Upgrades
//!
//! The state branch records a schema version per record. Steps registered with
//! [`Record::on_upgrade`] move the stored configuration forward, each committed
//! separately and followed by persisting its version.
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use layerconf::{Client, InMemory, Record};
//!
//! let client = Client::dial(InMemory::new()).await?;
//! let record = Record::new(&client, ["master", "defaults"], "defaults", "state", "tests").await?;
//!
//! let workers = record.int_field("workers", 4).await?;
//! let (value, version) = workers.get();
//! assert_eq!(value, 4);
//!
//! let mut txn = client.new_transaction("master").await?;
//! txn.write("tests/workers", "8")?;
//! txn.commit("more workers").await?;
//!
//! record.wait().await?;
//! assert!(workers.has_changed(version));
//! assert_eq!(workers.value(), 8);
//! # Ok::<(), layerconf::Error>(())
//! # }).unwrap();
//! ```

mod errors;
mod field;
mod options;
mod resolver;
mod upgrade;


use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use handle_trait::Handle;
use tokio::sync::Mutex;

pub use errors::RecordError;
pub use field::{Field, FieldKind, FieldValue, Version};
use field::{FieldCell, Observed};
pub use options::RecordOptions;
use resolver::Layers;
pub use upgrade::Migration;
use upgrade::UpgradeStep;

use crate::{
    Path, Result,
    constants::{
        DEFAULT_SCHEMA_VERSION, DEFAULTS_COMMIT_MESSAGE, SCHEMA_COMMIT_MESSAGE,
        SCHEMA_VERSION_KEY, STATE_COMMIT_MESSAGE,
    },
    path::IntoPath,
    store::{Client, CommitId, Op},
};

/// Mutable record state, guarded by one lock.
#[derive(Default)]
struct RecordState {
    fields: BTreeMap<String, Arc<FieldCell>>,
    /// Defaults not yet written to the defaults branch, keyed by full path
    pending: BTreeMap<Path, String>,
    upgrades: BTreeMap<u64, UpgradeStep>,
    /// Upgrade steps run by this record, never repeated
    applied: BTreeSet<u64>,
    /// Search branch heads seen by the last resolution
    heads: BTreeMap<String, Option<CommitId>>,
}

struct RecordInner {
    client: Client,
    options: RecordOptions,
    state: Mutex<RecordState>,
    generation: AtomicU64,
    schema_version: AtomicU64,
    sealed: AtomicBool,
}

/// A configuration handle over an ordered list of branches.
///
/// `Record` is cheap to clone; clones share fields and state. At most one
/// registration, wait, seal or upgrade runs at a time. Reading fields never
/// waits for them.
///
/// Registration and [`Record::wait`] publish field values in one step at the
/// end, so dropping the future early leaves every field as it was. An interrupted [`Record::upgrade`] resumes after its last persisted
/// step.
#[derive(Clone, Handle)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("options", &self.inner.options)
            .field("generation", &self.generation())
            .field("schema_version", &self.schema_version())
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}

impl Record {
    /// Opens a record over `search_branches`, highest priority first.
    ///
    /// `defaults_branch` must be one of the search branches other than the
    /// first. The defaults and state branches are created if they do not exist
    /// yet.
    pub async fn new(
        client: &Client,
        search_branches: impl IntoIterator<Item = impl Into<String>>,
        defaults_branch: impl Into<String>,
        state_branch: impl Into<String>,
        base_path: impl IntoPath,
    ) -> Result<Self> {
        let options = RecordOptions::new(
            search_branches,
            defaults_branch,
            state_branch,
            base_path.into_path()?,
        );
        Self::open(client, options).await
    }

    /// Opens a record from validated options.
    pub async fn open(client: &Client, options: RecordOptions) -> Result<Self> {
        options.validate()?;
        client.ensure_branch(&options.defaults_branch).await?;
        client.ensure_branch(&options.state_branch).await?;

        let schema_version = read_schema_version(client, &options).await?;
        tracing::debug!(
            search = ?options.search_branches,
            defaults = %options.defaults_branch,
            base_path = %options.base_path,
            schema_version,
            "Opened record"
        );

        Ok(Self {
            inner: Arc::new(RecordInner {
                client: client.handle(),
                options,
                state: Mutex::new(RecordState::default()),
                generation: AtomicU64::new(0),
                schema_version: AtomicU64::new(schema_version),
                sealed: AtomicBool::new(false),
            }),
        })
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn options(&self) -> &RecordOptions {
        &self.inner.options
    }

    /// Number of completed resynchronizations. Never decreases.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn schema_version(&self) -> u64 {
        self.inner.schema_version.load(Ordering::SeqCst)
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::SeqCst)
    }

    /// Names of all registered fields, sorted.
    pub async fn field_names(&self) -> Vec<String> {
        self.inner.state.lock().await.fields.keys().cloned().collect()
    }

    /// Search branch heads observed by the last resolution. Missing branches
    /// map to `None`.
    pub async fn heads(&self) -> BTreeMap<String, Option<CommitId>> {
        self.inner.state.lock().await.heads.clone()
    }

    /// Registers a string field, or returns the one already registered.
    pub async fn string_field(
        &self,
        name: &str,
        default: impl Into<String>,
    ) -> Result<Field<String>> {
        self.field(name, default.into()).await
    }

    /// Registers an integer field, or returns the one already registered.
    ///
    /// Stored content that is not an integer resolves to `default`.
    pub async fn int_field(&self, name: &str, default: i64) -> Result<Field<i64>> {
        self.field(name, default).await
    }

    /// Registers a boolean field, or returns the one already registered.
    ///
    /// Stored content that is not a boolean resolves to `default`.
    pub async fn bool_field(&self, name: &str, default: bool) -> Result<Field<bool>> {
        self.field(name, default).await
    }

    /// Registers a field of any [`FieldValue`] type.
    ///
    /// `name` may be nested (`"net/port"`). Registering a name again returns
    /// the existing field, whose first default stays in effect.
    ///
    /// # Errors
    /// Returns [`RecordError::FieldTypeMismatch`] if `name` is registered with
    /// another type, and store errors if the branches cannot be read.
    pub async fn field<T: FieldValue>(&self, name: &str, default: T) -> Result<Field<T>> {
        let relative = name.into_path()?;
        relative.require_non_empty()?;
        let key = relative.to_string();

        let mut state = self.inner.state.lock().await;
        if let Some(cell) = state.fields.get(&key) {
            if cell.kind != T::KIND {
                return Err(RecordError::FieldTypeMismatch {
                    name: key,
                    registered: cell.kind,
                    requested: T::KIND,
                }
                .into());
            }
            return Ok(Field::new(Arc::clone(cell)));
        }

        let path = self.inner.options.base_path.join(&relative);
        let layers = self.capture().await?;

        let mut queued = None;
        if !self.is_sealed() {
            let rendered = default.render();
            let stored = match layers.defaults() {
                Some(snapshot) => snapshot.try_read(&path).await?,
                None => None,
            };
            if stored.as_deref() != Some(rendered.as_str()) {
                queued = Some(rendered);
            }
        }

        let raw = match &queued {
            Some(value) => {
                let mut overlay = state.pending.clone();
                overlay.insert(path.clone(), value.clone());
                layers.resolve(&path, &overlay).await?
            }
            None => layers.resolve(&path, &state.pending).await?,
        };

        let version = Version(self.generation());
        let cell = Arc::new(FieldCell::new(
            key.clone(),
            path.clone(),
            default,
            raw,
            version,
        ));

        if let Some(value) = queued {
            tracing::debug!(field = %key, default = %value, "Queued default for materialization");
            state.pending.insert(path, value);
        }
        state.heads = layers.heads();
        state.fields.insert(key.clone(), Arc::clone(&cell));
        tracing::debug!(field = %key, kind = %T::KIND, %version, "Registered field");

        Ok(Field::new(cell))
    }

    /// Resynchronizes every field with the current branch heads.
    ///
    /// Queued defaults are written first. A conflict while writing them is
    /// logged and they stay queued for the next call. Then every field is
    /// resolved again; fields whose raw content changed get a new version.
    /// The generation is incremented once per call.
    pub async fn wait(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let mut flushed = false;
        if !self.is_sealed() && !state.pending.is_empty() {
            match self.flush(&state.pending).await {
                Ok(()) => flushed = true,
                Err(e) if e.is_conflict() => {
                    tracing::warn!(
                        branch = %self.inner.options.defaults_branch,
                        pending = state.pending.len(),
                        error = %e,
                        "Defaults branch moved, keeping defaults queued"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        // Written defaults stay queued until the pass completes; flushing
        // them again commits nothing.
        self.resync(&mut state).await?;
        if flushed {
            state.pending.clear();
        }
        Ok(())
    }

    /// [`Record::wait`] bounded by a deadline.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) if the deadline
    /// elapses. The record is then unchanged, though queued defaults may
    /// already have been written to the defaults branch.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        crate::with_timeout(timeout, self.wait()).await
    }

    /// Writes all queued defaults and stops materializing new ones.
    ///
    /// Sealing twice is a no-op.
    ///
    /// # Errors
    /// If queued defaults cannot be written the error is returned and the
    /// record stays unsealed.
    pub async fn seal(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if self.is_sealed() {
            return Ok(());
        }
        if !state.pending.is_empty() {
            self.flush(&state.pending).await?;
            state.pending.clear();
        }
        self.inner.sealed.store(true, Ordering::SeqCst);
        tracing::info!(
            base_path = %self.inner.options.base_path,
            fields = state.fields.len(),
            "Sealed record"
        );
        Ok(())
    }

    /// Registers the migration step that brings stored data to `version`.
    ///
    /// # Errors
    /// Returns [`RecordError::DuplicateUpgradeStep`] if `version` already has a step.
    pub async fn on_upgrade<F>(&self, version: u64, step: F) -> Result<()>
    where
        F: Fn(&mut Migration) -> Result<()> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().await;
        if state.upgrades.contains_key(&version) {
            return Err(RecordError::DuplicateUpgradeStep { version }.into());
        }
        state.upgrades.insert(version, Arc::new(step));
        tracing::debug!(version, "Registered upgrade step");
        Ok(())
    }

    /// Moves the stored configuration to schema version `target`.
    ///
    /// Does nothing if the schema version is already `target` or newer.
    /// Otherwise every registered step in `(current, target]` runs in
    /// ascending order. Each step's changes are committed to the primary
    /// search branch, then its version is persisted, so an interrupted
    /// upgrade resumes after the last finished step. Fields are resynchronized
    /// afterwards, also when a step fails.
    ///
    /// # Errors
    /// A failing step or commit stops the upgrade at the last finished step.
    pub async fn upgrade(&self, target: u64) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let current = self.schema_version();
        if target <= current {
            tracing::debug!(current, target, "Schema already up to date");
            return Ok(());
        }

        tracing::info!(from = current, to = target, "Upgrading record schema");
        let outcome = self.run_steps(&mut state, current, target).await;
        let resynced = self.resync(&mut state).await;
        match (outcome, resynced) {
            (Ok(()), resynced) => resynced,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(resync_err)) => {
                tracing::warn!(error = %resync_err, "Resync after failed upgrade also failed");
                Err(e)
            }
        }
    }

    async fn run_steps(&self, state: &mut RecordState, current: u64, target: u64) -> Result<()> {
        let steps: Vec<(u64, UpgradeStep)> = state
            .upgrades
            .range(current + 1..=target)
            .map(|(version, step)| (*version, Arc::clone(step)))
            .collect();

        for (version, step) in steps {
            if state.applied.contains(&version) {
                tracing::debug!(version, "Upgrade step already applied, skipping");
            } else {
                self.apply_step(version, &step, &state.pending).await?;
                state.applied.insert(version);
            }
            self.persist_schema_version(version).await?;
            tracing::info!(version, "Applied upgrade step");
        }

        if self.schema_version() < target {
            self.persist_schema_version(target).await?;
        }
        Ok(())
    }

    /// Writes runtime state under the base path in the state branch.
    pub async fn set_state(&self, name: &str, value: impl Into<String>) -> Result<()> {
        let path = self.state_path(name)?;
        let mut txn = self
            .inner
            .client
            .new_transaction(&self.inner.options.state_branch)
            .await?;
        txn.write(&path, value)?;
        txn.commit(STATE_COMMIT_MESSAGE).await?;
        Ok(())
    }

    /// Reads runtime state written by [`Record::set_state`].
    pub async fn state(&self, name: &str) -> Result<Option<String>> {
        let path = self.state_path(name)?;
        let snapshot = self
            .inner
            .client
            .snapshot_of(&self.inner.options.state_branch)
            .await?;
        snapshot.try_read(&path).await
    }

    fn state_path(&self, name: &str) -> Result<Path> {
        let relative = name.into_path()?;
        relative.require_non_empty()?;
        if relative.segments() == [SCHEMA_VERSION_KEY] {
            return Err(RecordError::ReservedKey {
                key: SCHEMA_VERSION_KEY.to_string(),
            }
            .into());
        }
        Ok(self.inner.options.base_path.join(&relative))
    }

    async fn capture(&self) -> Result<Layers> {
        Layers::capture(
            &self.inner.client,
            &self.inner.options.search_branches,
            &self.inner.options.defaults_branch,
        )
        .await
    }

    /// Re-resolves every field and publishes changes in one step.
    async fn resync(&self, state: &mut RecordState) -> Result<()> {
        let layers = self.capture().await?;
        let generation = self.generation() + 1;

        let mut updates = Vec::new();
        for cell in state.fields.values() {
            let raw = layers.resolve(&cell.path, &state.pending).await?;
            if raw != cell.raw() {
                let value = cell.interpret(raw.as_deref());
                updates.push((
                    Arc::clone(cell),
                    Observed {
                        raw,
                        value,
                        version: Version(generation),
                    },
                ));
            }
        }

        let changed = updates.len();
        for (cell, observed) in updates {
            tracing::debug!(field = %cell.name, version = %observed.version, "Field changed");
            cell.publish(observed);
        }
        state.heads = layers.heads();
        self.inner.generation.store(generation, Ordering::SeqCst);

        tracing::debug!(
            generation,
            changed,
            fields = state.fields.len(),
            "Resynchronized record"
        );
        Ok(())
    }

    /// Writes queued defaults to the defaults branch in one commit.
    async fn flush(&self, pending: &BTreeMap<Path, String>) -> Result<()> {
        let branch = &self.inner.options.defaults_branch;
        let mut txn = self.inner.client.new_transaction(branch).await?;
        for (path, value) in pending {
            txn.write(path, value.as_str())?;
        }
        let head = txn.commit(DEFAULTS_COMMIT_MESSAGE).await?;
        tracing::info!(
            branch = %branch,
            count = pending.len(),
            head = head.short(),
            "Materialized defaults"
        );
        Ok(())
    }

    async fn apply_step(
        &self,
        version: u64,
        step: &UpgradeStep,
        pending: &BTreeMap<Path, String>,
    ) -> Result<()> {
        let options = &self.inner.options;
        let client = &self.inner.client;
        let primary = options.primary_branch();

        let mut txn = client.new_transaction(primary).await?;
        let primary_values =
            resolver::leaves(&client.snapshot(txn.base().clone()), &options.base_path).await?;
        let layers = self.capture().await?;
        let lower = layers
            .merged_leaves(
                &options.base_path,
                options.search_branches.iter().skip(1).map(String::as_str),
                pending,
            )
            .await?;

        let mut migration =
            Migration::new(version, options.base_path.clone(), primary_values, lower);
        if let Err(e) = step(&mut migration) {
            tracing::warn!(version, error = %e, "Upgrade step failed");
            return Err(e);
        }

        let ops = migration.into_ops();
        if ops.is_empty() {
            tracing::debug!(version, "Upgrade step made no changes");
            return Ok(());
        }
        let count = ops.len();
        for op in ops {
            match op {
                Op::Write { path, value } => txn.write(path, value)?,
                Op::Remove { path } => txn.remove(path)?,
            }
        }
        let head = txn
            .commit(&format!("Upgrade schema to version {version}"))
            .await?;
        tracing::debug!(
            version,
            branch = primary,
            ops = count,
            head = head.short(),
            "Committed upgrade step"
        );
        Ok(())
    }

    async fn persist_schema_version(&self, version: u64) -> Result<()> {
        let path = self.inner.options.base_path.child(SCHEMA_VERSION_KEY)?;
        let mut txn = self
            .inner
            .client
            .new_transaction(&self.inner.options.state_branch)
            .await?;
        txn.write(&path, version.to_string())?;
        txn.commit(SCHEMA_COMMIT_MESSAGE).await?;
        self.inner.schema_version.store(version, Ordering::SeqCst);
        Ok(())
    }
}

async fn read_schema_version(client: &Client, options: &RecordOptions) -> Result<u64> {
    let path = options.base_path.child(SCHEMA_VERSION_KEY)?;
    match client.read(&options.state_branch, &path).await {
        Ok(raw) => match raw.trim().parse() {
            Ok(version) => Ok(version),
            Err(_) => {
                tracing::warn!(
                    branch = %options.state_branch,
                    raw = %raw,
                    "Malformed schema version, assuming default"
                );
                Ok(DEFAULT_SCHEMA_VERSION)
            }
        },
        Err(e) if e.is_not_found() => Ok(DEFAULT_SCHEMA_VERSION),
        Err(e) => Err(e),
    }
}
