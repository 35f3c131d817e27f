//! Priority resolution across an ordered list of branches.

use std::collections::BTreeMap;

use crate::{
    Path, Result,
    store::{Client, CommitId, Snapshot, StoreError},
};

/// The heads of every search branch, captured once so one resolution pass
/// reads a single point-in-time view of the store.
#[derive(Debug)]
pub(crate) struct Layers {
    /// Search branches in priority order, with their snapshot or `None` if
    /// the branch does not exist.
    layers: Vec<(String, Option<Snapshot>)>,
    defaults_branch: String,
}

impl Layers {
    /// Captures the current head of each branch in `search`.
    ///
    /// Missing branches are kept as empty layers; any other store error,
    /// such as the store being unreachable, is returned.
    pub(crate) async fn capture(
        client: &Client,
        search: &[String],
        defaults_branch: &str,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(search.len());
        for branch in search {
            let snapshot = match client.head(branch).await {
                Ok(head) => Some(client.snapshot(head)),
                Err(crate::Error::Store(StoreError::BranchNotFound { .. })) => {
                    tracing::trace!(branch = %branch, "Search branch missing, skipping");
                    None
                }
                Err(e) => return Err(e),
            };
            layers.push((branch.clone(), snapshot));
        }
        Ok(Self {
            layers,
            defaults_branch: defaults_branch.to_string(),
        })
    }

    /// The observed head of every search branch.
    pub(crate) fn heads(&self) -> BTreeMap<String, Option<CommitId>> {
        self.layers
            .iter()
            .map(|(branch, snapshot)| (branch.clone(), snapshot.as_ref().map(|s| s.commit().clone())))
            .collect()
    }

    /// Snapshot of the defaults branch, if it exists.
    pub(crate) fn defaults(&self) -> Option<&Snapshot> {
        self.layer(&self.defaults_branch)
    }

    pub(crate) fn layer(&self, branch: &str) -> Option<&Snapshot> {
        self.layers
            .iter()
            .find(|(name, _)| name == branch)
            .and_then(|(_, snapshot)| snapshot.as_ref())
    }

    /// Returns the first value found for `path`, in priority order.
    ///
    /// `overlay` holds not-yet-written defaults keyed by path; it takes the
    /// place of the defaults branch's content for the paths it covers.
    pub(crate) async fn resolve(
        &self,
        path: &Path,
        overlay: &BTreeMap<Path, String>,
    ) -> Result<Option<String>> {
        for (branch, snapshot) in &self.layers {
            if *branch == self.defaults_branch
                && let Some(pending) = overlay.get(path)
            {
                return Ok(Some(pending.clone()));
            }
            let Some(snapshot) = snapshot else {
                continue;
            };
            if let Some(value) = snapshot.try_read(path).await? {
                tracing::trace!(branch = %branch, path = %path, "Resolved value");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Leaf values under `dir` for each branch in `branches`, keyed by their
    /// path relative to `dir` and merged with the first branch winning.
    pub(crate) async fn merged_leaves(
        &self,
        dir: &Path,
        branches: impl Iterator<Item = &str>,
        overlay: &BTreeMap<Path, String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut merged = BTreeMap::new();
        for branch in branches {
            if branch == self.defaults_branch {
                for (path, value) in overlay {
                    if let Some(relative) = path.strip_prefix(dir)
                        && !relative.is_empty()
                    {
                        merged
                            .entry(relative.to_string())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
            let Some(snapshot) = self.layer(branch) else {
                continue;
            };
            for (key, value) in leaves(snapshot, dir).await? {
                merged.entry(key).or_insert(value);
            }
        }
        Ok(merged)
    }
}

/// Every leaf value below `dir` in one snapshot, keyed by its path relative
/// to `dir` (`"net/port"`).
pub(crate) async fn leaves(snapshot: &Snapshot, dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let mut dirs = vec![Path::root()];
    while let Some(relative) = dirs.pop() {
        let Some(children) = snapshot.try_list(&dir.join(&relative)).await? else {
            continue;
        };
        for name in children {
            let child = relative.child(name)?;
            match snapshot.try_read(&dir.join(&child)).await? {
                Some(value) => {
                    values.insert(child.to_string(), value);
                }
                None => dirs.push(child),
            }
        }
    }
    Ok(values)
}
