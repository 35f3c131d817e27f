//! Immutable hierarchical trees stored in commits.
//!
//! Every commit is a full [`Node`] tree. A commit's identifier is the SHA-256
//! of the tree's canonical encoding, so two commits share an id exactly when
//! their contents are identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CommitId, Op};
use crate::Path;

/// One node of a commit tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// A value stored at a path.
    Leaf(String),
    /// A directory of named children. Children are kept sorted by name.
    Dir(BTreeMap<String, Node>),
}

impl Default for Node {
    fn default() -> Self {
        Node::Dir(BTreeMap::new())
    }
}

impl Node {
    /// Looks up the node at `path`.
    pub fn get(&self, path: &Path) -> Option<&Node> {
        let mut current = self;
        for segment in path.segments() {
            match current {
                Node::Dir(children) => current = children.get(segment)?,
                Node::Leaf(_) => return None,
            }
        }
        Some(current)
    }

    /// Returns the value of the leaf at `path`, if there is one.
    pub fn read(&self, path: &Path) -> Option<&str> {
        match self.get(path)? {
            Node::Leaf(value) => Some(value),
            Node::Dir(_) => None,
        }
    }

    /// Returns the names of the children of the directory at `path`.
    ///
    /// `None` means the path is absent; `Some(Err(()))` means it is a leaf.
    pub(crate) fn list(&self, path: &Path) -> Option<Result<Vec<String>, ()>> {
        match self.get(path)? {
            Node::Dir(children) => Some(Ok(children.keys().cloned().collect())),
            Node::Leaf(_) => Some(Err(())),
        }
    }

    /// Stores `value` at `path`.
    ///
    /// Leaves on the way are turned into directories and an existing directory
    /// at `path` is replaced by the leaf. Writing the root is a no-op.
    pub fn write(&mut self, path: &[String], value: &str) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = self;
        for segment in parents {
            let children = current.dir_mut();
            current = children.entry(segment.clone()).or_default();
        }
        current
            .dir_mut()
            .insert(last.clone(), Node::Leaf(value.to_string()));
    }

    /// Removes the leaf or subtree at `path`, pruning directories left empty.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&mut self, path: &[String]) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return false;
        };
        let Node::Dir(children) = self else {
            return false;
        };
        if rest.is_empty() {
            return children.remove(first).is_some();
        }
        let Some(child) = children.get_mut(first) else {
            return false;
        };
        let removed = child.remove(rest);
        if removed && matches!(child, Node::Dir(grandchildren) if grandchildren.is_empty()) {
            children.remove(first);
        }
        removed
    }

    /// Applies staged operations in order.
    pub fn apply(&mut self, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Write { path, value } => self.write(path.segments(), value),
                Op::Remove { path } => {
                    self.remove(path.segments());
                }
            }
        }
    }

    /// Content address of this tree.
    pub fn id(&self) -> CommitId {
        let mut hasher = Sha256::new();
        self.hash_into(&mut hasher);
        CommitId::new(hex::encode(hasher.finalize()))
    }

    fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            Node::Leaf(value) => {
                hasher.update(b"L");
                hasher.update((value.len() as u64).to_be_bytes());
                hasher.update(value.as_bytes());
            }
            Node::Dir(children) => {
                hasher.update(b"D");
                hasher.update((children.len() as u64).to_be_bytes());
                for (name, child) in children {
                    hasher.update((name.len() as u64).to_be_bytes());
                    hasher.update(name.as_bytes());
                    child.hash_into(hasher);
                }
            }
        }
    }

    fn dir_mut(&mut self) -> &mut BTreeMap<String, Node> {
        if let Node::Leaf(_) = self {
            *self = Node::default();
        }
        match self {
            Node::Dir(children) => children,
            Node::Leaf(_) => unreachable!("leaf replaced by directory above"),
        }
    }
}
