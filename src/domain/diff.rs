//! Structural and attribute delta between two tree snapshots.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::domain::arena::{Node, Tree};
use crate::domain::entities::NodeKey;

/// Keys added, removed and modified between two snapshots.
///
/// A node whose parent changed counts as removed and added; there is no move
/// detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: BTreeSet<NodeKey>,
    pub removed: BTreeSet<NodeKey>,
    pub modified: BTreeSet<NodeKey>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of reported changes.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added [{}] removed [{}] modified [{}]",
            self.added.iter().join(", "),
            self.removed.iter().join(", "),
            self.modified.iter().join(", ")
        )
    }
}

fn parent_key(tree: &Tree, node: &Node) -> Option<NodeKey> {
    tree.parent(node).map(Node::key)
}

/// Compare `current` against `previous` by node key.
#[instrument(level = "debug", skip_all, fields(previous = previous.len(), current = current.len()))]
pub fn diff(previous: &Tree, current: &Tree) -> DiffResult {
    let mut result = DiffResult::default();

    for node in current.walk() {
        let key = node.key();
        match previous.find(&key) {
            None => {
                result.added.insert(key);
            }
            Some(old) if parent_key(previous, old) != parent_key(current, node) => {
                result.removed.insert(key);
                result.added.insert(key);
            }
            Some(old) if old.record().differs_from(node.record()) => {
                result.modified.insert(key);
            }
            Some(_) => {}
        }
    }

    result.removed.extend(previous.keys().filter(|key| !current.contains(key)));

    debug!(
        added = result.added.len(),
        removed = result.removed.len(),
        modified = result.modified.len(),
        "diff computed"
    );
    result
}
