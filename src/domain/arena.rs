use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use generational_arena::{Arena, Index};
use termtree::Tree as DisplayTree;
use tracing::instrument;

use crate::domain::entities::{NodeKey, ObjectId, ObjectKind, ObjectRecord, ObjectStatus};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::orphan::Orphan;

/// An orphan attached to its slot in a [`Tree`].
#[derive(Debug)]
pub struct Node {
    /// Object this node represents
    record: ObjectRecord,
    /// Own slot in the arena
    slot: Index,
    /// Slot of the parent node, None for the root. Lookup only.
    parent: Option<Index>,
    /// Slots of the child nodes, in the order the remote system reported them
    children: Vec<Index>,
}

impl Node {
    pub fn record(&self) -> &ObjectRecord {
        &self.record
    }

    pub fn key(&self) -> NodeKey {
        self.record.key()
    }

    pub fn id(&self) -> ObjectId {
        self.record.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.record.kind
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn status(&self) -> ObjectStatus {
        self.record.status
    }

    pub fn slot(&self) -> Index {
        self.slot
    }

    pub fn parent_slot(&self) -> Option<Index> {
        self.parent
    }

    pub fn child_slots(&self) -> &[Index] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Immutable arena-backed hierarchy of monitoring objects.
///
/// Built once from a root [`Orphan`]; the key index is filled while folding
/// and never changes afterwards, so shared readers need no locking.
#[derive(Debug)]
pub struct Tree {
    arena: Arena<Node>,
    root: Index,
    index: HashMap<NodeKey, Index>,
    built_at: DateTime<Utc>,
    fetch_count: usize,
}

impl Tree {
    /// Fold a resolved orphan graph into a tree.
    ///
    /// Children are moved into their slots; the orphan is consumed.
    #[instrument(level = "debug", skip(orphan), fields(root = %orphan.key()))]
    pub fn from_orphan(orphan: Orphan) -> DomainResult<Self> {
        let capacity = orphan.node_count();
        let mut arena = Arena::with_capacity(capacity);
        let mut index = HashMap::with_capacity(capacity);

        let (record, children) = orphan.into_parts();
        let root = Self::attach(&mut arena, &mut index, record, None)?;

        let mut stack: Vec<(Orphan, Index)> = children
            .into_iter()
            .rev()
            .map(|child| (child, root))
            .collect();

        while let Some((orphan, parent)) = stack.pop() {
            let (record, children) = orphan.into_parts();
            let slot = Self::attach(&mut arena, &mut index, record, Some(parent))?;
            // Reverse push keeps siblings in fetch order when popped
            for child in children.into_iter().rev() {
                stack.push((child, slot));
            }
        }

        Ok(Self {
            arena,
            root,
            index,
            built_at: Utc::now(),
            fetch_count: 0,
        })
    }

    fn attach(
        arena: &mut Arena<Node>,
        index: &mut HashMap<NodeKey, Index>,
        record: ObjectRecord,
        parent: Option<Index>,
    ) -> DomainResult<Index> {
        let key = record.key();
        if index.contains_key(&key) {
            return Err(DomainError::DuplicateNode(key));
        }

        let slot = arena.insert_with(|slot| Node {
            record,
            slot,
            parent,
            children: Vec::new(),
        });
        index.insert(key, slot);

        if let Some(parent_node) = parent.and_then(|p| arena.get_mut(p)) {
            parent_node.children.push(slot);
        }
        Ok(slot)
    }

    pub(crate) fn with_fetch_count(mut self, fetch_count: usize) -> Self {
        self.fetch_count = fetch_count;
        self
    }

    pub fn root(&self) -> &Node {
        &self.arena[self.root]
    }

    pub fn get(&self, slot: Index) -> Option<&Node> {
        self.arena.get(slot)
    }

    pub fn find(&self, key: &NodeKey) -> Option<&Node> {
        self.index.get(key).and_then(|&slot| self.arena.get(slot))
    }

    /// Look up a probe, group, device or sensor by its object id.
    pub fn find_by_id(&self, id: ObjectId) -> Option<&Node> {
        self.find(&NodeKey::Object(id))
    }

    /// All nodes carrying `name`. Names are not unique on the remote system.
    pub fn find_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.walk().filter(move |node| node.name() == name)
    }

    pub fn children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> + 'a {
        node.children.iter().filter_map(move |&slot| self.arena.get(slot))
    }

    pub fn parent(&self, node: &Node) -> Option<&Node> {
        node.parent.and_then(|slot| self.arena.get(slot))
    }

    /// Parent, grandparent, ... up to and including the root.
    pub fn ancestors<'a>(&'a self, node: &'a Node) -> Ancestors<'a> {
        Ancestors {
            tree: self,
            next: node.parent,
        }
    }

    /// Pre-order traversal; each call starts a fresh walk.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(self)
    }

    pub fn walk_postorder(&self) -> PostOrderWalk<'_> {
        PostOrderWalk::new(self)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Number of remote fetches issued while building this tree.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.calculate_depth(self.root)
    }

    fn calculate_depth(&self, slot: Index) -> usize {
        if let Some(node) = self.arena.get(slot) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Nodes without children, in pre-order.
    pub fn leaf_nodes(&self) -> Vec<&Node> {
        self.walk().filter(|node| node.is_leaf()).collect()
    }

    pub fn to_tree_string(&self) -> DisplayTree<String> {
        fn build(tree: &Tree, node: &Node) -> DisplayTree<String> {
            let leaves: Vec<_> = tree.children(node).map(|c| build(tree, c)).collect();
            DisplayTree::new(node.record.to_string()).with_leaves(leaves)
        }
        build(self, self.root())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tree_string())
    }
}

pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<Index>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.arena.get(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

pub struct Walk<'a> {
    tree: &'a Tree,
    stack: Vec<Index>,
}

impl<'a> Walk<'a> {
    fn new(tree: &'a Tree) -> Self {
        Self {
            tree,
            stack: vec![tree.root],
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current) {
                // Push children in reverse order for left-to-right traversal
                self.stack.extend(node.children.iter().rev());
                return Some(node);
            }
        }
        None
    }
}

pub struct PostOrderWalk<'a> {
    tree: &'a Tree,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderWalk<'a> {
    fn new(tree: &'a Tree) -> Self {
        Self {
            tree,
            stack: vec![(tree.root, false)],
        }
    }
}

impl<'a> Iterator for PostOrderWalk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current) {
                if visited {
                    return Some(node);
                }
                self.stack.push((current, true));
                for &child in node.children.iter().rev() {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, kind: ObjectKind, parent: i64, name: &str) -> ObjectRecord {
        ObjectRecord::new(id, kind, Some(ObjectId(parent)), name)
    }

    #[test]
    fn given_duplicate_key_when_folding_then_fails() {
        let orphan = Orphan::new(
            record(1, ObjectKind::Probe, 0, "probe"),
            vec![
                Orphan::leaf(record(2, ObjectKind::Device, 1, "a")),
                Orphan::leaf(record(2, ObjectKind::Device, 1, "b")),
            ],
        );
        let err = Tree::from_orphan(orphan).unwrap_err();
        assert_eq!(err, DomainError::DuplicateNode(NodeKey::Object(ObjectId(2))));
    }

    #[test]
    fn given_single_orphan_when_folding_then_root_is_leaf() {
        let tree = Tree::from_orphan(Orphan::leaf(record(7, ObjectKind::Sensor, 3, "Ping"))).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.depth(), 1);
        assert!(tree.root().is_leaf());
        assert!(tree.parent(tree.root()).is_none());
        assert_eq!(tree.fetch_count(), 0);
    }
}
