//! Resolved nodes that have not been attached to a parent yet.

use crate::domain::entities::{NodeKey, ObjectKind, ObjectRecord};

/// A fully-resolved object together with its already-resolved children.
///
/// Orphans only exist while a tree is being assembled. Attaching one to a
/// parent moves it into the parent's child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    record: ObjectRecord,
    children: Vec<Orphan>,
}

impl Orphan {
    pub fn new(record: ObjectRecord, children: Vec<Orphan>) -> Self {
        Self { record, children }
    }

    pub fn leaf(record: ObjectRecord) -> Self {
        Self::new(record, Vec::new())
    }

    pub fn record(&self) -> &ObjectRecord {
        &self.record
    }

    pub fn kind(&self) -> ObjectKind {
        self.record.kind
    }

    pub fn key(&self) -> NodeKey {
        self.record.key()
    }

    pub fn children(&self) -> &[Orphan] {
        &self.children
    }

    /// Number of records in this orphan including all descendants.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Orphan::node_count).sum::<usize>()
    }

    pub fn into_parts(self) -> (ObjectRecord, Vec<Orphan>) {
        (self.record, self.children)
    }
}
