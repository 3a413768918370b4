//! Per-kind strategies for fetching and wrapping monitoring objects.

use tracing::{debug, warn};

use crate::domain::{ObjectId, ObjectKind, ObjectRecord, Orphan};
use crate::infrastructure::traits::ObjectSource;
use crate::infrastructure::TransportResult;

/// Fetch-and-wrap strategy for one object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeFactory {
    Probe,
    Group,
    Device,
    Sensor,
    Channel,
}

const ROOT_CHILDREN: &[NodeFactory] = &[NodeFactory::Probe];
const CONTAINER_CHILDREN: &[NodeFactory] = &[NodeFactory::Group, NodeFactory::Device];
const DEVICE_CHILDREN: &[NodeFactory] = &[NodeFactory::Sensor];
const SENSOR_CHILDREN: &[NodeFactory] = &[NodeFactory::Channel];
const NO_CHILDREN: &[NodeFactory] = &[];

impl NodeFactory {
    pub const fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Probe => NodeFactory::Probe,
            ObjectKind::Group => NodeFactory::Group,
            ObjectKind::Device => NodeFactory::Device,
            ObjectKind::Sensor => NodeFactory::Sensor,
            ObjectKind::Channel => NodeFactory::Channel,
        }
    }

    pub const fn kind(self) -> ObjectKind {
        match self {
            NodeFactory::Probe => ObjectKind::Probe,
            NodeFactory::Group => ObjectKind::Group,
            NodeFactory::Device => ObjectKind::Device,
            NodeFactory::Sensor => ObjectKind::Sensor,
            NodeFactory::Channel => ObjectKind::Channel,
        }
    }

    /// Factories producing the children of `record`, in attachment order.
    pub fn children_of(record: &ObjectRecord, include_channels: bool) -> &'static [NodeFactory] {
        match record.kind {
            ObjectKind::Group if record.is_root() => ROOT_CHILDREN,
            ObjectKind::Probe | ObjectKind::Group => CONTAINER_CHILDREN,
            ObjectKind::Device => DEVICE_CHILDREN,
            ObjectKind::Sensor if include_channels => SENSOR_CHILDREN,
            ObjectKind::Sensor | ObjectKind::Channel => NO_CHILDREN,
        }
    }

    /// Fetch the objects of this factory's kind directly below `parent`.
    ///
    /// An empty list means no children or a parent that no longer exists;
    /// the remote system does not distinguish the two. Records that do not
    /// report `parent` as their parent, or are of another kind, are dropped.
    pub async fn fetch_children(
        self,
        source: &dyn ObjectSource,
        parent: ObjectId,
    ) -> TransportResult<Vec<ObjectRecord>> {
        let kind = self.kind();
        let mut records = source.fetch(kind, parent).await?;
        let fetched = records.len();

        records.retain(|record| {
            let belongs = record.kind == kind && record.parent_id == Some(parent);
            if !belongs {
                warn!(
                    id = %record.id,
                    reported_kind = %record.kind,
                    reported_parent = ?record.parent_id,
                    %kind,
                    %parent,
                    "dropping record that does not match its query"
                );
            }
            belongs
        });

        debug!(%kind, %parent, fetched, kept = records.len(), "fetched children");
        Ok(records)
    }

    /// Wrap a record and its resolved children. Pure, performs no I/O.
    pub fn wrap(self, record: ObjectRecord, children: Vec<Orphan>) -> Orphan {
        debug_assert_eq!(record.kind, self.kind());
        Orphan::new(record, children)
    }
}
