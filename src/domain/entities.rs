//! Domain entities: monitoring objects as reported by the remote system

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote object id, stable for the lifetime of the object on the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub i64);

/// Id of the synthetic root group. Its only children are probes.
pub const ROOT_ID: ObjectId = ObjectId(0);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Type tag of a monitoring object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Probe,
    Group,
    Device,
    Sensor,
    Channel,
}

impl ObjectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Probe => "probe",
            ObjectKind::Group => "group",
            ObjectKind::Device => "device",
            ObjectKind::Sensor => "sensor",
            ObjectKind::Channel => "channel",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitoring status of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    Up,
    Warning,
    Down,
    Paused,
    Unusual,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ObjectStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectStatus::Up => "up",
            ObjectStatus::Warning => "warning",
            ObjectStatus::Down => "down",
            ObjectStatus::Paused => "paused",
            ObjectStatus::Unusual => "unusual",
            ObjectStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node inside a tree.
///
/// Channel ids are only unique within their sensor, so channels are keyed by
/// the owning sensor as well. Every other kind is keyed by its object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Object(ObjectId),
    Channel { sensor: ObjectId, channel: ObjectId },
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Object(id) => write!(f, "{}", id),
            NodeKey::Channel { sensor, channel } => write!(f, "{}/{}", sensor, channel),
        }
    }
}

/// A monitoring object as returned by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// `None` only for the root of the remote hierarchy
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub status: ObjectStatus,
    /// Type-specific values (host, sensor type, unit, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ObjectRecord {
    pub fn new(
        id: impl Into<ObjectId>,
        kind: ObjectKind,
        parent_id: Option<ObjectId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id,
            name: name.into(),
            status: ObjectStatus::Up,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: ObjectStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Tree identity of this record.
    pub fn key(&self) -> NodeKey {
        match (self.kind, self.parent_id) {
            (ObjectKind::Channel, Some(sensor)) => NodeKey::Channel {
                sensor,
                channel: self.id,
            },
            _ => NodeKey::Object(self.id),
        }
    }

    /// Tree identity of the parent this record reports.
    ///
    /// Channels only ever hang below sensors, and everything else below
    /// objects keyed by plain id.
    pub fn parent_key(&self) -> Option<NodeKey> {
        self.parent_id.map(NodeKey::Object)
    }

    pub fn is_root(&self) -> bool {
        self.kind == ObjectKind::Group && self.id == ROOT_ID
    }

    /// True when the non-structural attributes differ.
    pub fn differs_from(&self, other: &ObjectRecord) -> bool {
        self.name != other.name
            || self.status != other.status
            || self.attributes != other.attributes
    }
}

impl fmt::Display for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) [{}]",
            self.kind, self.name, self.id, self.status
        )
    }
}
