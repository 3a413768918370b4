//! sensortree: materializes the monitoring hierarchy of a remote system
//! (probes, groups, devices, sensors, channels) into immutable trees and
//! reconciles successive snapshots.
//!
//! Layers:
//! - `domain`: records, orphans, the arena tree and diffing
//! - `application`: node factories, the tree builder and the reconciler
//! - `infrastructure`: the object source boundary and service wiring
//! - `config`: layered settings

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod util;

pub use application::{BuildError, BuildOptions, BuildResult, Reconciler, TreeBuilder};
pub use config::Settings;
pub use domain::{diff, DiffResult, NodeKey, ObjectId, ObjectKind, ObjectRecord, Tree};
pub use infrastructure::{ObjectSource, StaticSource, TransportError};
