//! Application layer: factories and services
//!
//! This layer orchestrates domain logic and depends on I/O boundary traits.

pub mod error;
pub mod factory;
pub mod services;

pub use error::{ApplicationError, ApplicationResult, BuildError, BuildResult, PartialBuild};
pub use factory::NodeFactory;
pub use services::{BuildOptions, Reconciler, Reconciliation, TreeBuilder};
