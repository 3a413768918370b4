//! Application services

pub mod builder;
pub mod reconcile;

pub use builder::{BuildOptions, TreeBuilder};
pub use reconcile::{Reconciler, Reconciliation};
