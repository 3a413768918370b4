//! Domain layer: monitoring objects, orphans, trees and diffs
//!
//! This layer is independent of external concerns (no I/O, no config loading).

pub mod arena;
pub mod diff;
pub mod entities;
pub mod error;
pub mod orphan;

pub use arena::{Node, Tree};
pub use diff::{diff, DiffResult};
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use orphan::Orphan;
