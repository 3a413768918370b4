//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::NodeKey;

/// Domain errors represent violations of tree invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("node {0} appears more than once in the tree")]
    DuplicateNode(NodeKey),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
