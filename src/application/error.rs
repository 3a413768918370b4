//! Application-level errors (wraps domain and transport errors)

use std::fmt;

use thiserror::Error;

use crate::domain::{DomainError, ObjectId, ObjectKind, Orphan};
use crate::infrastructure::TransportError;

/// The fetch that broke a build and everything resolved before it.
#[derive(Debug)]
pub struct PartialBuild {
    /// Parent whose children were being fetched
    pub parent: ObjectId,
    /// Kind of children being fetched
    pub kind: ObjectKind,
    pub source: TransportError,
    /// Fully-resolved subtrees cut loose by the failure, in sibling order
    /// from the failing level upwards. Diagnostic only.
    pub resolved: Vec<Orphan>,
}

impl fmt::Display for PartialBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetching {} children of {} failed after partial progress: {}",
            self.kind, self.parent, self.source
        )
    }
}

/// Failure of a single `build` call. A build either yields a complete tree
/// or one of these; partial trees are never returned as success.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("object {0} does not exist")]
    Resolution(ObjectId),

    #[error("cannot resolve build root: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    PartialBuild(Box<PartialBuild>),

    #[error("build cancelled")]
    Cancelled,

    #[error("{0}")]
    Domain(#[from] DomainError),
}

impl BuildError {
    /// The partial orphan graph carried by a `PartialBuild`.
    pub fn partial(&self) -> Option<&PartialBuild> {
        match self {
            BuildError::PartialBuild(partial) => Some(partial),
            _ => None,
        }
    }
}

/// Result type for tree builds.
pub type BuildResult<T> = Result<T, BuildError>;

/// Application errors wrap build errors and add configuration concerns.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("config error: {message}")]
    Config { message: String },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
