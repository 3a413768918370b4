//! I/O boundary traits for testability
//!
//! The tree engine never talks to the remote system directly; it goes
//! through an [`ObjectSource`], which lets services be tested with
//! in-memory implementations.

use async_trait::async_trait;

use crate::domain::{ObjectId, ObjectKind, ObjectRecord};
use crate::infrastructure::error::TransportResult;

/// Remote query abstraction.
///
/// Implementations must be idempotent: repeating a call without remote-side
/// changes returns the same records in the same order. Authentication and
/// rate-limit failures surface as errors, never as empty results.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch all objects of `kind` whose parent is `parent`, in remote order.
    async fn fetch(&self, kind: ObjectKind, parent: ObjectId) -> TransportResult<Vec<ObjectRecord>>;

    /// Look a single object up by id. `Ok(None)` when it does not exist.
    async fn resolve(&self, id: ObjectId) -> TransportResult<Option<ObjectRecord>>;
}
