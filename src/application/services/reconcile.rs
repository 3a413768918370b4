//! Reconciliation service
//!
//! Keeps the last successfully built tree and reports what changed on every
//! refresh.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::application::error::BuildResult;
use crate::application::services::builder::TreeBuilder;
use crate::domain::{diff, DiffResult, ObjectId, Tree};

/// Outcome of a successful refresh.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub tree: Arc<Tree>,
    pub diff: DiffResult,
}

pub struct Reconciler {
    builder: TreeBuilder,
    root: ObjectId,
    snapshot: Option<Arc<Tree>>,
}

impl Reconciler {
    pub fn new(builder: TreeBuilder, root: ObjectId) -> Self {
        Self {
            builder,
            root,
            snapshot: None,
        }
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Last tree produced by a successful refresh.
    pub fn snapshot(&self) -> Option<&Arc<Tree>> {
        self.snapshot.as_ref()
    }

    pub async fn refresh(&mut self) -> BuildResult<Reconciliation> {
        self.refresh_cancellable(CancellationToken::new()).await
    }

    /// Rebuild and diff against the retained snapshot.
    ///
    /// Without a prior snapshot every node is reported as added. A failed
    /// build leaves the retained snapshot untouched.
    #[instrument(level = "info", skip(self, cancel), fields(root = %self.root))]
    pub async fn refresh_cancellable(
        &mut self,
        cancel: CancellationToken,
    ) -> BuildResult<Reconciliation> {
        let tree = match self.builder.build_cancellable(self.root, cancel).await {
            Ok(tree) => Arc::new(tree),
            Err(e) => {
                warn!(error = %e, "refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let changes = match &self.snapshot {
            Some(previous) => diff(previous, &tree),
            None => DiffResult {
                added: tree.keys().copied().collect(),
                ..DiffResult::default()
            },
        };
        info!(
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            "reconciled"
        );

        self.snapshot = Some(Arc::clone(&tree));
        Ok(Reconciliation {
            tree,
            diff: changes,
        })
    }
}
