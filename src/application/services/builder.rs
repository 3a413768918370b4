//! Tree builder service
//!
//! Resolves a root object and recursively everything below it, one fetch per
//! (parent, child kind), and folds the result into an immutable [`Tree`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::application::error::{BuildError, BuildResult, PartialBuild};
use crate::application::factory::NodeFactory;
use crate::domain::{NodeKey, ObjectId, ObjectKind, ObjectRecord, Orphan, Tree};
use crate::infrastructure::traits::ObjectSource;

/// Per-build tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Maximum number of fetches in flight at once
    pub concurrency_limit: usize,
    /// Resolve channels below sensors
    pub include_channels: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            include_channels: false,
        }
    }
}

/// Materializes trees from an [`ObjectSource`].
pub struct TreeBuilder {
    source: Arc<dyn ObjectSource>,
    options: BuildOptions,
}

impl TreeBuilder {
    pub fn new(source: Arc<dyn ObjectSource>) -> Self {
        Self {
            source,
            options: BuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the tree rooted at `root`.
    pub async fn build(&self, root: ObjectId) -> BuildResult<Tree> {
        self.build_cancellable(root, CancellationToken::new()).await
    }

    /// Build the tree rooted at `root`, giving up once `cancel` fires.
    ///
    /// Cancellation is honored between fetches; a cancelled build discards
    /// everything resolved so far.
    #[instrument(level = "info", skip(self, cancel), fields(
        concurrency = self.options.concurrency_limit,
        channels = self.options.include_channels,
    ))]
    pub async fn build_cancellable(
        &self,
        root: ObjectId,
        cancel: CancellationToken,
    ) -> BuildResult<Tree> {
        let started = Instant::now();

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BuildError::Cancelled),
            resolved = self.source.resolve(root) => resolved?,
        };
        let record = resolved.ok_or(BuildError::Resolution(root))?;
        debug!(%record, "resolved build root");

        let run = BuildRun::new(self.source.as_ref(), &self.options, cancel);
        run.claim_nodes(vec![record.clone()]).await;

        match run.resolve(record).await {
            Ok(orphan) => {
                let tree = Tree::from_orphan(orphan)?.with_fetch_count(run.fetch_count());
                info!(
                    nodes = tree.len(),
                    fetches = tree.fetch_count(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "tree built"
                );
                Ok(tree)
            }
            Err(Failure::Transport(partial)) => {
                warn!(
                    parent = %partial.parent,
                    kind = %partial.kind,
                    resolved = partial.resolved.len(),
                    error = %partial.source,
                    "build aborted by transport failure"
                );
                Err(BuildError::PartialBuild(partial))
            }
            Err(Failure::Cancelled) | Err(Failure::Aborted(_)) => {
                info!(elapsed_ms = started.elapsed().as_millis(), "build cancelled");
                Err(BuildError::Cancelled)
            }
        }
    }
}

/// Why a branch stopped.
enum Failure {
    Transport(Box<PartialBuild>),
    /// Stopped because another branch hit a transport failure. Carries the
    /// subtrees this branch had completed until then.
    Aborted(Vec<Orphan>),
    /// Stopped by the caller's token
    Cancelled,
}

impl Failure {
    /// Combine failures of sibling branches, given in sibling order.
    ///
    /// The first transport failure wins and collects the orphans of every
    /// aborted or later failing sibling. Caller cancellation only wins when
    /// no transport failure was seen.
    fn merge(current: Option<Failure>, next: Failure) -> Failure {
        match (current, next) {
            (None, next) => next,
            (Some(Failure::Transport(mut first)), Failure::Transport(later)) => {
                first.resolved.extend(later.resolved);
                Failure::Transport(first)
            }
            (Some(Failure::Transport(mut first)), Failure::Aborted(resolved)) => {
                first.resolved.extend(resolved);
                Failure::Transport(first)
            }
            (Some(Failure::Aborted(mut resolved)), Failure::Transport(mut later)) => {
                resolved.append(&mut later.resolved);
                later.resolved = resolved;
                Failure::Transport(later)
            }
            (Some(Failure::Aborted(mut resolved)), Failure::Aborted(more)) => {
                resolved.extend(more);
                Failure::Aborted(resolved)
            }
            (Some(kept @ Failure::Transport(_)), Failure::Cancelled)
            | (Some(kept @ Failure::Aborted(_)), Failure::Cancelled) => kept,
            (Some(Failure::Cancelled), next) => next,
        }
    }

    /// Hand the siblings that did resolve at this level to the failure.
    /// Caller cancellation discards them.
    fn detach(self, resolved: Vec<Orphan>) -> Failure {
        match self {
            Failure::Transport(mut partial) => {
                partial.resolved.extend(resolved);
                Failure::Transport(partial)
            }
            Failure::Aborted(mut carried) => {
                carried.extend(resolved);
                Failure::Aborted(carried)
            }
            Failure::Cancelled => Failure::Cancelled,
        }
    }
}

/// Requests and nodes already claimed during one build.
///
/// Node claims already keep a parent from being expanded twice. Request
/// claims guard `fetch` itself, so a repeated (parent, kind) never reaches
/// the source even if a caller asks for it.
#[derive(Default)]
struct Ledger {
    requests: HashSet<(ObjectId, ObjectKind)>,
    nodes: HashSet<NodeKey>,
}

/// State of a single build. Everything but the ledger is owned by the
/// branch that created it.
struct BuildRun<'a> {
    source: &'a dyn ObjectSource,
    include_channels: bool,
    limiter: Semaphore,
    ledger: Mutex<Ledger>,
    /// Caller's token
    cancel: CancellationToken,
    /// Fires on caller cancellation or on the first transport failure
    abort: CancellationToken,
    fetches: AtomicUsize,
}

impl<'a> BuildRun<'a> {
    fn new(source: &'a dyn ObjectSource, options: &BuildOptions, cancel: CancellationToken) -> Self {
        Self {
            source,
            include_channels: options.include_channels,
            limiter: Semaphore::new(options.concurrency_limit.max(1)),
            ledger: Mutex::new(Ledger::default()),
            abort: cancel.child_token(),
            cancel,
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Failure for a branch stopped by `abort`.
    fn interrupted(&self) -> Failure {
        if self.cancel.is_cancelled() {
            Failure::Cancelled
        } else {
            Failure::Aborted(Vec::new())
        }
    }

    /// Resolve `record` and everything below it into an orphan.
    fn resolve(&self, record: ObjectRecord) -> BoxFuture<'_, Result<Orphan, Failure>> {
        async move {
            let factory = NodeFactory::for_kind(record.kind);
            let mut children = Vec::new();

            for &child_factory in NodeFactory::children_of(&record, self.include_channels) {
                let records = match self.fetch(child_factory, record.id).await {
                    Ok(records) => records,
                    Err(failure) => return Err(failure.detach(children)),
                };

                // join_all keeps positional order regardless of completion order
                let branches = records.into_iter().map(move |child| self.resolve(child));
                let mut failure = None;
                for outcome in join_all(branches).await {
                    match outcome {
                        Ok(orphan) => children.push(orphan),
                        Err(next) => failure = Some(Failure::merge(failure, next)),
                    }
                }
                if let Some(failure) = failure {
                    return Err(failure.detach(children));
                }
            }

            Ok(factory.wrap(record, children))
        }
        .boxed()
    }

    async fn fetch(
        &self,
        factory: NodeFactory,
        parent: ObjectId,
    ) -> Result<Vec<ObjectRecord>, Failure> {
        let kind = factory.kind();
        if !self.claim_request(parent, kind).await {
            warn!(%kind, %parent, "request already issued in this build, skipping");
            return Ok(Vec::new());
        }
        if self.abort.is_cancelled() {
            return Err(self.interrupted());
        }

        let permit = tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Err(self.interrupted()),
            permit = self.limiter.acquire() => permit.map_err(|_| Failure::Cancelled)?,
        };

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let fetched = tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Err(self.interrupted()),
            fetched = factory.fetch_children(self.source, parent) => fetched,
        };
        drop(permit);

        match fetched {
            Ok(records) => Ok(self.claim_nodes(records).await),
            Err(source) => {
                // Stop every other branch before its next fetch
                self.abort.cancel();
                Err(Failure::Transport(Box::new(PartialBuild {
                    parent,
                    kind,
                    source,
                    resolved: Vec::new(),
                })))
            }
        }
    }

    async fn claim_request(&self, parent: ObjectId, kind: ObjectKind) -> bool {
        self.ledger.lock().await.requests.insert((parent, kind))
    }

    /// Keep only records not yet placed elsewhere in this build.
    async fn claim_nodes(&self, records: Vec<ObjectRecord>) -> Vec<ObjectRecord> {
        let mut ledger = self.ledger.lock().await;
        records
            .into_iter()
            .filter(|record| {
                let fresh = ledger.nodes.insert(record.key());
                if !fresh {
                    warn!(key = %record.key(), parent = ?record.parent_id, "dropping duplicate record");
                }
                fresh
            })
            .collect()
    }
}
