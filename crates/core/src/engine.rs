//! The background grouping engine.
//!
//! One engine instance owns a pending queue, a single worker task, and a
//! delivery task. Callers enqueue work with [`add`](ChangeSetEngine::add)
//! and never block; the worker drains the whole queue per wake-up so bursts
//! of additions coalesce into one fetch pass. Results are applied to the
//! [`ChangeSetRegistry`] only on the delivery task, serializing against
//! consumer reads, and only if no reset intervened since the batch was
//! enqueued (tracked with a generation counter).
//!
//! Cancellation is cooperative: a token threaded through the fetch phase is
//! checked between per-root fetch calls and before grouping. A cancelled
//! batch discards its staged fetch results and publishes nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::LogEntryCache;
use crate::classify::is_remote_change;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::grouper::{ChangeSetGrouper, ChangeSetOp};
use crate::history::{HistoryProvider, LogFetcher};
use crate::models::ComparisonResult;
use crate::partition::{partition, ComparisonRoot};
use crate::registry::ChangeSetRegistry;
use crate::workspace::{local_batch_tag, Tag, WorkspaceMetadata};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Externally observable engine states.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Queued,
    Running,
    Publishing,
    Disposed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Publishing => write!(f, "publishing"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison scope
// ---------------------------------------------------------------------------

/// What the workspace is being compared against.
#[derive(Debug, Clone)]
pub enum CompareScope {
    /// Live incremental comparison against the current remote state.
    Workspace,
    /// Comparison against explicit tags. With a single `tag` one combined
    /// fetch covers the batch; without one, history is fetched per
    /// comparison root using each root's own tag.
    Tag {
        tag: Option<Tag>,
        roots: Vec<ComparisonRoot>,
    },
}

impl CompareScope {
    fn is_tag_comparison(&self) -> bool {
        matches!(self, Self::Tag { .. })
    }
}

// ---------------------------------------------------------------------------
// Internal plumbing
// ---------------------------------------------------------------------------

/// Sentinel published on the idle watch when the worker has exited.
const WORKER_EXITED: u64 = u64::MAX;

enum Publication {
    Ops {
        generation: u64,
        ops: Vec<ChangeSetOp>,
    },
    Clear {
        generation: u64,
    },
    Flush(oneshot::Sender<()>),
}

struct EngineShared {
    queue: Mutex<Vec<ComparisonResult>>,
    /// Bumped by reset and dispose; results stamped with an older value
    /// are never applied.
    generation: AtomicU64,
    shutdown: AtomicBool,
    wake: Notify,
    /// Token for the batch currently in flight.
    cancel: Mutex<CancellationToken>,
    state_tx: watch::Sender<EngineState>,
    /// `None` while work is pending or in flight, `Some(g)` once the worker
    /// has drained everything it saw at generation `g`.
    idle_tx: watch::Sender<Option<u64>>,
}

struct WorkerContext {
    shared: Arc<EngineShared>,
    cache: Arc<RwLock<LogEntryCache>>,
    metadata: Arc<dyn WorkspaceMetadata>,
    fetcher: LogFetcher,
    scope: CompareScope,
    config: EngineConfig,
    tx: mpsc::Sender<Publication>,
}

struct EngineTasks {
    worker: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Asynchronous engine grouping remote changes into comment-keyed sets.
pub struct ChangeSetEngine {
    shared: Arc<EngineShared>,
    registry: Arc<ChangeSetRegistry>,
    cache: Arc<RwLock<LogEntryCache>>,
    publish_tx: Mutex<Option<mpsc::Sender<Publication>>>,
    tasks: Mutex<Option<EngineTasks>>,
    state_rx: watch::Receiver<EngineState>,
    idle_rx: watch::Receiver<Option<u64>>,
}

impl ChangeSetEngine {
    /// Create an engine and start its worker and delivery tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        provider: Arc<dyn HistoryProvider>,
        metadata: Arc<dyn WorkspaceMetadata>,
        scope: CompareScope,
        config: EngineConfig,
    ) -> Self {
        info!(tag_comparison = scope.is_tag_comparison(), "initializing change-set engine");

        let (state_tx, state_rx) = watch::channel(EngineState::Idle);
        let (idle_tx, idle_rx) = watch::channel(Some(0u64));
        let (publish_tx, publish_rx) = mpsc::channel(config.delivery_buffer);

        let shared = Arc::new(EngineShared {
            queue: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
            cancel: Mutex::new(CancellationToken::new()),
            state_tx,
            idle_tx,
        });
        let registry = Arc::new(ChangeSetRegistry::new());
        let cache = Arc::new(RwLock::new(LogEntryCache::new()));

        let ctx = WorkerContext {
            shared: shared.clone(),
            cache: cache.clone(),
            metadata,
            fetcher: LogFetcher::new(provider),
            scope,
            config,
            tx: publish_tx.clone(),
        };
        let worker = tokio::spawn(worker_loop(ctx));
        let delivery = tokio::spawn(delivery_loop(
            publish_rx,
            registry.clone(),
            shared.clone(),
        ));

        Self {
            shared,
            registry,
            cache,
            publish_tx: Mutex::new(Some(publish_tx)),
            tasks: Mutex::new(Some(EngineTasks { worker, delivery })),
            state_rx,
            idle_rx,
        }
    }

    /// The registry this engine publishes into.
    pub fn registry(&self) -> Arc<ChangeSetRegistry> {
        self.registry.clone()
    }

    /// The shared log-entry cache. Reads are safe at any time; only the
    /// worker writes.
    pub fn cache(&self) -> Arc<RwLock<LogEntryCache>> {
        self.cache.clone()
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        self.state_rx.borrow().clone()
    }

    /// Watch engine state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    // -----------------------------------------------------------------------
    // Work intake
    // -----------------------------------------------------------------------

    /// Append a batch to the pending queue and schedule the worker.
    ///
    /// Never blocks. Batches added in a burst are coalesced into one fetch
    /// pass.
    pub fn add(&self, batch: Vec<ComparisonResult>) {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            warn!("add ignored: engine disposed");
            return;
        }
        if batch.is_empty() {
            return;
        }
        let pending = {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.extend(batch);
            queue.len()
        };
        debug!(pending, "queued comparison results");
        self.shared.idle_tx.send_replace(None);
        if *self.state_rx.borrow() == EngineState::Idle {
            self.shared.state_tx.send_replace(EngineState::Queued);
        }
        self.shared.wake.notify_one();
    }

    /// Cancel in-flight work, wait for the cancellation to take effect,
    /// drop everything pending, clear published sets, and start over from
    /// `seed`.
    ///
    /// Guarantees that nothing enqueued before the reset is ever published
    /// after it.
    pub async fn reset(&self, seed: Vec<ComparisonResult>) {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            warn!("reset ignored: engine disposed");
            return;
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.cancel.lock().unwrap().cancel();
        self.shared.queue.lock().unwrap().clear();
        self.shared.wake.notify_one();

        // Wait until the worker has acknowledged the cancellation and
        // drained the (now empty) queue at the new generation.
        let mut idle = self.idle_rx.clone();
        let _ = idle
            .wait_for(|drained| matches!(drained, Some(g) if *g >= generation))
            .await;
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let tx = self.publish_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(Publication::Clear { generation }).await;
        }
        info!(seed = seed.len(), generation, "engine reset");
        self.add(seed);
    }

    /// Wait until all currently queued work has been processed and its
    /// results delivered.
    pub async fn quiesce(&self) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let mut idle = self.idle_rx.clone();
        let _ = idle
            .wait_for(|drained| matches!(drained, Some(g) if *g >= generation))
            .await;

        let tx = self.publish_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Publication::Flush(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    /// Shut the engine down: cancel outstanding work, stop both tasks, and
    /// clear the cache. Safe to call more than once.
    pub async fn dispose(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            debug!("dispose: already disposed");
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.cancel.lock().unwrap().cancel();
        self.shared.queue.lock().unwrap().clear();
        self.shared.wake.notify_one();

        // Dropping the engine's sender lets the delivery task end once the
        // worker (holding the only other sender) has exited.
        drop(self.publish_tx.lock().unwrap().take());

        let tasks = self.tasks.lock().unwrap().take();
        if let Some(tasks) = tasks {
            let _ = tasks.worker.await;
            let _ = tasks.delivery.await;
        }

        self.cache.write().unwrap().clear();
        self.shared.state_tx.send_replace(EngineState::Disposed);
        info!("engine disposed");
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

async fn worker_loop(ctx: WorkerContext) {
    loop {
        if ctx.shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        // Snapshot the generation before draining so a reset that slips in
        // behind the drain is always detected.
        let generation = ctx.shared.generation.load(Ordering::SeqCst);
        let batch: Vec<ComparisonResult> = {
            let mut queue = ctx.shared.queue.lock().unwrap();
            std::mem::take(&mut *queue)
        };

        if batch.is_empty() {
            ctx.shared.state_tx.send_replace(EngineState::Idle);
            ctx.shared
                .idle_tx
                .send_replace(Some(ctx.shared.generation.load(Ordering::SeqCst)));
            ctx.shared.wake.notified().await;
            continue;
        }

        // A fresh token for this batch; reset and dispose cancel it.
        let token = {
            let mut guard = ctx.shared.cancel.lock().unwrap();
            *guard = CancellationToken::new();
            guard.clone()
        };
        if ctx.shared.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "batch superseded before processing, dropping");
            continue;
        }
        ctx.shared.state_tx.send_replace(EngineState::Running);
        debug!(batch = batch.len(), generation, "processing batch");

        match process_batch(&ctx, &batch, &token).await {
            Ok(ops) => {
                let stale = token.is_cancelled()
                    || ctx.shared.generation.load(Ordering::SeqCst) != generation;
                if stale {
                    debug!(generation, "discarding results from superseded batch");
                } else {
                    ctx.shared.state_tx.send_replace(EngineState::Publishing);
                    if ctx
                        .tx
                        .send(Publication::Ops { generation, ops })
                        .await
                        .is_err()
                    {
                        debug!("delivery channel closed, dropping batch results");
                    }
                }
            }
            // Cancellation is not an error; the batch simply vanishes.
            Err(EngineError::Cancelled) => debug!(generation, "batch cancelled"),
            Err(error) => {
                // Previously applied batches stay valid; a later add or
                // reset naturally retries.
                error!(%error, generation, "batch failed, dropping");
            }
        }
    }
    ctx.shared.idle_tx.send_replace(Some(WORKER_EXITED));
    debug!("worker loop ended");
}

/// Run one batch through classify, fetch, and group.
async fn process_batch(
    ctx: &WorkerContext,
    batch: &[ComparisonResult],
    token: &CancellationToken,
) -> Result<Vec<ChangeSetOp>, EngineError> {
    let metadata = ctx.metadata.as_ref();

    let eligible: Vec<ComparisonResult> = batch
        .iter()
        .filter(|result| is_remote_change(result, metadata))
        .cloned()
        .collect();
    debug!(
        batch = batch.len(),
        eligible = eligible.len(),
        "classified batch"
    );
    if eligible.is_empty() {
        return Ok(Vec::new());
    }
    let refs: Vec<&ComparisonResult> = eligible.iter().collect();

    // Fetch into a staging cache so a cancelled batch leaves no trace in
    // the visible one.
    let mut staging = LogEntryCache::new();
    match &ctx.scope {
        CompareScope::Workspace => {
            ctx.fetcher
                .fetch(&refs, None, None, &mut staging, metadata, token)
                .await?;
        }
        CompareScope::Tag {
            tag: Some(tag), ..
        } => {
            let local = local_batch_tag(&refs, metadata);
            ctx.fetcher
                .fetch(&refs, Some(&local), Some(tag), &mut staging, metadata, token)
                .await?;
        }
        CompareScope::Tag { tag: None, roots } => {
            for (root, group) in partition(&refs, roots) {
                if token.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let local = local_batch_tag(&group, metadata);
                ctx.fetcher
                    .fetch(
                        &group,
                        Some(&local),
                        root.tag.as_ref(),
                        &mut staging,
                        metadata,
                        token,
                    )
                    .await?;
            }
        }
    }

    if token.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    ctx.cache.write().unwrap().merge(staging);

    let cache = ctx.cache.read().unwrap();
    let grouper = ChangeSetGrouper::new(
        &cache,
        metadata,
        &ctx.config,
        ctx.scope.is_tag_comparison(),
    );
    Ok(grouper.group(&eligible))
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Apply publications to the registry on a single consumer context.
async fn delivery_loop(
    mut rx: mpsc::Receiver<Publication>,
    registry: Arc<ChangeSetRegistry>,
    shared: Arc<EngineShared>,
) {
    while let Some(publication) = rx.recv().await {
        match publication {
            Publication::Ops { generation, ops } => {
                if generation != shared.generation.load(Ordering::SeqCst) {
                    debug!(generation, "dropping stale publication");
                    continue;
                }
                if !ops.is_empty() {
                    registry.apply(ops);
                }
            }
            Publication::Clear { generation } => {
                if generation != shared.generation.load(Ordering::SeqCst) {
                    continue;
                }
                registry.remove_all();
            }
            Publication::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("delivery loop ended");
}
