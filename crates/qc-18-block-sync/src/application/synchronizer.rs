//! # Block Synchronizer
//!
//! The single consumer of the job stream. Owns the pending/branch store, so
//! every admission decision is serialized without locking the store.
//!
//! ## Per job
//!
//! 1. Apply the job (admit a block, or mark transactions available)
//! 2. Drain: settle blocks the chain has passed, promote an anchored
//!    branch if the pending set went stale, execute the executable run,
//!    repeat while something changed
//! 3. Issue capped re-requests for missing transactions and, while
//!    catching up, for missing heights
//!
//! ## Outcome per block
//!
//! | Suggestion | Condition                         | Action                          |
//! |------------|-----------------------------------|---------------------------------|
//! | Apply      | executed                          | commit, height + 1              |
//! | Apply      | execution failed                  | leave pending, stop the run     |
//! | Abandon    | any                               | drop (height + 1 if the awaited |
//! |            |                                   | block was already executed      |
//! |            |                                   | during initial sync)            |
//! | Store      | `LowerHeight`                     | detach into branch tracking     |
//! | Store      | ahead of local, steady state      | request `local + 1`, stop       |
//! | Store      | otherwise                         | keep, stop                      |

use super::executor::BlockExecutor;
use super::requests::RequestTracker;
use super::status::SyncStatus;
use crate::algorithms::ValidationPipeline;
use crate::config::SyncConfig;
use crate::domain::{
    invariant_height_step, invariant_no_skip, AbandonReason, BlockCollection,
    BlockExecutionResult, BlockVerdict, ChainContext, ExecutionOutcome, Job, PendingBlock,
    StoreReason, SyncError, SyncEvent, SyncPhase, SyncSuggestion, ValidationResult,
};
use crate::ports::{ChainStore, NetworkGateway, TransactionPool};
use parking_lot::Mutex;
use shared_types::{short_hex, Block, Hash, PeerId, PublicKey};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Whether the current run may continue after a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Halt,
}

/// Collaborators the synchronizer drives.
pub struct SynchronizerParts {
    /// Validation filters.
    pub pipeline: ValidationPipeline,
    /// Block executor, shared with the service for cancellation.
    pub executor: Arc<BlockExecutor>,
    /// Committed chain.
    pub chain: Arc<dyn ChainStore>,
    /// Transaction pool.
    pub pool: Arc<dyn TransactionPool>,
    /// Network commands.
    pub network: Arc<dyn NetworkGateway>,
    /// Outstanding request slots.
    pub requests: Arc<Mutex<RequestTracker>>,
    /// Progress snapshot.
    pub status: Arc<SyncStatus>,
    /// Notification channel.
    pub events: broadcast::Sender<SyncEvent>,
}

/// Job-stream consumer.
pub struct BlockSynchronizer {
    config: SyncConfig,
    pipeline: ValidationPipeline,
    collection: BlockCollection,
    executor: Arc<BlockExecutor>,
    chain: Arc<dyn ChainStore>,
    pool: Arc<dyn TransactionPool>,
    network: Arc<dyn NetworkGateway>,
    requests: Arc<Mutex<RequestTracker>>,
    status: Arc<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
    node_key: Option<PublicKey>,
    phase: SyncPhase,
    local_height: u64,
    sync_peer: Option<PeerId>,
}

impl BlockSynchronizer {
    /// Create an idle synchronizer.
    pub fn new(config: SyncConfig, parts: SynchronizerParts) -> Self {
        Self {
            config,
            pipeline: parts.pipeline,
            collection: BlockCollection::new(),
            executor: parts.executor,
            chain: parts.chain,
            pool: parts.pool,
            network: parts.network,
            requests: parts.requests,
            status: parts.status,
            events: parts.events,
            node_key: None,
            phase: SyncPhase::Idle,
            local_height: 0,
            sync_peer: None,
        }
    }

    /// Key handed to validation filters.
    pub fn set_node_key(&mut self, key: PublicKey) {
        self.node_key = Some(key);
    }

    /// Read the local head and enter the first phase.
    pub async fn initialize(&mut self, initial_sync: bool) -> Result<(), SyncError> {
        if self.phase != SyncPhase::Idle {
            return Err(SyncError::AlreadyStarted);
        }
        let head = self.chain.head().await?;
        self.local_height = head.height;
        self.phase = if initial_sync {
            SyncPhase::InitialSyncPending
        } else {
            SyncPhase::SteadyState
        };
        info!(
            "[qc-18] Synchronizer starting at height {} ({:?})",
            self.local_height, self.phase
        );
        self.publish_status();
        Ok(())
    }

    /// Local execution height.
    pub fn local_height(&self) -> u64 {
        self.local_height
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The pending/branch store.
    pub fn collection(&self) -> &BlockCollection {
        &self.collection
    }

    /// Process one job to completion.
    pub async fn handle_job(&mut self, job: Job) -> Result<(), SyncError> {
        trace!("[qc-18] Handling {}", job);
        let result = match job {
            Job::BlockArrived { block, peer } => self.on_block_arrived(block, peer).await,
            Job::TransactionsArrived(hashes) => {
                self.on_transactions_arrived(&hashes);
                Ok(())
            }
        };

        if result.is_ok() {
            self.drain().await;
            self.request_missing();
        }
        self.publish_status();
        result
    }

    // -------------------------------------------------------------------------
    // Job handlers
    // -------------------------------------------------------------------------

    async fn on_block_arrived(&mut self, block: Block, peer: Option<PeerId>) -> Result<(), SyncError> {
        if self.phase == SyncPhase::InitialSyncPending {
            let target = block.height();
            self.phase = SyncPhase::InitialSyncInProgress { target };
            self.sync_peer = peer;
            info!(
                "[qc-18] Initial sync target fixed at height {} (local {})",
                target, self.local_height
            );
        }

        let hash = block.hash();
        if self.collection.contains(&hash) {
            trace!("[qc-18] Block {} already tracked", short_hex(&hash));
            return Ok(());
        }

        let missing = self.pool.missing_transactions_of(&block).await;
        if !missing.is_empty() {
            debug!(
                "[qc-18] Block #{} ({}) waits for {} transactions",
                block.height(),
                short_hex(&hash),
                missing.len()
            );
        }
        let outcome = self.collection.add_pending(PendingBlock::new(block, missing, peer));
        trace!("[qc-18] Block {} admitted: {:?}", short_hex(&hash), outcome);
        Ok(())
    }

    fn on_transactions_arrived(&mut self, hashes: &[Hash]) {
        self.requests.lock().release_transactions(hashes);
        let synced = self.collection.mark_transactions_arrived(hashes);
        for hash in synced {
            debug!("[qc-18] Block {} has all its transactions", short_hex(&hash));
        }
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Execute runs until nothing changes.
    async fn drain(&mut self) {
        let mut budget = self.collection.total_len() + 1;
        while budget > 0 {
            budget -= 1;
            self.settle_superseded().await;
            self.try_promote().await;

            let run = self
                .collection
                .executable_run(self.local_height, self.phase.is_initial_sync());
            if run.is_empty() {
                break;
            }

            let height_before = self.local_height;
            let pending_before = self.collection.pending_count();
            let step = self.execute_run(run).await;
            self.check_sync_finished();

            let progressed = self.local_height != height_before
                || self.collection.pending_count() != pending_before;
            if step == Step::Halt || !progressed {
                break;
            }
        }
        self.settle_superseded().await;
        self.check_sync_finished();
    }

    /// Move waiting primary blocks the chain has passed into branch
    /// tracking, and free request slots held for blocks at or below the
    /// local height.
    async fn settle_superseded(&mut self) {
        for pending in self.collection.take_superseded(self.local_height) {
            self.release_transaction_slots(&pending);
            let height = pending.height();
            let hash = pending.block_hash();
            let committed = matches!(
                self.chain.block_by_height(height).await,
                Ok(Some(block)) if block.hash() == hash
            );
            if committed {
                trace!(
                    "[qc-18] Dropping re-delivered block #{} ({})",
                    height,
                    short_hex(&hash)
                );
            } else {
                debug!(
                    "[qc-18] Block #{} ({}) superseded at its height, kept as branch",
                    height,
                    short_hex(&hash)
                );
                self.collection.merge_branches(pending);
            }
        }

        let withdrawn = self.collection.withdraw_settled_requests(self.local_height);
        if !withdrawn.is_empty() {
            trace!("[qc-18] Withdrawing {} settled transaction requests", withdrawn.len());
            self.requests.lock().release_transactions(&withdrawn);
        }
    }

    async fn execute_run(&mut self, run: Vec<PendingBlock>) -> Step {
        for pending in run {
            let context = match self.chain_context().await {
                Ok(context) => context,
                Err(e) => {
                    error!("[qc-18] Cannot read chain head: {}", e);
                    return Step::Halt;
                }
            };
            let verdict = self
                .pipeline
                .evaluate(pending.block(), &context, self.node_key.as_ref())
                .await;
            if self.handle_verdict(&pending, verdict).await == Step::Halt {
                return Step::Halt;
            }
        }
        Step::Continue
    }

    async fn handle_verdict(&mut self, pending: &PendingBlock, verdict: BlockVerdict) -> Step {
        let height = pending.height();
        let hash = pending.block_hash();
        let reason = verdict.reason().unwrap_or(ValidationResult::Success);

        match verdict.suggestion {
            SyncSuggestion::Apply if invariant_no_skip(height, self.local_height) => {
                let outcome = self.executor.apply(pending.block()).await;
                let result = BlockExecutionResult {
                    suggestion: verdict.suggestion,
                    outcome,
                };
                if result.is_success() {
                    self.commit(pending);
                    Step::Continue
                } else {
                    if let ExecutionOutcome::Failed(err) = &result.outcome {
                        warn!(
                            "[qc-18] Block #{} ({}) left pending: {}",
                            height,
                            short_hex(&hash),
                            err
                        );
                    }
                    Step::Halt
                }
            }
            SyncSuggestion::Apply => {
                warn!(
                    "[qc-18] Block #{} validated but local height is {}, holding",
                    height, self.local_height
                );
                self.handle_store(pending, reason)
            }
            SyncSuggestion::Abandon => {
                self.handle_abandon(pending, &verdict);
                Step::Continue
            }
            SyncSuggestion::Store => self.handle_store(pending, reason),
        }
    }

    fn handle_abandon(&mut self, pending: &PendingBlock, verdict: &BlockVerdict) {
        let height = pending.height();
        let hash = pending.block_hash();
        match verdict.reason() {
            Some(ValidationResult::Abandon(AbandonReason::FailedToValidate)) => error!(
                "[qc-18] Block #{} ({}) could not be validated, abandoning",
                height,
                short_hex(&hash)
            ),
            Some(reason) => debug!(
                "[qc-18] Abandoning block #{} ({}): {}",
                height,
                short_hex(&hash),
                reason
            ),
            None => {}
        }

        if let Some(dropped) = self.collection.take_pending(&hash) {
            self.release_transaction_slots(&dropped);
        }

        let already_executed =
            verdict.contains(ValidationResult::Abandon(AbandonReason::AlreadyExecuted));
        if self.phase.is_initial_sync()
            && already_executed
            && invariant_no_skip(height, self.local_height)
        {
            self.advance_height();
        }
    }

    fn handle_store(&mut self, pending: &PendingBlock, reason: ValidationResult) -> Step {
        let height = pending.height();
        let hash = pending.block_hash();

        if reason == ValidationResult::Store(StoreReason::LowerHeight) {
            debug!(
                "[qc-18] Block #{} ({}) lost to the committed chain, kept as branch",
                height,
                short_hex(&hash)
            );
            self.collection.remove_pending(&hash);
            return Step::Continue;
        }

        if height > self.local_height && !self.phase.is_initial_sync() {
            let gap = self.local_height + 1;
            if !self.collection.has_height(gap) {
                debug!(
                    "[qc-18] Gap before block #{}, requesting height {}",
                    height, gap
                );
                if let Err(e) = self.network.request_block_by_height(gap, pending.source_peer()) {
                    warn!("[qc-18] Block request for height {} failed: {}", gap, e);
                }
            }
        }
        Step::Halt
    }

    fn commit(&mut self, pending: &PendingBlock) {
        let hash = pending.block_hash();
        self.collection.take_pending(&hash);
        // announce before the height becomes visible to pollers
        let _ = self.events.send(SyncEvent::BlockCommitted {
            height: self.local_height + 1,
            hash,
        });
        self.advance_height();

        if self.local_height > self.config.branch_retention_depth {
            let floor = self.local_height - self.config.branch_retention_depth;
            let pruned = self.collection.prune_branches_below(floor);
            if !pruned.is_empty() {
                debug!("[qc-18] Pruned {} blocks below height {}", pruned.len(), floor);
            }
            for dropped in &pruned {
                self.release_transaction_slots(dropped);
            }
        }
    }

    fn advance_height(&mut self) {
        let before = self.local_height;
        self.local_height += 1;
        debug_assert!(invariant_height_step(before, self.local_height));
        self.requests.lock().release_heights_through(self.local_height);
        let height = self.local_height;
        self.status.update(|s| s.local_height = height);
    }

    async fn try_promote(&mut self) {
        let head = match self.chain.head().await {
            Ok(head) => head,
            Err(e) => {
                warn!("[qc-18] Cannot read chain head for promotion: {}", e);
                return;
            }
        };
        if head.height != self.local_height {
            return;
        }
        if let Some(promotion) = self.collection.promote_checkoutable(head.height, head.hash) {
            info!(
                "[qc-18] Switched to branch at height {} ({} blocks)",
                promotion.first_height, promotion.len
            );
            let _ = self.events.send(SyncEvent::BranchPromoted {
                first_height: promotion.first_height,
                len: promotion.len,
            });
        }
    }

    async fn chain_context(&self) -> Result<ChainContext, SyncError> {
        let head = self.chain.head().await?;
        Ok(ChainContext {
            chain_id: self.config.chain_id,
            head_hash: head.hash,
            head_height: head.height,
        })
    }

    fn check_sync_finished(&mut self) {
        if let SyncPhase::InitialSyncInProgress { target } = self.phase {
            if self.local_height >= target {
                self.phase = SyncPhase::SteadyState;
                info!(
                    "[qc-18] ✓ Initial sync finished at height {} (target {})",
                    self.local_height, target
                );
                let _ = self.events.send(SyncEvent::SyncFinished {
                    height: self.local_height,
                });
                self.publish_status();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Re-requests
    // -------------------------------------------------------------------------

    fn request_missing(&mut self) {
        for (peer, hashes) in self.collection.unrequested_transactions(self.local_height) {
            let claimed = self.requests.lock().claim_transactions(&hashes);
            if claimed.is_empty() {
                continue;
            }
            match self.network.request_transactions(&claimed, peer) {
                Ok(()) => self.collection.mark_transactions_requested(&claimed),
                Err(e) => {
                    warn!("[qc-18] Transaction request failed: {}", e);
                    self.requests.lock().release_transactions(&claimed);
                }
            }
        }

        let Some(target) = self.phase.target() else {
            return;
        };
        let collection = &self.collection;
        let claimed = self.requests.lock().claim_heights(
            self.local_height + 1,
            target.saturating_add(1),
            |height| collection.has_height(height),
        );
        for height in claimed {
            if let Err(e) = self.network.request_block_by_height(height, self.sync_peer) {
                warn!("[qc-18] Block request for height {} failed: {}", height, e);
                self.requests.lock().release_height(height);
            }
        }
    }

    fn release_transaction_slots(&self, block: &PendingBlock) {
        let in_flight: Vec<Hash> = block
            .missing_transactions()
            .into_iter()
            .filter(|m| m.in_flight)
            .map(|m| m.hash)
            .collect();
        if !in_flight.is_empty() {
            self.requests.lock().release_transactions(&in_flight);
        }
    }

    fn publish_status(&self) {
        self.status.update(|s| {
            s.local_height = self.local_height;
            s.pending_count = self.collection.pending_count();
            s.branch_count = self.collection.branch_count();
            s.phase = self.phase;
        });
    }
}
