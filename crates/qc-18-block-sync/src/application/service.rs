//! # Block Sync Service
//!
//! Public face of the subsystem. Producers (network handlers, the local
//! producer) enqueue jobs without blocking; one spawned worker drains the
//! queue through [`BlockSynchronizer`].

use super::executor::BlockExecutor;
use super::requests::RequestTracker;
use super::status::SyncStatus;
use super::synchronizer::{BlockSynchronizer, SynchronizerParts};
use crate::algorithms::ValidationPipeline;
use crate::config::SyncConfig;
use crate::domain::{invariant_block_structure, Job, SyncError, SyncEvent, SyncPhase};
use crate::ports::{
    BlockSyncApi, ChainStore, ExecutionService, NetworkGateway, TransactionPool,
    TransactionStore, WorldState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{short_hex, Block, Hash, PeerId, PublicKey, Transaction};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the notification channel. Slow subscribers lag, the worker
/// never waits on them.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Outbound collaborators of the service.
#[derive(Clone)]
pub struct SyncDependencies {
    /// Committed chain.
    pub chain: Arc<dyn ChainStore>,
    /// Transaction and result persistence.
    pub transactions: Arc<dyn TransactionStore>,
    /// Transaction pool.
    pub pool: Arc<dyn TransactionPool>,
    /// Transaction execution.
    pub execution: Arc<dyn ExecutionService>,
    /// World state.
    pub world: Arc<dyn WorldState>,
    /// Peer requests.
    pub network: Arc<dyn NetworkGateway>,
}

/// Block admission and sync service.
pub struct BlockSyncService {
    jobs: mpsc::UnboundedSender<Job>,
    pending_worker: Mutex<Option<(BlockSynchronizer, mpsc::UnboundedReceiver<Job>)>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    executor: Arc<BlockExecutor>,
    pool: Arc<dyn TransactionPool>,
    requests: Arc<Mutex<RequestTracker>>,
    status: Arc<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
}

impl BlockSyncService {
    /// Build the service. Nothing runs until [`BlockSyncApi::start`].
    pub fn new(config: SyncConfig, deps: SyncDependencies) -> Result<Self, SyncError> {
        config.validate()?;
        info!("[qc-18] Initializing Block Sync Service");
        info!("  Max block requests: {}", config.max_block_requests);
        info!("  Max transaction requests: {}", config.max_transaction_requests);
        info!("  Out-of-date window: {}", config.out_of_date_window);

        let executor = Arc::new(BlockExecutor::new(
            config.chain_id,
            deps.chain.clone(),
            deps.transactions,
            deps.pool.clone(),
            deps.execution,
            deps.world,
        ));
        let requests = Arc::new(Mutex::new(RequestTracker::new(
            config.max_block_requests,
            config.max_transaction_requests,
        )));
        let status = Arc::new(SyncStatus::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (jobs, receiver) = mpsc::unbounded_channel();

        let synchronizer = BlockSynchronizer::new(
            config.clone(),
            SynchronizerParts {
                pipeline: ValidationPipeline::standard(deps.chain.clone(), config.out_of_date_window),
                executor: executor.clone(),
                chain: deps.chain,
                pool: deps.pool.clone(),
                network: deps.network,
                requests: requests.clone(),
                status: status.clone(),
                events: events.clone(),
            },
        );

        Ok(Self {
            jobs,
            pending_worker: Mutex::new(Some((synchronizer, receiver))),
            worker: Mutex::new(None),
            executor,
            pool: deps.pool,
            requests,
            status,
            events,
        })
    }

    /// Hand the node's own key to the validation filters. Only effective
    /// before `start`.
    pub fn with_node_key(self, key: PublicKey) -> Self {
        if let Some((synchronizer, _)) = self.pending_worker.lock().as_mut() {
            synchronizer.set_node_key(key);
        }
        self
    }

    /// Outstanding `(block, transaction)` request slots.
    pub fn outstanding_requests(&self) -> (usize, usize) {
        let requests = self.requests.lock();
        (requests.outstanding_blocks(), requests.outstanding_transactions())
    }

    /// Number of tracked branches.
    pub fn branch_count(&self) -> usize {
        self.status.snapshot().branch_count
    }

    /// Cancel execution and stop the worker. Queued jobs are dropped.
    pub fn shutdown(&self) {
        self.executor.cancel();
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            info!("[qc-18] Block Sync worker stopped");
        }
    }

    fn submit(&self, job: Job) -> Result<(), SyncError> {
        self.jobs.send(job).map_err(|_| SyncError::QueueClosed)
    }
}

#[async_trait]
impl BlockSyncApi for BlockSyncService {
    async fn start(&self, initial_sync: bool) -> Result<(), SyncError> {
        let taken = self.pending_worker.lock().take();
        let (mut synchronizer, receiver) = taken.ok_or(SyncError::AlreadyStarted)?;

        self.executor.start();
        synchronizer.initialize(initial_sync).await?;

        let handle = tokio::spawn(run_worker(synchronizer, receiver));
        *self.worker.lock() = Some(handle);
        info!("[qc-18] ✓ Block Sync worker started (initial sync: {})", initial_sync);
        Ok(())
    }

    fn enqueue_block(&self, block: Block, peer: Option<PeerId>) -> Result<(), SyncError> {
        if let Err(e) = invariant_block_structure(&block) {
            warn!(
                "[qc-18] Rejecting block {} at height {}: {}",
                short_hex(&block.hash()),
                block.height(),
                e
            );
            return Err(e);
        }
        self.submit(Job::BlockArrived { block, peer })
    }

    fn enqueue_transactions(&self, hashes: Vec<Hash>) -> Result<(), SyncError> {
        if hashes.is_empty() {
            return Ok(());
        }
        self.submit(Job::TransactionsArrived(hashes))
    }

    async fn on_transactions_received(
        &self,
        transactions: Vec<Transaction>,
        peer: Option<PeerId>,
    ) -> Result<usize, SyncError> {
        let mut accepted = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let hash = tx.hash();
            let insertion = self.pool.add(tx).await;
            if insertion.is_accepted() {
                accepted.push(hash);
            } else {
                debug!(
                    "[qc-18] Pool refused {} from {:?}: {:?}",
                    short_hex(&hash),
                    peer,
                    insertion
                );
            }
        }
        let count = accepted.len();
        self.enqueue_transactions(accepted)?;
        Ok(count)
    }

    fn cancel(&self) {
        info!("[qc-18] Cancelling block execution");
        self.executor.cancel();
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn pending_count(&self) -> usize {
        self.status.snapshot().pending_count
    }

    fn local_height(&self) -> u64 {
        self.status.snapshot().local_height
    }

    fn phase(&self) -> SyncPhase {
        self.status.snapshot().phase
    }
}

impl Drop for BlockSyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

/// Drain the job queue until every sender is gone.
///
/// A failing job is logged and skipped; the worker only stops when the
/// queue closes.
pub async fn run_worker(
    mut synchronizer: BlockSynchronizer,
    mut receiver: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = receiver.recv().await {
        if let Err(e) = synchronizer.handle_job(job).await {
            error!("[qc-18] Job failed: {}", e);
        }
    }
    debug!("[qc-18] Job queue closed, worker exiting");
}
