//! # Block Executor
//!
//! Applies one contiguous block to chain state and checks the resulting
//! state root against the header.
//!
//! ## Steps
//!
//! 1. Resolve the declared transactions from the pool
//! 2. Derive the producer address, open a state delta
//! 3. Execute the batch (cancellable before it starts)
//! 4. Persist results (`Mined` / `Failed`) and transactions
//! 5. Remove transactions from the pool, refresh account sequencing
//! 6. Commit state and compare roots; append the block on match
//!
//! Every effect is written to an undo log as it happens. Any failure after
//! step 1 replays the log in reverse, so a failed block leaves no visible
//! trace: results removed, transactions back in the pool, sequencing
//! refreshed, state delta discarded.

use crate::domain::{
    CancellationFlag, ExecutionContext, ExecutionError, ExecutionOutcome, TransactionResult,
};
use crate::ports::{ChainStore, ExecutionService, TransactionPool, TransactionStore, WorldState};
use shared_types::{address_from_public_key, short_hex, Address, Block, ChainId, Hash, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Effects of a block application, in the order they happened.
#[derive(Default)]
struct UndoLog {
    state_opened: bool,
    results: Vec<Hash>,
    stored_transactions: Vec<Hash>,
    removed_from_pool: Vec<Transaction>,
    sequenced: Vec<Address>,
}

/// Applies blocks with all-or-nothing rollback.
pub struct BlockExecutor {
    chain_id: ChainId,
    chain: Arc<dyn ChainStore>,
    transactions: Arc<dyn TransactionStore>,
    pool: Arc<dyn TransactionPool>,
    execution: Arc<dyn ExecutionService>,
    world: Arc<dyn WorldState>,
    cancel: CancellationFlag,
    started: AtomicBool,
}

impl BlockExecutor {
    /// Executor over the given collaborators. Must be `start`ed before use.
    pub fn new(
        chain_id: ChainId,
        chain: Arc<dyn ChainStore>,
        transactions: Arc<dyn TransactionStore>,
        pool: Arc<dyn TransactionPool>,
        execution: Arc<dyn ExecutionService>,
        world: Arc<dyn WorldState>,
    ) -> Self {
        Self {
            chain_id,
            chain,
            transactions,
            pool,
            execution,
            world,
            cancel: CancellationFlag::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Arm the executor and clear any earlier cancellation.
    pub fn start(&self) {
        self.cancel.reset();
        self.started.store(true, Ordering::SeqCst);
    }

    /// Stop starting new blocks. A batch already running finishes and is
    /// rolled back.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Apply a block.
    pub async fn apply(&self, block: &Block) -> ExecutionOutcome {
        if !self.started.load(Ordering::SeqCst) {
            return ExecutionOutcome::Failed(ExecutionError::NotStarted);
        }
        if self.cancel.is_cancelled() {
            return ExecutionOutcome::Failed(ExecutionError::Cancelled);
        }

        let hash = block.hash();
        let mut undo = UndoLog::default();
        match self.try_apply(block, &mut undo).await {
            Ok(()) => {
                info!(
                    "[qc-18] ✓ Executed block #{} ({}) with {} txs",
                    block.height(),
                    short_hex(&hash),
                    block.body.transactions.len()
                );
                ExecutionOutcome::Success
            }
            Err(err) => {
                warn!(
                    "[qc-18] Block #{} ({}) failed, rolling back: {}",
                    block.height(),
                    short_hex(&hash),
                    err
                );
                self.roll_back(undo).await;
                ExecutionOutcome::Failed(err)
            }
        }
    }

    async fn try_apply(&self, block: &Block, undo: &mut UndoLog) -> Result<(), ExecutionError> {
        let mut txs = Vec::with_capacity(block.body.transactions.len());
        for hash in &block.body.transactions {
            let tx = self
                .pool
                .try_get(hash)
                .await
                .ok_or(ExecutionError::MissingTransaction(*hash))?;
            txs.push(tx);
        }

        let context = ExecutionContext {
            chain_id: self.chain_id,
            height: block.height().saturating_sub(1),
            producer: address_from_public_key(&block.header.producer),
        };
        self.world.begin_block(&context).await?;
        undo.state_opened = true;

        let traces = if txs.is_empty() {
            Vec::new()
        } else {
            self.execution
                .execute_batch(&txs, &context, &self.cancel)
                .await?
        };
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        if traces.len() != txs.len() {
            return Err(ExecutionError::Execution(format!(
                "expected {} traces, got {}",
                txs.len(),
                traces.len()
            )));
        }

        for trace in traces {
            let result = TransactionResult::from(trace);
            self.transactions.put_result(&result).await?;
            undo.results.push(result.tx_hash);
        }
        for tx in &txs {
            self.transactions.put_transaction(tx).await?;
            undo.stored_transactions.push(tx.hash());
        }

        let mut senders: Vec<Address> = Vec::new();
        for tx in &txs {
            if let Some(removed) = self.pool.remove(&tx.hash()).await {
                undo.removed_from_pool.push(removed);
            }
            if !senders.contains(&tx.sender()) {
                senders.push(tx.sender());
            }
        }
        undo.sequenced = senders;
        self.pool.update_account_sequencing(&undo.sequenced).await?;

        let root = self.world.commit().await?;
        if root != block.header.state_root {
            return Err(ExecutionError::StateRootMismatch {
                expected: block.header.state_root,
                actual: root,
            });
        }

        self.chain.append(block).await?;
        Ok(())
    }

    async fn roll_back(&self, undo: UndoLog) {
        for hash in &undo.results {
            if let Err(e) = self.transactions.remove_result(hash).await {
                error!("[qc-18] Rollback: failed to remove result {}: {}", short_hex(hash), e);
            }
        }
        for hash in &undo.stored_transactions {
            if let Err(e) = self.transactions.remove_transaction(hash).await {
                error!("[qc-18] Rollback: failed to remove tx {}: {}", short_hex(hash), e);
            }
        }
        if !undo.removed_from_pool.is_empty() {
            let count = undo.removed_from_pool.len();
            if let Err(e) = self.pool.roll_back(undo.removed_from_pool).await {
                error!("[qc-18] Rollback: pool refused {} txs: {}", count, e);
            }
        }
        if !undo.sequenced.is_empty() {
            if let Err(e) = self.pool.update_account_sequencing(&undo.sequenced).await {
                error!("[qc-18] Rollback: sequencing refresh failed: {}", e);
            }
        }
        if undo.state_opened {
            if let Err(e) = self.world.rollback_to_previous_block().await {
                error!("[qc-18] Rollback: state rollback failed: {}", e);
            }
        }
        debug!("[qc-18] Rollback complete");
    }
}
