//! # In-Memory Adapters
//!
//! Process-local implementations of the outbound ports. Used by the node
//! runtime and by tests.

use crate::domain::{
    CancellationFlag, ExecutionContext, ExecutionError, SyncError, TransactionResult,
    TransactionTrace,
};
use crate::ports::{
    ChainHead, ChainStore, ExecutionService, PoolInsertion, TransactionPool, TransactionStore,
    WorldState,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use shared_types::{Address, Block, Hash, StorageError, Transaction, GENESIS_PARENT_HASH};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// CHAIN STORE
// =============================================================================

#[derive(Default)]
struct ChainInner {
    by_height: BTreeMap<u64, Block>,
    heights: HashMap<Hash, u64>,
}

/// Committed chain held in memory. Height 0 is the empty chain.
#[derive(Default)]
pub struct InMemoryChainStore {
    inner: RwLock<ChainInner>,
}

impl InMemoryChainStore {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed blocks.
    pub fn len(&self) -> usize {
        self.inner.read().by_height.len()
    }

    /// Whether nothing is committed.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_height.is_empty()
    }
}

#[async_trait]
impl ChainStore for InMemoryChainStore {
    async fn head(&self) -> Result<ChainHead, StorageError> {
        let inner = self.inner.read();
        Ok(match inner.by_height.iter().next_back() {
            Some((height, block)) => ChainHead {
                hash: block.hash(),
                height: *height,
            },
            None => ChainHead {
                hash: GENESIS_PARENT_HASH,
                height: 0,
            },
        })
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        Ok(self.inner.read().by_height.get(&height).cloned())
    }

    async fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .heights
            .get(hash)
            .and_then(|h| inner.by_height.get(h))
            .cloned())
    }

    async fn append(&self, block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let (head_hash, head_height) = match inner.by_height.iter().next_back() {
            Some((height, b)) => (b.hash(), *height),
            None => (GENESIS_PARENT_HASH, 0),
        };
        if block.height() != head_height + 1 || block.previous_hash() != head_hash {
            return Err(StorageError::ParentNotFound {
                height: block.height(),
            });
        }
        inner.heights.insert(block.hash(), block.height());
        inner.by_height.insert(block.height(), block.clone());
        Ok(())
    }
}

// =============================================================================
// TRANSACTION STORE
// =============================================================================

/// Persisted transactions and results held in memory.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    transactions: RwLock<HashMap<Hash, Transaction>>,
    results: RwLock<HashMap<Hash, TransactionResult>>,
}

impl InMemoryTransactionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted results.
    pub fn result_count(&self) -> usize {
        self.results.read().len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn put_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
        self.transactions.write().insert(tx.hash(), tx.clone());
        Ok(())
    }

    async fn remove_transaction(&self, hash: &Hash) -> Result<(), StorageError> {
        self.transactions.write().remove(hash);
        Ok(())
    }

    async fn transaction(&self, hash: &Hash) -> Result<Option<Transaction>, StorageError> {
        Ok(self.transactions.read().get(hash).cloned())
    }

    async fn put_result(&self, result: &TransactionResult) -> Result<(), StorageError> {
        self.results.write().insert(result.tx_hash, result.clone());
        Ok(())
    }

    async fn remove_result(&self, hash: &Hash) -> Result<(), StorageError> {
        self.results.write().remove(hash);
        Ok(())
    }

    async fn result(&self, hash: &Hash) -> Result<Option<TransactionResult>, StorageError> {
        Ok(self.results.read().get(hash).cloned())
    }
}

// =============================================================================
// TRANSACTION POOL
// =============================================================================

/// Transaction pool held in memory.
///
/// Per-account sequencing is the number of pooled transactions each sender
/// has, refreshed on demand.
pub struct InMemoryTransactionPool {
    transactions: RwLock<HashMap<Hash, Transaction>>,
    sequencing: RwLock<HashMap<Address, u64>>,
    capacity: usize,
}

impl Default for InMemoryTransactionPool {
    fn default() -> Self {
        Self::with_capacity(10_000)
    }
}

impl InMemoryTransactionPool {
    /// Pool with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool refusing transactions beyond `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            sequencing: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Whether the pool holds `hash`.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.transactions.read().contains_key(hash)
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }

    /// Last refreshed sequencing value for an account.
    pub fn account_sequence(&self, address: &Address) -> Option<u64> {
        self.sequencing.read().get(address).copied()
    }
}

#[async_trait]
impl TransactionPool for InMemoryTransactionPool {
    async fn try_get(&self, hash: &Hash) -> Option<Transaction> {
        self.transactions.read().get(hash).cloned()
    }

    async fn add(&self, tx: Transaction) -> PoolInsertion {
        let hash = tx.hash();
        let mut pool = self.transactions.write();
        if pool.contains_key(&hash) {
            return PoolInsertion::AlreadyKnown;
        }
        if pool.len() >= self.capacity {
            return PoolInsertion::Rejected("pool full".to_string());
        }
        pool.insert(hash, tx);
        PoolInsertion::Added
    }

    async fn remove(&self, hash: &Hash) -> Option<Transaction> {
        self.transactions.write().remove(hash)
    }

    async fn missing_transactions_of(&self, block: &Block) -> Vec<Hash> {
        let pool = self.transactions.read();
        block
            .body
            .transactions
            .iter()
            .filter(|hash| !pool.contains_key(*hash))
            .copied()
            .collect()
    }

    async fn update_account_sequencing(&self, addresses: &[Address]) -> Result<(), SyncError> {
        let pool = self.transactions.read();
        let mut sequencing = self.sequencing.write();
        for address in addresses {
            let pending = pool.values().filter(|tx| tx.sender() == *address).count() as u64;
            sequencing.insert(*address, pending);
        }
        Ok(())
    }

    async fn roll_back(&self, transactions: Vec<Transaction>) -> Result<(), SyncError> {
        let mut pool = self.transactions.write();
        for tx in transactions {
            pool.insert(tx.hash(), tx);
        }
        Ok(())
    }
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Deterministic post-state root of a block: SHA-256 over the height and
/// the hashes of the executed transactions, in order.
pub fn state_root_for(height: u64, tx_hashes: &[Hash]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(height.to_le_bytes());
    for hash in tx_hashes {
        hasher.update(hash);
    }
    hasher.finalize().into()
}

#[derive(Default)]
struct WorldInner {
    committed: Vec<(u64, Hash)>,
    open: Option<(u64, Vec<Hash>)>,
}

/// World state with one open delta at a time and a stack of committed roots.
#[derive(Default)]
pub struct InMemoryWorldState {
    inner: RwLock<WorldInner>,
}

impl InMemoryWorldState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed transaction in the open delta.
    pub fn stage(&self, tx_hash: Hash) -> Result<(), ExecutionError> {
        match self.inner.write().open.as_mut() {
            Some((_, staged)) => {
                staged.push(tx_hash);
                Ok(())
            }
            None => Err(ExecutionError::Execution("no open block".to_string())),
        }
    }

    /// Height and root of the last committed block.
    pub fn latest(&self) -> Option<(u64, Hash)> {
        self.inner.read().committed.last().copied()
    }

    /// Whether a delta is open.
    pub fn has_open_block(&self) -> bool {
        self.inner.read().open.is_some()
    }
}

#[async_trait]
impl WorldState for InMemoryWorldState {
    async fn begin_block(&self, context: &ExecutionContext) -> Result<(), ExecutionError> {
        let mut inner = self.inner.write();
        if inner.open.is_some() {
            return Err(ExecutionError::Execution("block already open".to_string()));
        }
        inner.open = Some((context.height + 1, Vec::new()));
        Ok(())
    }

    async fn commit(&self) -> Result<Hash, ExecutionError> {
        let mut inner = self.inner.write();
        let (height, staged) = inner
            .open
            .take()
            .ok_or_else(|| ExecutionError::Execution("no open block".to_string()))?;
        let root = state_root_for(height, &staged);
        inner.committed.push((height, root));
        Ok(root)
    }

    async fn rollback_to_previous_block(&self) -> Result<(), ExecutionError> {
        let mut inner = self.inner.write();
        if inner.open.take().is_none() {
            inner.committed.pop();
        }
        Ok(())
    }
}

// =============================================================================
// EXECUTION SERVICE
// =============================================================================

/// Execution service that stages every transaction into an
/// [`InMemoryWorldState`] and fails the ones it is told to.
pub struct InMemoryExecutionService {
    world: Arc<InMemoryWorldState>,
    failing: RwLock<HashSet<Hash>>,
    fail_batch: AtomicBool,
}

impl InMemoryExecutionService {
    /// Service writing into `world`.
    pub fn new(world: Arc<InMemoryWorldState>) -> Self {
        Self {
            world,
            failing: RwLock::new(HashSet::new()),
            fail_batch: AtomicBool::new(false),
        }
    }

    /// Make a transaction produce a failed trace.
    pub fn fail_transaction(&self, hash: Hash) {
        self.failing.write().insert(hash);
    }

    /// Make every batch return an error.
    pub fn set_batch_failure(&self, fail: bool) {
        self.fail_batch.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionService for InMemoryExecutionService {
    async fn execute_batch(
        &self,
        transactions: &[Transaction],
        _context: &ExecutionContext,
        _cancel: &CancellationFlag,
    ) -> Result<Vec<TransactionTrace>, ExecutionError> {
        if self.fail_batch.load(Ordering::SeqCst) {
            return Err(ExecutionError::Execution("batch aborted".to_string()));
        }

        let failing = self.failing.read().clone();
        let mut traces = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let hash = tx.hash();
            self.world.stage(hash)?;
            if failing.contains(&hash) {
                traces.push(TransactionTrace::failure(hash, "execution reverted"));
            } else {
                traces.push(TransactionTrace::success(hash, tx.nonce.to_le_bytes().to_vec()));
            }
        }
        Ok(traces)
    }
}
