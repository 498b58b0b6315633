//! # Outbound Ports
//!
//! Traits for external collaborators: chain store, transaction store,
//! transaction pool, execution service, world state and network.

use crate::domain::{
    CancellationFlag, ExecutionContext, ExecutionError, SyncError, TransactionResult,
    TransactionTrace,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Block, Hash, PeerId, StorageError, Transaction};

/// Current canonical head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Head block hash (genesis parent hash on an empty chain).
    pub hash: Hash,
    /// Head height (0 on an empty chain).
    pub height: u64,
}

/// Committed chain storage - outbound port.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Current head.
    async fn head(&self) -> Result<ChainHead, StorageError>;

    /// Committed block at a height.
    async fn block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// Committed block by hash.
    async fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError>;

    /// Append a block on top of the head and make it the new head.
    async fn append(&self, block: &Block) -> Result<(), StorageError>;
}

/// Transaction and result persistence - outbound port.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a transaction.
    async fn put_transaction(&self, tx: &Transaction) -> Result<(), StorageError>;

    /// Remove a persisted transaction.
    async fn remove_transaction(&self, hash: &Hash) -> Result<(), StorageError>;

    /// Persisted transaction by hash.
    async fn transaction(&self, hash: &Hash) -> Result<Option<Transaction>, StorageError>;

    /// Persist a transaction result.
    async fn put_result(&self, result: &TransactionResult) -> Result<(), StorageError>;

    /// Remove a persisted result.
    async fn remove_result(&self, hash: &Hash) -> Result<(), StorageError>;

    /// Persisted result by transaction hash.
    async fn result(&self, hash: &Hash) -> Result<Option<TransactionResult>, StorageError>;
}

/// Outcome of offering a transaction to the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolInsertion {
    /// New transaction accepted.
    Added,
    /// Already held.
    AlreadyKnown,
    /// Refused, with a reason.
    Rejected(String),
}

impl PoolInsertion {
    /// Whether the transaction is now held by the pool.
    pub fn is_accepted(&self) -> bool {
        matches!(self, PoolInsertion::Added | PoolInsertion::AlreadyKnown)
    }
}

/// Transaction pool - outbound port.
#[async_trait]
pub trait TransactionPool: Send + Sync {
    /// Transaction by hash, if held.
    async fn try_get(&self, hash: &Hash) -> Option<Transaction>;

    /// Offer a transaction.
    async fn add(&self, tx: Transaction) -> PoolInsertion;

    /// Remove a transaction, returning it if it was held.
    async fn remove(&self, hash: &Hash) -> Option<Transaction>;

    /// Declared transactions of `block` the pool does not hold.
    async fn missing_transactions_of(&self, block: &Block) -> Vec<Hash>;

    /// Refresh per-account sequencing for the given senders.
    async fn update_account_sequencing(&self, addresses: &[Address]) -> Result<(), SyncError>;

    /// Re-admit transactions of a rolled-back block.
    async fn roll_back(&self, transactions: Vec<Transaction>) -> Result<(), SyncError>;
}

/// Contract execution engine - outbound port.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Execute a batch as one unit. Checks `cancel` cooperatively.
    async fn execute_batch(
        &self,
        transactions: &[Transaction],
        context: &ExecutionContext,
        cancel: &CancellationFlag,
    ) -> Result<Vec<TransactionTrace>, ExecutionError>;
}

/// Uncommitted state delta of the block being applied - outbound port.
#[async_trait]
pub trait WorldState: Send + Sync {
    /// Open a delta for the block after `context.height`.
    async fn begin_block(&self, context: &ExecutionContext) -> Result<(), ExecutionError>;

    /// Commit the open delta and return the post-state root.
    async fn commit(&self) -> Result<Hash, ExecutionError>;

    /// Discard the last block's delta, committed or not.
    async fn rollback_to_previous_block(&self) -> Result<(), ExecutionError>;
}

/// Network manager commands - outbound port.
///
/// Fire-and-forget: delivery and timeouts belong to the network layer.
pub trait NetworkGateway: Send + Sync {
    /// Ask for the block at a height.
    fn request_block_by_height(&self, height: u64, peer: Option<PeerId>) -> Result<(), SyncError>;

    /// Ask for transactions by hash.
    fn request_transactions(&self, hashes: &[Hash], peer: Option<PeerId>) -> Result<(), SyncError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// A request recorded by [`MockNetwork`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkRequest {
    /// Block by height.
    Block {
        /// Requested height.
        height: u64,
        /// Targeted peer.
        peer: Option<PeerId>,
    },
    /// Transactions by hash.
    Transactions {
        /// Requested hashes.
        hashes: Vec<Hash>,
        /// Targeted peer.
        peer: Option<PeerId>,
    },
}

/// Mock network that records every request.
#[derive(Debug, Default)]
pub struct MockNetwork {
    requests: Mutex<Vec<NetworkRequest>>,
    /// Should return errors?
    pub should_fail: bool,
}

impl MockNetwork {
    /// Recording network that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything requested so far.
    pub fn requests(&self) -> Vec<NetworkRequest> {
        self.requests.lock().clone()
    }

    /// Heights requested so far, in order.
    pub fn requested_heights(&self) -> Vec<u64> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                NetworkRequest::Block { height, .. } => Some(*height),
                NetworkRequest::Transactions { .. } => None,
            })
            .collect()
    }

    /// Transaction hashes requested so far, in order.
    pub fn requested_transactions(&self) -> Vec<Hash> {
        self.requests
            .lock()
            .iter()
            .flat_map(|r| match r {
                NetworkRequest::Transactions { hashes, .. } => hashes.clone(),
                NetworkRequest::Block { .. } => Vec::new(),
            })
            .collect()
    }

    fn record(&self, request: NetworkRequest) -> Result<(), SyncError> {
        if self.should_fail {
            return Err(SyncError::Network("Mock failure".to_string()));
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

impl NetworkGateway for MockNetwork {
    fn request_block_by_height(&self, height: u64, peer: Option<PeerId>) -> Result<(), SyncError> {
        self.record(NetworkRequest::Block { height, peer })
    }

    fn request_transactions(&self, hashes: &[Hash], peer: Option<PeerId>) -> Result<(), SyncError> {
        self.record(NetworkRequest::Transactions {
            hashes: hashes.to_vec(),
            peer,
        })
    }
}

/// Mock chain store whose lookups fail, for error-path tests.
#[derive(Clone, Debug, Default)]
pub struct FailingChainStore {
    /// Height reported by `head`.
    pub head_height: u64,
}

#[async_trait]
impl ChainStore for FailingChainStore {
    async fn head(&self) -> Result<ChainHead, StorageError> {
        Ok(ChainHead {
            hash: [0xee; 32],
            height: self.head_height,
        })
    }

    async fn block_by_height(&self, _height: u64) -> Result<Option<Block>, StorageError> {
        Err(StorageError::DatabaseError("Mock failure".to_string()))
    }

    async fn block_by_hash(&self, _hash: &Hash) -> Result<Option<Block>, StorageError> {
        Err(StorageError::DatabaseError("Mock failure".to_string()))
    }

    async fn append(&self, _block: &Block) -> Result<(), StorageError> {
        Err(StorageError::DatabaseError("Mock failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_network_records_in_order() {
        let network = MockNetwork::new();
        network.request_block_by_height(4, None).unwrap();
        network.request_transactions(&[[1; 32]], None).unwrap();
        network.request_block_by_height(5, None).unwrap();

        assert_eq!(network.requested_heights(), vec![4, 5]);
        assert_eq!(network.requested_transactions(), vec![[1; 32]]);
        assert_eq!(network.requests().len(), 3);
    }

    #[test]
    fn test_mock_network_failure() {
        let network = MockNetwork {
            should_fail: true,
            ..Default::default()
        };
        assert!(network.request_block_by_height(1, None).is_err());
        assert!(network.requests().is_empty());
    }

    #[test]
    fn test_pool_insertion_acceptance() {
        assert!(PoolInsertion::Added.is_accepted());
        assert!(PoolInsertion::AlreadyKnown.is_accepted());
        assert!(!PoolInsertion::Rejected("bad nonce".to_string()).is_accepted());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = FailingChainStore { head_height: 3 };
        assert_eq!(store.head().await.unwrap().height, 3);
        assert!(store.block_by_height(1).await.is_err());
    }
}
