//! # Inbound Ports
//!
//! What Block Sync offers to the node lifecycle controller and to peers.

use crate::domain::{SyncError, SyncEvent, SyncPhase};
use async_trait::async_trait;
use shared_types::{Block, Hash, PeerId, Transaction};
use tokio::sync::broadcast;

/// Block Sync API - inbound port.
#[async_trait]
pub trait BlockSyncApi: Send + Sync {
    /// Spawn the job worker. Initial sync fixes its target on the first block.
    async fn start(&self, initial_sync: bool) -> Result<(), SyncError>;

    /// Queue a received or locally produced block. Never blocks.
    fn enqueue_block(&self, block: Block, peer: Option<PeerId>) -> Result<(), SyncError>;

    /// Queue hashes of transactions that just became available.
    fn enqueue_transactions(&self, hashes: Vec<Hash>) -> Result<(), SyncError>;

    /// Add transactions from a peer to the pool and queue the accepted ones.
    ///
    /// Returns the number of queued hashes.
    async fn on_transactions_received(
        &self,
        transactions: Vec<Transaction>,
        peer: Option<PeerId>,
    ) -> Result<usize, SyncError>;

    /// Stop starting new block executions.
    fn cancel(&self);

    /// Subscribe to sync notifications.
    fn subscribe(&self) -> broadcast::Receiver<SyncEvent>;

    /// Size of the primary pending set.
    fn pending_count(&self) -> usize;

    /// Local execution height.
    fn local_height(&self) -> u64;

    /// Current lifecycle phase.
    fn phase(&self) -> SyncPhase;
}

/// Answers peers asking for blocks and transactions we hold.
#[async_trait]
pub trait PeerRequestApi: Send + Sync {
    /// Committed block at `height`, if any.
    async fn block_at_height(&self, height: u64) -> Result<Option<Block>, SyncError>;

    /// Known transactions among `hashes`. Unknown hashes are skipped.
    async fn transactions(&self, hashes: &[Hash]) -> Result<Vec<Transaction>, SyncError>;
}
