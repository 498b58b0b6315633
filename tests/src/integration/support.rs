//! # Test Support
//!
//! A Block Sync node over in-memory stores plus builders for chains of
//! blocks whose state roots match what the in-memory executor produces.

use qc_18_block_sync::adapters::{
    state_root_for, InMemoryChainStore, InMemoryExecutionService, InMemoryTransactionPool,
    InMemoryTransactionStore, InMemoryWorldState,
};
use qc_18_block_sync::ports::MockNetwork;
use qc_18_block_sync::{BlockSyncApi, BlockSyncService, SyncConfig, SyncDependencies, SyncEvent};
use shared_types::{Block, BlockBody, BlockHeader, Hash, NodeId, PeerId, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long a test waits for the worker before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// A sync service plus handles to its collaborators.
pub struct TestNode {
    /// Service under test.
    pub service: BlockSyncService,
    /// Committed chain.
    pub chain: Arc<InMemoryChainStore>,
    /// Persisted transactions and results.
    pub store: Arc<InMemoryTransactionStore>,
    /// Transaction pool.
    pub pool: Arc<InMemoryTransactionPool>,
    /// World state.
    pub world: Arc<InMemoryWorldState>,
    /// Execution service (failure injection).
    pub execution: Arc<InMemoryExecutionService>,
    /// Recorded network requests.
    pub network: Arc<MockNetwork>,
}

impl TestNode {
    /// Node with [`SyncConfig::for_testing`].
    pub fn new() -> Self {
        Self::with_config(SyncConfig::for_testing())
    }

    /// Node with the given configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        let chain = Arc::new(InMemoryChainStore::new());
        let store = Arc::new(InMemoryTransactionStore::new());
        let pool = Arc::new(InMemoryTransactionPool::new());
        let world = Arc::new(InMemoryWorldState::new());
        let execution = Arc::new(InMemoryExecutionService::new(world.clone()));
        let network = Arc::new(MockNetwork::new());

        let service = BlockSyncService::new(
            config,
            SyncDependencies {
                chain: chain.clone(),
                transactions: store.clone(),
                pool: pool.clone(),
                execution: execution.clone(),
                world: world.clone(),
                network: network.clone(),
            },
        )
        .expect("test config is valid");

        Self {
            service,
            chain,
            store,
            pool,
            world,
            execution,
            network,
        }
    }

    /// Poll until the service reports `height`.
    pub async fn wait_for_height(&self, height: u64) {
        let service = &self.service;
        wait_until(|| service.local_height() >= height).await;
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `condition` every few milliseconds, panicking after [`WAIT`].
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {:?}", WAIT);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Receive events until one matches, panicking after [`WAIT`].
pub async fn next_event_matching(
    events: &mut broadcast::Receiver<SyncEvent>,
    wanted: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    let found = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await;
    found.expect("event not received in time")
}

/// Every event currently buffered.
pub fn drain_events(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Peer `n`.
pub fn peer(n: u8) -> Option<PeerId> {
    Some(NodeId([n; 32]))
}

/// Transaction `nonce` from sender `from`.
pub fn tx(from: u8, nonce: u64) -> Transaction {
    Transaction {
        from: [from; 20],
        to: Some([0xcc; 20]),
        value: 10,
        nonce,
        data: Vec::new(),
        signature: [0; 64],
    }
}

/// Block at `height` on `parent` carrying `txs`. `salt` separates forks.
pub fn block_on(parent: Hash, height: u64, txs: &[Transaction], salt: u64) -> Block {
    let hashes: Vec<Hash> = txs.iter().map(Transaction::hash).collect();
    Block::new(
        BlockHeader {
            chain_id: [0; 32],
            height,
            previous_hash: parent,
            state_root: state_root_for(height, &hashes),
            timestamp: 1_700_000_000 + height * 4 + salt,
            ..Default::default()
        },
        BlockBody::new(hashes),
    )
}

/// `len` empty blocks extending `parent` at `parent_height`.
pub fn extend(parent: Hash, parent_height: u64, len: u64, salt: u64) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(len as usize);
    let mut previous = parent;
    for height in parent_height + 1..=parent_height + len {
        let block = block_on(previous, height, &[], salt);
        previous = block.hash();
        blocks.push(block);
    }
    blocks
}
