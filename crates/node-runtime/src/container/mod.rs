//! # Sync Container
//!
//! Builds the Block Sync service over in-memory collaborators and keeps
//! handles to everything the runtime needs after startup.

mod config;

pub use config::{
    config_from, load_config, ENV_CHAIN_ID, ENV_INITIAL_SYNC, ENV_MAX_BLOCK_REQUESTS,
    ENV_MAX_TX_REQUESTS, ENV_WINDOW,
};

use qc_18_block_sync::adapters::{
    InMemoryChainStore, InMemoryExecutionService, InMemoryTransactionPool,
    InMemoryTransactionStore, InMemoryWorldState, LoggingNetwork,
};
use qc_18_block_sync::{
    BlockSyncService, RequestResponder, SyncConfig, SyncDependencies, SyncError,
};
use std::sync::Arc;
use tracing::info;

/// Wired Block Sync subsystem.
pub struct SyncContainer {
    /// Sync configuration in use.
    pub config: SyncConfig,
    /// The sync service.
    pub service: Arc<BlockSyncService>,
    /// Answers peer block/transaction requests.
    pub responder: Arc<RequestResponder>,
    /// Committed chain.
    pub chain: Arc<InMemoryChainStore>,
    /// Transaction pool.
    pub pool: Arc<InMemoryTransactionPool>,
}

impl SyncContainer {
    /// Wire the service. Fails on invalid configuration.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        info!("Wiring Block Sync over in-memory stores");

        let chain = Arc::new(InMemoryChainStore::new());
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let pool = Arc::new(InMemoryTransactionPool::new());
        let world = Arc::new(InMemoryWorldState::new());
        let execution = Arc::new(InMemoryExecutionService::new(world.clone()));

        let service = BlockSyncService::new(
            config.clone(),
            SyncDependencies {
                chain: chain.clone(),
                transactions: transactions.clone(),
                pool: pool.clone(),
                execution,
                world,
                network: Arc::new(LoggingNetwork),
            },
        )?;
        let responder = RequestResponder::new(chain.clone(), transactions, pool.clone());

        Ok(Self {
            config,
            service: Arc::new(service),
            responder: Arc::new(responder),
            chain,
            pool,
        })
    }
}
