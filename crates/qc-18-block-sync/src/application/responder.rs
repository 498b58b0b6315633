//! # Peer Request Responder
//!
//! Serves blocks by height and transactions by hash to peers that are
//! syncing from us. Pooled transactions are preferred; committed ones are
//! read from the transaction store.

use crate::domain::SyncError;
use crate::ports::{ChainStore, PeerRequestApi, TransactionPool, TransactionStore};
use async_trait::async_trait;
use shared_types::{Block, Hash, Transaction};
use std::sync::Arc;
use tracing::trace;

/// Answers block and transaction requests from local state.
pub struct RequestResponder {
    chain: Arc<dyn ChainStore>,
    transactions: Arc<dyn TransactionStore>,
    pool: Arc<dyn TransactionPool>,
}

impl RequestResponder {
    /// Responder over the given stores.
    pub fn new(
        chain: Arc<dyn ChainStore>,
        transactions: Arc<dyn TransactionStore>,
        pool: Arc<dyn TransactionPool>,
    ) -> Self {
        Self {
            chain,
            transactions,
            pool,
        }
    }
}

#[async_trait]
impl PeerRequestApi for RequestResponder {
    async fn block_at_height(&self, height: u64) -> Result<Option<Block>, SyncError> {
        let block = self.chain.block_by_height(height).await?;
        trace!("[qc-18] Peer asked for height {}: found={}", height, block.is_some());
        Ok(block)
    }

    async fn transactions(&self, hashes: &[Hash]) -> Result<Vec<Transaction>, SyncError> {
        let mut found = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(tx) = self.pool.try_get(hash).await {
                found.push(tx);
            } else if let Some(tx) = self.transactions.transaction(hash).await? {
                found.push(tx);
            }
        }
        trace!(
            "[qc-18] Peer asked for {} transactions, serving {}",
            hashes.len(),
            found.len()
        );
        Ok(found)
    }
}
