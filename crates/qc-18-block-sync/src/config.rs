//! # Block Sync Configuration
//!
//! Configuration for the Block Sync service.

use crate::domain::{
    SyncError, DEFAULT_BRANCH_RETENTION_DEPTH, DEFAULT_MAX_BLOCK_REQUESTS,
    DEFAULT_MAX_TRANSACTION_REQUESTS, DEFAULT_OUT_OF_DATE_WINDOW,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::ChainId;

/// Block sync configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Chain being synchronized.
    pub chain_id: ChainId,

    /// Cap on outstanding block-by-height requests.
    pub max_block_requests: usize,

    /// Cap on outstanding transaction requests.
    pub max_transaction_requests: usize,

    /// Blocks further than this below the local head are out of date.
    pub out_of_date_window: u64,

    /// Branches ending more than this far below the local head are pruned.
    pub branch_retention_depth: u64,

    /// Catch up to the first observed block before steady state.
    pub initial_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chain_id: Self::chain_id_from_label("qc-mainnet"),
            max_block_requests: DEFAULT_MAX_BLOCK_REQUESTS,
            max_transaction_requests: DEFAULT_MAX_TRANSACTION_REQUESTS,
            out_of_date_window: DEFAULT_OUT_OF_DATE_WINDOW,
            branch_retention_depth: DEFAULT_BRANCH_RETENTION_DEPTH,
            initial_sync: false,
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (smaller values).
    pub fn for_testing() -> Self {
        Self {
            chain_id: [0u8; 32],
            max_block_requests: 4,
            max_transaction_requests: 4,
            out_of_date_window: 8,
            branch_retention_depth: 16,
            initial_sync: false,
        }
    }

    /// Chain id derived from a human-readable label (SHA-256).
    pub fn chain_id_from_label(label: &str) -> ChainId {
        Sha256::digest(label.as_bytes()).into()
    }

    /// Reject unusable values.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_block_requests == 0 {
            return Err(SyncError::InvalidConfig(
                "max_block_requests must be > 0".to_string(),
            ));
        }
        if self.max_transaction_requests == 0 {
            return Err(SyncError::InvalidConfig(
                "max_transaction_requests must be > 0".to_string(),
            ));
        }
        if self.out_of_date_window == 0 {
            return Err(SyncError::InvalidConfig(
                "out_of_date_window must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
