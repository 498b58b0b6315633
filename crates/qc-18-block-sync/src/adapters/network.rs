//! # Logging Network Adapter
//!
//! Network gateway for a node without a transport attached: requests are
//! logged, nothing is sent.

use crate::domain::SyncError;
use crate::ports::NetworkGateway;
use shared_types::{Hash, PeerId};
use tracing::info;

/// Gateway that logs requests.
#[derive(Debug, Default)]
pub struct LoggingNetwork;

impl NetworkGateway for LoggingNetwork {
    fn request_block_by_height(&self, height: u64, peer: Option<PeerId>) -> Result<(), SyncError> {
        info!("[qc-18] -> request block at height {} from {:?}", height, peer);
        Ok(())
    }

    fn request_transactions(&self, hashes: &[Hash], peer: Option<PeerId>) -> Result<(), SyncError> {
        info!("[qc-18] -> request {} transactions from {:?}", hashes.len(), peer);
        Ok(())
    }
}
