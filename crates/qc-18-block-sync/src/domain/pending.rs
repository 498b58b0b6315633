//! # Pending Block
//!
//! A received, not-yet-committed block plus its missing-transaction tracking.

use shared_types::{Block, Hash, PeerId};
use std::collections::HashMap;

/// A declared transaction of a pending block that the pool does not hold yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingTransaction {
    /// Transaction hash.
    pub hash: Hash,
    /// Whether a network request for it is outstanding.
    pub in_flight: bool,
}

/// A block waiting in the pending/branch store.
#[derive(Clone, Debug)]
pub struct PendingBlock {
    block_hash: Hash,
    block: Block,
    missing: HashMap<Hash, bool>,
    source_peer: Option<PeerId>,
}

impl PendingBlock {
    /// Wrap a block. `missing` lists the declared transactions the pool lacks.
    pub fn new(
        block: Block,
        missing: impl IntoIterator<Item = Hash>,
        source_peer: Option<PeerId>,
    ) -> Self {
        Self {
            block_hash: block.hash(),
            block,
            missing: missing.into_iter().map(|hash| (hash, false)).collect(),
            source_peer,
        }
    }

    /// Cached block hash.
    pub fn block_hash(&self) -> Hash {
        self.block_hash
    }

    /// The wrapped block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Unwrap into the block.
    pub fn into_block(self) -> Block {
        self.block
    }

    /// Block height.
    pub fn height(&self) -> u64 {
        self.block.height()
    }

    /// Declared previous-block hash.
    pub fn previous_hash(&self) -> Hash {
        self.block.previous_hash()
    }

    /// Peer that delivered the block, if any.
    pub fn source_peer(&self) -> Option<PeerId> {
        self.source_peer
    }

    /// True iff every declared transaction is locally available.
    pub fn is_synced(&self) -> bool {
        self.missing.is_empty()
    }

    /// Number of declared transactions still missing.
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// Snapshot of the missing set.
    pub fn missing_transactions(&self) -> Vec<MissingTransaction> {
        self.missing
            .iter()
            .map(|(hash, in_flight)| MissingTransaction {
                hash: *hash,
                in_flight: *in_flight,
            })
            .collect()
    }

    /// Missing hashes with no outstanding request.
    pub fn unrequested_transactions(&self) -> Vec<Hash> {
        self.missing
            .iter()
            .filter(|(_, in_flight)| !**in_flight)
            .map(|(hash, _)| *hash)
            .collect()
    }

    /// Flag a missing hash as requested. Returns false if it is not missing.
    pub fn mark_requested(&mut self, hash: &Hash) -> bool {
        match self.missing.get_mut(hash) {
            Some(in_flight) => {
                *in_flight = true;
                true
            }
            None => false,
        }
    }

    /// Clear every in-flight flag. Returns the hashes that were in flight.
    pub fn withdraw_requests(&mut self) -> Vec<Hash> {
        let mut withdrawn = Vec::new();
        for (hash, in_flight) in self.missing.iter_mut() {
            if *in_flight {
                *in_flight = false;
                withdrawn.push(*hash);
            }
        }
        withdrawn
    }

    /// Drop a hash from the missing set. Returns true if it was missing.
    pub fn remove_transaction(&mut self, hash: &Hash) -> bool {
        self.missing.remove(hash).is_some()
    }
}
