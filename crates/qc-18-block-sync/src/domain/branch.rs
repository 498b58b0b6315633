//! # Branched Chain
//!
//! A contiguous run of pending blocks linked by previous-hash: a candidate
//! continuation of the canonical chain.

use super::pending::PendingBlock;
use shared_types::Hash;
use std::collections::VecDeque;

/// Ordered run of pending blocks where each block's previous hash is the
/// hash of the block before it.
#[derive(Clone, Debug, Default)]
pub struct BranchedChain {
    blocks: VecDeque<PendingBlock>,
}

impl BranchedChain {
    /// Singleton branch.
    pub fn new(block: PendingBlock) -> Self {
        let mut blocks = VecDeque::with_capacity(4);
        blocks.push_back(block);
        Self { blocks }
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the branch has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Previous hash of the first block.
    pub fn first_previous_hash(&self) -> Option<Hash> {
        self.blocks.front().map(PendingBlock::previous_hash)
    }

    /// Hash of the first block.
    pub fn first_block_hash(&self) -> Option<Hash> {
        self.blocks.front().map(PendingBlock::block_hash)
    }

    /// Hash of the last block.
    pub fn last_block_hash(&self) -> Option<Hash> {
        self.blocks.back().map(PendingBlock::block_hash)
    }

    /// Height of the first block.
    pub fn start_height(&self) -> Option<u64> {
        self.blocks.front().map(PendingBlock::height)
    }

    /// Height of the last block.
    pub fn end_height(&self) -> Option<u64> {
        self.blocks.back().map(PendingBlock::height)
    }

    /// Every adjacent pair links by hash. An empty branch is not continuous.
    pub fn is_continuous(&self) -> bool {
        if self.blocks.is_empty() {
            return false;
        }
        self.blocks
            .iter()
            .zip(self.blocks.iter().skip(1))
            .all(|(prev, next)| next.previous_hash() == prev.block_hash())
    }

    /// Continuous and reaching past the local height.
    pub fn checkoutable(&self, local_height: u64) -> bool {
        self.is_continuous()
            && self
                .end_height()
                .map(|end| end > local_height)
                .unwrap_or(false)
    }

    /// Whether the branch holds the given block.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.iter().any(|b| b.block_hash() == *hash)
    }

    /// Add a block that links onto the front.
    pub(crate) fn push_front(&mut self, block: PendingBlock) {
        self.blocks.push_front(block);
    }

    /// Add a block that links onto the back.
    pub(crate) fn push_back(&mut self, block: PendingBlock) {
        self.blocks.push_back(block);
    }

    /// Append another branch whose first block links to our last.
    pub(crate) fn append(&mut self, mut other: BranchedChain) {
        self.blocks.append(&mut other.blocks);
    }

    /// Blocks in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingBlock> {
        self.blocks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PendingBlock> {
        self.blocks.iter_mut()
    }

    /// Consume into blocks in chain order.
    pub fn into_blocks(self) -> Vec<PendingBlock> {
        self.blocks.into_iter().collect()
    }
}
