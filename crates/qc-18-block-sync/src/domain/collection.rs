//! # Pending/Branch Store
//!
//! Holds every block that is known but not committed.
//!
//! ## Layout
//!
//! - **Primary set**: at most one block per height, ordered by height. The
//!   executable run is always drawn from here.
//! - **Branch arena**: `BranchId -> BranchedChain`, with three indices so a
//!   merge never scans the arena:
//!   - `members`: block hash -> branch holding it
//!   - `heads`: first previous-hash -> branches starting there
//!   - `tails`: last block hash -> branch ending there
//!
//! A block hash lives in at most one place: the primary set or one branch.
//! After every merge no two branches have meeting ends, so only the branch
//! touched by a mutation can take part in a new fusion.

use super::branch::BranchedChain;
use super::pending::PendingBlock;
use shared_types::{short_hex, Hash, PeerId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

/// Arena key of a branch.
pub type BranchId = u64;

/// Where `add_pending` put a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Inserted into the primary set.
    Added,
    /// Height already occupied: routed into branch tracking.
    Forked,
    /// Hash already tracked: nothing changed.
    Duplicate,
}

/// A branch that replaced the primary set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Promotion {
    /// Height of the promoted branch's first block.
    pub first_height: u64,
    /// Number of blocks promoted.
    pub len: usize,
}

/// Pending blocks plus branch tracking.
#[derive(Debug, Default)]
pub struct BlockCollection {
    primary: BTreeMap<u64, PendingBlock>,
    primary_index: HashMap<Hash, u64>,
    branches: BTreeMap<BranchId, BranchedChain>,
    members: HashMap<Hash, BranchId>,
    heads: HashMap<Hash, BTreeSet<BranchId>>,
    tails: HashMap<Hash, BranchId>,
    next_branch_id: BranchId,
    latest_known_height: u64,
}

impl BlockCollection {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the hash is tracked anywhere in the store.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.primary_index.contains_key(hash) || self.members.contains_key(hash)
    }

    /// Look a block up in the primary set or any branch.
    pub fn get(&self, hash: &Hash) -> Option<&PendingBlock> {
        if let Some(height) = self.primary_index.get(hash) {
            return self.primary.get(height);
        }
        let id = self.members.get(hash)?;
        self.branches
            .get(id)?
            .iter()
            .find(|b| b.block_hash() == *hash)
    }

    /// Whether the primary set holds a block at `height`.
    pub fn has_height(&self, height: u64) -> bool {
        self.primary.contains_key(&height)
    }

    /// Size of the primary set.
    pub fn pending_count(&self) -> usize {
        self.primary.len()
    }

    /// Number of tracked branches.
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Blocks across the primary set and all branches.
    pub fn total_len(&self) -> usize {
        self.primary.len() + self.members.len()
    }

    /// Highest height ever inserted into the primary set.
    pub fn latest_known_height(&self) -> u64 {
        self.latest_known_height
    }

    /// Primary blocks in height order.
    pub fn pending_blocks(&self) -> impl Iterator<Item = &PendingBlock> {
        self.primary.values()
    }

    /// Tracked branches in creation order.
    pub fn branches(&self) -> impl Iterator<Item = &BranchedChain> {
        self.branches.values()
    }

    /// Admit a block.
    ///
    /// A hash already tracked is a no-op. A block whose height is already
    /// occupied in the primary set goes to branch tracking. Anything else
    /// joins the primary set and may raise the latest known height.
    pub fn add_pending(&mut self, block: PendingBlock) -> AddOutcome {
        let hash = block.block_hash();
        if self.contains(&hash) {
            return AddOutcome::Duplicate;
        }

        let height = block.height();
        if self.primary.contains_key(&height) {
            trace!(
                "[qc-18] Height {} occupied, tracking {} as fork",
                height,
                short_hex(&hash)
            );
            self.merge_branches(block);
            return AddOutcome::Forked;
        }

        self.insert_primary(block);
        AddOutcome::Added
    }

    /// Remove a block from the primary set and discard it (committed or abandoned).
    pub fn take_pending(&mut self, hash: &Hash) -> Option<PendingBlock> {
        let height = self.primary_index.remove(hash)?;
        self.primary.remove(&height)
    }

    /// Move a block from the primary set into branch tracking.
    ///
    /// Returns false if the block is not in the primary set.
    pub fn remove_pending(&mut self, hash: &Hash) -> bool {
        match self.take_pending(hash) {
            Some(block) => {
                self.merge_branches(block);
                true
            }
            None => false,
        }
    }

    /// Merge a block into branch tracking.
    ///
    /// The block is appended to the branch ending at its parent, else
    /// prepended to a branch starting at its hash, else becomes a singleton.
    /// Branches whose ends then meet are fused until none do. Returns the
    /// branch now holding the block, or `None` if the hash was already tracked.
    pub fn merge_branches(&mut self, block: PendingBlock) -> Option<BranchId> {
        let hash = block.block_hash();
        if self.contains(&hash) {
            return None;
        }

        let previous = block.previous_hash();
        let id = if let Some(&pred) = self.tails.get(&previous) {
            self.update_branch(pred, |branch| branch.push_back(block));
            pred
        } else if let Some(succ) = self.first_branch_starting_at(&hash, None) {
            self.update_branch(succ, |branch| branch.push_front(block));
            succ
        } else {
            let id = self.next_branch_id;
            self.next_branch_id += 1;
            self.branches.insert(id, BranchedChain::new(block));
            self.index_ends(id);
            id
        };
        self.members.insert(hash, id);

        Some(self.fuse(id))
    }

    /// Replace the primary set with an anchored, checkoutable branch.
    ///
    /// Does nothing while the primary block at `local_height + 1` links to
    /// the head and has all its transactions. A candidate must be
    /// checkoutable and start at `local_height + 1` on top of `head_hash`;
    /// if the primary block there links to the head but is still waiting,
    /// the candidate's first block must be synced. The first such branch in
    /// creation order wins. The current primary blocks are detached into
    /// branch tracking first, so any that extend the candidate are carried
    /// along with it.
    pub fn promote_checkoutable(
        &mut self,
        local_height: u64,
        head_hash: Hash,
    ) -> Option<Promotion> {
        let anchored = self.primary_anchored(local_height, &head_hash);
        if anchored.is_some_and(|synced| synced) {
            return None;
        }
        // an anchored primary still waiting on transactions only yields to a ready branch
        let need_ready = anchored.is_some();

        let first_hash = self
            .branches
            .values()
            .find(|b| {
                b.checkoutable(local_height)
                    && b.first_previous_hash() == Some(head_hash)
                    && b.start_height() == Some(local_height.saturating_add(1))
                    && (!need_ready || b.iter().next().is_some_and(PendingBlock::is_synced))
            })
            .and_then(BranchedChain::first_block_hash)?;

        let detached: Vec<PendingBlock> = std::mem::take(&mut self.primary).into_values().collect();
        self.primary_index.clear();
        for block in detached {
            self.merge_branches(block);
        }

        let id = *self.members.get(&first_hash)?;
        let branch = self.remove_branch(id)?;
        let promotion = Promotion {
            first_height: branch.start_height().unwrap_or_default(),
            len: branch.len(),
        };

        for block in branch.into_blocks() {
            if self.primary.contains_key(&block.height()) {
                self.merge_branches(block);
            } else {
                self.insert_primary(block);
            }
        }

        debug!(
            "[qc-18] Promoted branch at height {} ({} blocks)",
            promotion.first_height, promotion.len
        );
        Some(promotion)
    }

    /// Record that transactions are now available.
    ///
    /// Returns the hashes of blocks that became synced.
    pub fn mark_transactions_arrived(&mut self, tx_hashes: &[Hash]) -> Vec<Hash> {
        let mut synced = Vec::new();
        let blocks = self
            .primary
            .values_mut()
            .chain(self.branches.values_mut().flat_map(|b| b.iter_mut()));

        for block in blocks {
            if block.is_synced() {
                continue;
            }
            let mut touched = false;
            for hash in tx_hashes {
                touched |= block.remove_transaction(hash);
            }
            if touched && block.is_synced() {
                synced.push(block.block_hash());
            }
        }
        synced
    }

    /// Missing transactions with no outstanding request, grouped by the
    /// peer that delivered their block. Blocks at or below `local_height`
    /// can never run and are skipped.
    pub fn unrequested_transactions(
        &self,
        local_height: u64,
    ) -> Vec<(Option<PeerId>, Vec<Hash>)> {
        let mut groups: Vec<(Option<PeerId>, Vec<Hash>)> = Vec::new();
        let blocks = self
            .primary
            .values()
            .chain(self.branches.values().flat_map(|b| b.iter()))
            .filter(|b| b.height() > local_height);

        for block in blocks {
            let hashes = block.unrequested_transactions();
            if hashes.is_empty() {
                continue;
            }
            let peer = block.source_peer();
            match groups.iter_mut().find(|(p, _)| *p == peer) {
                Some((_, list)) => {
                    for hash in hashes {
                        if !list.contains(&hash) {
                            list.push(hash);
                        }
                    }
                }
                None => groups.push((peer, hashes)),
            }
        }
        groups
    }

    /// Flag transactions as requested in every block that misses them.
    pub fn mark_transactions_requested(&mut self, tx_hashes: &[Hash]) {
        let blocks = self
            .primary
            .values_mut()
            .chain(self.branches.values_mut().flat_map(|b| b.iter_mut()));
        for block in blocks {
            for hash in tx_hashes {
                block.mark_requested(hash);
            }
        }
    }

    /// Longest run of synced primary blocks with consecutive heights,
    /// starting at the lowest synced one.
    ///
    /// During initial sync the run is empty unless it starts at or below
    /// `local_height + 1`.
    pub fn executable_run(&self, local_height: u64, initial_sync: bool) -> Vec<PendingBlock> {
        let mut run: Vec<PendingBlock> = Vec::new();
        for block in self.primary.values().filter(|b| b.is_synced()) {
            if let Some(last) = run.last() {
                if block.height() != last.height().saturating_add(1) {
                    break;
                }
            }
            run.push(block.clone());
        }

        let ahead = run
            .first()
            .map(|b| b.height() > local_height.saturating_add(1))
            .unwrap_or(false);
        if initial_sync && ahead {
            return Vec::new();
        }
        run
    }

    /// Unsynced primary blocks at or below `local_height`, taken out of the
    /// primary set. The chain has passed their height, so they can never run.
    pub fn take_superseded(&mut self, local_height: u64) -> Vec<PendingBlock> {
        let heights: Vec<u64> = self
            .primary
            .range(..=local_height)
            .filter(|(_, b)| !b.is_synced())
            .map(|(height, _)| *height)
            .collect();

        let mut taken = Vec::with_capacity(heights.len());
        for height in heights {
            if let Some(block) = self.primary.remove(&height) {
                self.primary_index.remove(&block.block_hash());
                taken.push(block);
            }
        }
        taken
    }

    /// Clear outstanding transaction requests of branch blocks at or below
    /// `local_height`. Returns the withdrawn hashes.
    pub fn withdraw_settled_requests(&mut self, local_height: u64) -> Vec<Hash> {
        let mut withdrawn = Vec::new();
        for block in self
            .branches
            .values_mut()
            .flat_map(|b| b.iter_mut())
            .filter(|b| b.height() <= local_height)
        {
            withdrawn.extend(block.withdraw_requests());
        }
        withdrawn
    }

    /// Drop branches ending below `height`. Returns the dropped blocks.
    pub fn prune_branches_below(&mut self, height: u64) -> Vec<PendingBlock> {
        let stale: Vec<BranchId> = self
            .branches
            .iter()
            .filter(|(_, b)| b.end_height().map(|end| end < height).unwrap_or(true))
            .map(|(id, _)| *id)
            .collect();

        let mut dropped = Vec::new();
        for id in stale {
            if let Some(branch) = self.remove_branch(id) {
                dropped.extend(branch.into_blocks());
            }
        }
        dropped
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn insert_primary(&mut self, block: PendingBlock) {
        let height = block.height();
        self.primary_index.insert(block.block_hash(), height);
        self.primary.insert(height, block);
        self.latest_known_height = self.latest_known_height.max(height);
    }

    /// `Some(is_synced)` if the primary block at `local_height + 1` links to the head.
    fn primary_anchored(&self, local_height: u64, head_hash: &Hash) -> Option<bool> {
        self.primary
            .get(&local_height.saturating_add(1))
            .filter(|b| b.previous_hash() == *head_hash)
            .map(PendingBlock::is_synced)
    }

    fn first_branch_starting_at(&self, previous: &Hash, except: Option<BranchId>) -> Option<BranchId> {
        self.heads
            .get(previous)?
            .iter()
            .copied()
            .find(|id| Some(*id) != except)
    }

    fn fuse(&mut self, mut id: BranchId) -> BranchId {
        loop {
            let (first_previous, last) = match self.branches.get(&id) {
                Some(b) => (b.first_previous_hash(), b.last_block_hash()),
                None => return id,
            };

            let successor = last.and_then(|h| self.first_branch_starting_at(&h, Some(id)));
            if let Some(succ) = successor {
                self.join(id, succ);
                continue;
            }

            let predecessor = first_previous
                .and_then(|h| self.tails.get(&h).copied())
                .filter(|pred| *pred != id);
            if let Some(pred) = predecessor {
                self.join(pred, id);
                id = pred;
                continue;
            }

            return id;
        }
    }

    /// Append branch `back` onto branch `front`.
    fn join(&mut self, front: BranchId, back: BranchId) {
        self.unindex_ends(front);
        self.unindex_ends(back);
        if let Some(tail) = self.branches.remove(&back) {
            for block in tail.iter() {
                self.members.insert(block.block_hash(), front);
            }
            if let Some(branch) = self.branches.get_mut(&front) {
                branch.append(tail);
            }
        }
        self.index_ends(front);
    }

    fn update_branch(&mut self, id: BranchId, f: impl FnOnce(&mut BranchedChain)) {
        self.unindex_ends(id);
        if let Some(branch) = self.branches.get_mut(&id) {
            f(branch);
        }
        self.index_ends(id);
    }

    fn remove_branch(&mut self, id: BranchId) -> Option<BranchedChain> {
        self.unindex_ends(id);
        let branch = self.branches.remove(&id)?;
        for block in branch.iter() {
            self.members.remove(&block.block_hash());
        }
        Some(branch)
    }

    fn index_ends(&mut self, id: BranchId) {
        if let Some(branch) = self.branches.get(&id) {
            if let Some(previous) = branch.first_previous_hash() {
                self.heads.entry(previous).or_default().insert(id);
            }
            if let Some(last) = branch.last_block_hash() {
                self.tails.insert(last, id);
            }
        }
    }

    fn unindex_ends(&mut self, id: BranchId) {
        if let Some(branch) = self.branches.get(&id) {
            if let Some(previous) = branch.first_previous_hash() {
                if let Some(ids) = self.heads.get_mut(&previous) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.heads.remove(&previous);
                    }
                }
            }
            if let Some(last) = branch.last_block_hash() {
                if self.tails.get(&last) == Some(&id) {
                    self.tails.remove(&last);
                }
            }
        }
    }
}
