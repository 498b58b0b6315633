//! # Outstanding Requests
//!
//! Admission control for network re-requests. A height or transaction hash
//! holds a slot from the moment it is requested until it is released; no
//! more than the configured number of slots of each kind are held at once.
//!
//! Shared behind a `parking_lot::Mutex`. Every method is a short
//! check-and-update; callers never hold the lock across an `.await` or a
//! network call.

use shared_types::Hash;
use std::collections::HashSet;

/// Heights and transaction hashes with an outstanding request.
#[derive(Debug)]
pub struct RequestTracker {
    blocks: HashSet<u64>,
    transactions: HashSet<Hash>,
    max_blocks: usize,
    max_transactions: usize,
}

impl RequestTracker {
    /// Tracker with the given caps.
    pub fn new(max_blocks: usize, max_transactions: usize) -> Self {
        Self {
            blocks: HashSet::new(),
            transactions: HashSet::new(),
            max_blocks,
            max_transactions,
        }
    }

    /// Claim slots for heights in `from..to`, skipping heights already
    /// claimed or rejected by `skip`. Stops at the cap.
    pub fn claim_heights(
        &mut self,
        from: u64,
        to: u64,
        skip: impl Fn(u64) -> bool,
    ) -> Vec<u64> {
        let mut claimed = Vec::new();
        for height in from..to {
            if self.blocks.len() >= self.max_blocks {
                break;
            }
            if self.blocks.contains(&height) || skip(height) {
                continue;
            }
            self.blocks.insert(height);
            claimed.push(height);
        }
        claimed
    }

    /// Claim slots for transaction hashes not already claimed. Stops at the cap.
    pub fn claim_transactions(&mut self, hashes: &[Hash]) -> Vec<Hash> {
        let mut claimed = Vec::new();
        for hash in hashes {
            if self.transactions.len() >= self.max_transactions {
                break;
            }
            if self.transactions.insert(*hash) {
                claimed.push(*hash);
            }
        }
        claimed
    }

    /// Free a height slot. Returns true if it was held.
    pub fn release_height(&mut self, height: u64) -> bool {
        self.blocks.remove(&height)
    }

    /// Free every height slot at or below `height`.
    pub fn release_heights_through(&mut self, height: u64) {
        self.blocks.retain(|h| *h > height);
    }

    /// Free transaction slots.
    pub fn release_transactions(&mut self, hashes: &[Hash]) {
        for hash in hashes {
            self.transactions.remove(hash);
        }
    }

    /// Whether a height is in flight.
    pub fn is_height_requested(&self, height: u64) -> bool {
        self.blocks.contains(&height)
    }

    /// Outstanding block requests.
    pub fn outstanding_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Outstanding transaction requests.
    pub fn outstanding_transactions(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heights_are_capped_and_not_doubled() {
        let mut tracker = RequestTracker::new(3, 10);
        assert_eq!(tracker.claim_heights(2, 10, |_| false), vec![2, 3, 4]);
        assert!(tracker.claim_heights(2, 10, |_| false).is_empty());

        assert!(tracker.release_height(3));
        assert_eq!(tracker.claim_heights(2, 10, |_| false), vec![5]);
        assert_eq!(tracker.outstanding_blocks(), 3);
    }

    #[test]
    fn test_skip_excludes_pending_heights() {
        let mut tracker = RequestTracker::new(10, 10);
        let claimed = tracker.claim_heights(1, 6, |h| h == 2 || h == 4);
        assert_eq!(claimed, vec![1, 3, 5]);
    }

    #[test]
    fn test_release_heights_through() {
        let mut tracker = RequestTracker::new(10, 10);
        tracker.claim_heights(1, 6, |_| false);
        tracker.release_heights_through(3);
        assert!(!tracker.is_height_requested(3));
        assert!(tracker.is_height_requested(4));
    }

    #[test]
    fn test_transactions_capped() {
        let mut tracker = RequestTracker::new(10, 2);
        let claimed = tracker.claim_transactions(&[[1; 32], [1; 32], [2; 32], [3; 32]]);
        assert_eq!(claimed, vec![[1; 32], [2; 32]]);

        tracker.release_transactions(&[[1; 32]]);
        assert_eq!(tracker.claim_transactions(&[[3; 32]]), vec![[3; 32]]);
        assert_eq!(tracker.outstanding_transactions(), 2);
    }
}
