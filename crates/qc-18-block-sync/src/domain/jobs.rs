//! # Jobs, Phases and Events
//!
//! The synchronizer's job stream, its lifecycle phases and the
//! notifications it broadcasts.

use serde::{Deserialize, Serialize};
use shared_types::{short_hex, Block, Hash, PeerId};
use std::fmt;

/// A unit of synchronizer work. Processed strictly in arrival order.
#[derive(Clone, Debug)]
pub enum Job {
    /// A block arrived, optionally from a known peer.
    BlockArrived {
        /// The block.
        block: Block,
        /// Delivering peer (None for locally produced blocks).
        peer: Option<PeerId>,
    },
    /// These transactions are now available in the pool.
    TransactionsArrived(Vec<Hash>),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::BlockArrived { block, .. } => write!(
                f,
                "BlockArrived(height={}, hash={})",
                block.height(),
                short_hex(&block.hash())
            ),
            Job::TransactionsArrived(hashes) => {
                write!(f, "TransactionsArrived({} txs)", hashes.len())
            }
        }
    }
}

/// Lifecycle of one synchronizer.
///
/// ```text
/// Idle ──start(true)──► InitialSyncPending ──first block──► InitialSyncInProgress
///   │                                                               │
///   └──start(false)──────────────► SteadyState ◄──local >= target───┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Not started.
    Idle,
    /// Waiting for the first block to fix the target height.
    InitialSyncPending,
    /// Catching up to a fixed target height.
    InitialSyncInProgress {
        /// Height of the first block observed after start.
        target: u64,
    },
    /// Applying every valid block as it becomes ready.
    SteadyState,
}

impl SyncPhase {
    /// Whether the phase is one of the initial-sync phases.
    pub fn is_initial_sync(&self) -> bool {
        matches!(
            self,
            SyncPhase::InitialSyncPending | SyncPhase::InitialSyncInProgress { .. }
        )
    }

    /// Target height while catching up.
    pub fn target(&self) -> Option<u64> {
        match self {
            SyncPhase::InitialSyncInProgress { target } => Some(*target),
            _ => None,
        }
    }
}

/// Notifications for external collaborators (e.g. block production).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Initial sync reached its target. Sent once per synchronizer.
    SyncFinished {
        /// Local height at the transition.
        height: u64,
    },
    /// A block was appended to the committed chain.
    BlockCommitted {
        /// Committed height.
        height: u64,
        /// Committed block hash.
        hash: Hash,
    },
    /// A branch replaced the pending set.
    BranchPromoted {
        /// Height of the promoted branch's first block.
        first_height: u64,
        /// Number of promoted blocks.
        len: usize,
    },
}
