//! # Validation Taxonomy
//!
//! Closed classification of block-check outcomes.
//!
//! Every filter result falls into one of three bands, and the band alone
//! decides what the synchronizer does with the block:
//!
//! | Band      | Meaning                               | Legacy codes      |
//! |-----------|---------------------------------------|-------------------|
//! | Abandon   | discard permanently                   | `< 100`           |
//! | Store     | keep, not yet contiguous              | `1000..100000`    |
//! | Success   | eligible to apply now                 | `>= 100000`       |
//!
//! A new check picks a reason inside the right band; the aggregation in
//! the pipeline never has to change.

use serde::{Deserialize, Serialize};
use shared_types::{ChainId, Hash};
use std::fmt;

/// Reasons that put a block in the abandon band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbandonReason {
    /// The identical block is already committed at its height.
    AlreadyExecuted,
    /// Body transactions do not hash to the header's declared root.
    IncorrectTransactionMerkleTreeRoot,
    /// Block claims the next slot but does not link to the local head.
    IncorrectPreviousBlockHash,
    /// Block is further behind the local head than the rolling window.
    OutOfDate,
    /// A filter hit an unreachable branch or a collaborator error.
    FailedToValidate,
}

/// Reasons that put a block in the store band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreReason {
    /// Height already passed locally, but a different block was committed there.
    LowerHeight,
    /// Intermediate blocks are missing.
    HigherHeight,
    /// Produced outside its producer's time slot.
    InvalidTimeSlot,
}

/// Outcome of a single validation filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationResult {
    /// Discard the block.
    Abandon(AbandonReason),
    /// Keep the block for later.
    Store(StoreReason),
    /// The filter has no objection.
    Success,
}

impl ValidationResult {
    /// The suggestion band this result belongs to.
    pub fn band(&self) -> SyncSuggestion {
        match self {
            ValidationResult::Abandon(_) => SyncSuggestion::Abandon,
            ValidationResult::Store(_) => SyncSuggestion::Store,
            ValidationResult::Success => SyncSuggestion::Apply,
        }
    }

    /// Numeric code, stable across releases, used in log lines.
    pub fn code(&self) -> u32 {
        match self {
            ValidationResult::Abandon(AbandonReason::AlreadyExecuted) => 1,
            ValidationResult::Abandon(AbandonReason::IncorrectTransactionMerkleTreeRoot) => 10,
            ValidationResult::Abandon(AbandonReason::IncorrectPreviousBlockHash) => 11,
            ValidationResult::Abandon(AbandonReason::OutOfDate) => 12,
            ValidationResult::Abandon(AbandonReason::FailedToValidate) => 99,
            ValidationResult::Store(StoreReason::LowerHeight) => 1001,
            ValidationResult::Store(StoreReason::HigherHeight) => 1002,
            ValidationResult::Store(StoreReason::InvalidTimeSlot) => 1003,
            ValidationResult::Success => 100_001,
        }
    }

    /// Whether this is the given abandon reason.
    pub fn is_abandon(&self, reason: AbandonReason) -> bool {
        *self == ValidationResult::Abandon(reason)
    }

    /// Whether this is the given store reason.
    pub fn is_store(&self, reason: StoreReason) -> bool {
        *self == ValidationResult::Store(reason)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationResult::Abandon(reason) => write!(f, "{reason:?}({})", self.code()),
            ValidationResult::Store(reason) => write!(f, "{reason:?}({})", self.code()),
            ValidationResult::Success => write!(f, "Success({})", self.code()),
        }
    }
}

/// What the synchronizer should do with a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncSuggestion {
    /// Contiguous with the local head: execute now.
    Apply,
    /// Plausible but not executable yet.
    Store,
    /// Discard permanently.
    Abandon,
}

/// The pipeline's verdict: the suggestion plus the filter results behind it.
///
/// When the pipeline short-circuits, `results` ends with the abandoning
/// result and holds nothing from the filters that did not run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockVerdict {
    /// Aggregated suggestion.
    pub suggestion: SyncSuggestion,
    /// Individual filter results, in filter order.
    pub results: Vec<ValidationResult>,
}

impl BlockVerdict {
    /// Whether any filter produced the given result.
    pub fn contains(&self, result: ValidationResult) -> bool {
        self.results.contains(&result)
    }

    /// First non-success result, for logging.
    pub fn reason(&self) -> Option<ValidationResult> {
        self.results
            .iter()
            .copied()
            .find(|r| *r != ValidationResult::Success)
    }
}

/// Snapshot of the local canonical chain that filters validate against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    /// Chain being synchronized.
    pub chain_id: ChainId,
    /// Hash of the local head (genesis parent hash on an empty chain).
    pub head_hash: Hash,
    /// Height of the local head.
    pub head_height: u64,
}
