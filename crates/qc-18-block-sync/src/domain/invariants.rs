//! # Domain Invariants
//!
//! Rules the synchronizer checks before acting, plus the default limits.

use super::errors::SyncError;
use shared_types::Block;
use std::collections::HashSet;

/// Default cap on outstanding block-by-height requests.
pub const DEFAULT_MAX_BLOCK_REQUESTS: usize = 10;

/// Default cap on outstanding transaction requests.
pub const DEFAULT_MAX_TRANSACTION_REQUESTS: usize = 10;

/// Default rolling window behind the local head (one production round).
pub const DEFAULT_OUT_OF_DATE_WINDOW: u64 = 8;

/// Default depth below the local head at which branches are pruned.
pub const DEFAULT_BRANCH_RETENTION_DEPTH: u64 = 64;

/// Invariant: a block is executed only at exactly `local_height + 1`.
pub fn invariant_no_skip(block_height: u64, local_height: u64) -> bool {
    local_height.checked_add(1) == Some(block_height)
}

/// Invariant: local height never decreases and moves one block at a time.
pub fn invariant_height_step(before: u64, after: u64) -> bool {
    after == before || after == before + 1
}

/// Invariant: a block is older than the rolling window.
///
/// Heights within `window` of genesis are never out of date.
pub fn invariant_out_of_date(block_height: u64, local_height: u64, window: u64) -> bool {
    local_height > window && block_height < local_height - window
}

/// Invariant: a block is structurally sound before it is admitted.
///
/// Height 0 is genesis and never synced. The declared transaction count
/// must match the body and no transaction may appear twice.
pub fn invariant_block_structure(block: &Block) -> Result<(), SyncError> {
    if block.height() == 0 {
        return Err(SyncError::InvalidBlock("height 0 is reserved for genesis".to_string()));
    }

    let declared = block.body.transaction_count as usize;
    let actual = block.body.transactions.len();
    if declared != actual {
        return Err(SyncError::InvalidBlock(format!(
            "declares {} transactions, body has {}",
            declared, actual
        )));
    }

    let mut seen = HashSet::with_capacity(actual);
    if !block.body.transactions.iter().all(|hash| seen.insert(*hash)) {
        return Err(SyncError::InvalidBlock("duplicate transaction in body".to_string()));
    }
    Ok(())
}
