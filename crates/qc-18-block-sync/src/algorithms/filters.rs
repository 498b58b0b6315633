//! # Validation Filters
//!
//! Independent block checks. Each reads the block and the chain context,
//! never mutates shared state, and returns one [`ValidationResult`].
//!
//! Collaborator errors never escape a filter: they become
//! `Abandon(FailedToValidate)`.

use crate::domain::{
    invariant_out_of_date, AbandonReason, ChainContext, StoreReason, ValidationResult,
};
use crate::ports::ChainStore;
use async_trait::async_trait;
use shared_types::{short_hex, Block, PublicKey};
use std::sync::Arc;
use tracing::{error, trace};

/// One check in the validation pipeline.
#[async_trait]
pub trait ValidationFilter: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Classify `block` against `context`.
    async fn validate(
        &self,
        block: &Block,
        context: &ChainContext,
        node_key: Option<&PublicKey>,
    ) -> ValidationResult;
}

// =============================================================================
// TRANSACTION MERKLE ROOT
// =============================================================================

/// Recomputes the merkle root over the body and compares it to the header.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionMerkleFilter;

#[async_trait]
impl ValidationFilter for TransactionMerkleFilter {
    fn name(&self) -> &'static str {
        "transaction-merkle"
    }

    async fn validate(
        &self,
        block: &Block,
        _context: &ChainContext,
        _node_key: Option<&PublicKey>,
    ) -> ValidationResult {
        if block.body.merkle_root() == block.header.transactions_root {
            ValidationResult::Success
        } else {
            ValidationResult::Abandon(AbandonReason::IncorrectTransactionMerkleTreeRoot)
        }
    }
}

// =============================================================================
// CHAIN CONTEXT
// =============================================================================

/// Height and continuity check against the local canonical chain.
///
/// Order of checks:
/// 1. older than the rolling window: `OutOfDate`
/// 2. more than one above the head: `HigherHeight`
/// 3. at or below the head: `AlreadyExecuted` if the committed block is
///    identical, else `LowerHeight`
/// 4. next slot (or genesis parent): `Success` if it links to the head,
///    else `IncorrectPreviousBlockHash`
pub struct ChainContextFilter {
    chain: Arc<dyn ChainStore>,
    out_of_date_window: u64,
}

impl ChainContextFilter {
    /// Filter reading committed blocks from `chain`.
    pub fn new(chain: Arc<dyn ChainStore>, out_of_date_window: u64) -> Self {
        Self {
            chain,
            out_of_date_window,
        }
    }
}

#[async_trait]
impl ValidationFilter for ChainContextFilter {
    fn name(&self) -> &'static str {
        "chain-context"
    }

    async fn validate(
        &self,
        block: &Block,
        context: &ChainContext,
        _node_key: Option<&PublicKey>,
    ) -> ValidationResult {
        let height = block.height();
        let local = context.head_height;

        if invariant_out_of_date(height, local, self.out_of_date_window) {
            return ValidationResult::Abandon(AbandonReason::OutOfDate);
        }

        if height > local.saturating_add(1) {
            return ValidationResult::Store(StoreReason::HigherHeight);
        }

        if height <= local {
            return match self.chain.block_by_height(height).await {
                Ok(Some(committed)) if committed.hash() == block.hash() => {
                    ValidationResult::Abandon(AbandonReason::AlreadyExecuted)
                }
                Ok(Some(_)) => ValidationResult::Store(StoreReason::LowerHeight),
                Ok(None) => {
                    error!(
                        "[qc-18] No committed block at height {} below head {}",
                        height, local
                    );
                    ValidationResult::Abandon(AbandonReason::FailedToValidate)
                }
                Err(e) => {
                    error!(
                        "[qc-18] Chain lookup failed for block {}: {}",
                        short_hex(&block.hash()),
                        e
                    );
                    ValidationResult::Abandon(AbandonReason::FailedToValidate)
                }
            };
        }

        if height == local + 1 || block.header.has_genesis_parent() {
            if block.previous_hash() == context.head_hash {
                return ValidationResult::Success;
            }
            trace!(
                "[qc-18] Block {} at height {} does not link to head {}",
                short_hex(&block.hash()),
                height,
                short_hex(&context.head_hash)
            );
            return ValidationResult::Abandon(AbandonReason::IncorrectPreviousBlockHash);
        }

        error!(
            "[qc-18] Unclassified block {} at height {} (local {})",
            short_hex(&block.hash()),
            height,
            local
        );
        ValidationResult::Abandon(AbandonReason::FailedToValidate)
    }
}
