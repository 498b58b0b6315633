//! # Execution Types
//!
//! Values exchanged between the block executor and the execution service.

use super::errors::ExecutionError;
use super::validation::SyncSuggestion;
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Context the execution service runs a block's batch under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Chain being executed.
    pub chain_id: ChainId,
    /// Height of the block before the one being applied.
    pub height: u64,
    /// Address of the block producer.
    pub producer: Address,
}

/// Raw per-transaction output of the execution service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTrace {
    /// Executed transaction.
    pub tx_hash: Hash,
    /// Emitted logs.
    pub logs: Vec<Vec<u8>>,
    /// Return payload.
    pub return_value: Vec<u8>,
    /// Error text. Empty on success.
    pub error: String,
}

impl TransactionTrace {
    /// A successful trace.
    pub fn success(tx_hash: Hash, return_value: Vec<u8>) -> Self {
        Self {
            tx_hash,
            logs: Vec::new(),
            return_value,
            error: String::new(),
        }
    }

    /// A failed trace.
    pub fn failure(tx_hash: Hash, error: impl Into<String>) -> Self {
        Self {
            tx_hash,
            logs: Vec::new(),
            return_value: Vec::new(),
            error: error.into(),
        }
    }

    /// Whether the transaction executed without error.
    pub fn is_successful(&self) -> bool {
        self.error.is_empty()
    }
}

/// Status of a committed transaction result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Executed successfully.
    Mined,
    /// Executed with an error. Still included in the block.
    Failed,
}

/// Persisted result of one transaction in a committed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Transaction hash.
    pub tx_hash: Hash,
    /// Outcome.
    pub status: TransactionStatus,
    /// Emitted logs (empty for failures).
    pub logs: Vec<Vec<u8>>,
    /// Return payload, or the error text for failures.
    pub return_value: Vec<u8>,
}

impl From<TransactionTrace> for TransactionResult {
    fn from(trace: TransactionTrace) -> Self {
        if trace.is_successful() {
            Self {
                tx_hash: trace.tx_hash,
                status: TransactionStatus::Mined,
                logs: trace.logs,
                return_value: trace.return_value,
            }
        } else {
            Self {
                tx_hash: trace.tx_hash,
                status: TransactionStatus::Failed,
                logs: Vec::new(),
                return_value: trace.error.into_bytes(),
            }
        }
    }
}

/// Cooperative cancellation signal shared between the executor and the
/// execution service.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// A flag that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of applying one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Block committed.
    Success,
    /// Block rolled back.
    Failed(ExecutionError),
    /// Block was not executed: validation did not suggest apply.
    NotExecuted,
}

impl ExecutionOutcome {
    /// Whether the block was committed.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }
}

/// The (suggestion, outcome) pair the synchronizer acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockExecutionResult {
    /// Validation suggestion for the block.
    pub suggestion: SyncSuggestion,
    /// Execution outcome.
    pub outcome: ExecutionOutcome,
}

impl BlockExecutionResult {
    /// Committed with an apply suggestion.
    pub fn is_success(&self) -> bool {
        self.suggestion != SyncSuggestion::Abandon && self.outcome.is_success()
    }
}
