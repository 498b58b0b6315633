//! # Domain Errors
//!
//! Error types for Block Sync.
//!
//! Validation outcomes are NOT errors: they travel as
//! [`ValidationResult`](super::ValidationResult) values. The types here cover
//! structural rejects, collaborator failures and executor failures.

use shared_types::{short_hex, Hash, StorageError};
use thiserror::Error;

/// Errors surfaced by the sync engine and its collaborators.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Block is structurally malformed and is never admitted.
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Chain or transaction store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transaction pool failure.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Network gateway failure.
    #[error("Network error: {0}")]
    Network(String),

    /// `start` was called twice.
    #[error("Synchronizer already started")]
    AlreadyStarted,

    /// The job queue consumer is gone.
    #[error("Job queue closed")]
    QueueClosed,

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reasons a block execution failed. Always followed by a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The executor was never armed with `start`.
    #[error("Executor not started")]
    NotStarted,

    /// Cancellation was requested before or during the batch.
    #[error("Execution cancelled")]
    Cancelled,

    /// A declared transaction is not in the pool.
    #[error("Cannot find transaction {}", short_hex(.0))]
    MissingTransaction(Hash),

    /// Post-execution state root differs from the header's declared root.
    #[error("State root mismatch: expected {}, got {}", short_hex(.expected), short_hex(.actual))]
    StateRootMismatch {
        /// Root declared by the block header
        expected: Hash,
        /// Root computed after execution
        actual: Hash,
    },

    /// The execution service failed.
    #[error("Execution service error: {0}")]
    Execution(String),

    /// Persisting results or the block failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The pool rejected an update.
    #[error("Pool error: {0}")]
    Pool(String),
}

impl From<SyncError> for ExecutionError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Pool(msg) => ExecutionError::Pool(msg),
            other => ExecutionError::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        ExecutionError::Storage(err.to_string())
    }
}
