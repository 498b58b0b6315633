//! # Error Types
//!
//! Errors raised by collaborators that store chain data.

use thiserror::Error;

/// Errors that can occur in a chain or transaction store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Block not found in storage.
    #[error("Block not found: {0}")]
    NotFound(String),

    /// Appended block does not extend the current head.
    #[error("Parent block not found: cannot write block at height {height}")]
    ParentNotFound { height: u64 },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}
