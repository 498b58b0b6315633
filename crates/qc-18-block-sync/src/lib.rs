//! # Quantum Chain - Block Admission & Sync (Subsystem 18)
//!
//! **Bounded Context:** Block Admission, Fork Tracking & Ordered Execution
//! **Architecture Compliance:** DDD + Hexagonal + TDD
//!
//! ## Purpose
//!
//! Decides, for every block that reaches the node, whether to execute it
//! now, keep it for later or drop it:
//! - Validation filters fold into one suggestion (Apply / Store / Abandon)
//! - Blocks that cannot run yet wait in a pending set; forks are kept as
//!   continuous branches until they can replace it
//! - Executable blocks run strictly in height order with all-or-nothing
//!   rollback
//! - Missing transactions and heights are re-requested under caps
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters (Outer)                                   │
//! │  - In-memory chain, pool, world state, execution    │
//! │  - Logging network gateway                          │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Application                                        │
//! │  - BlockSyncService: job queue + worker             │
//! │  - BlockSynchronizer: outcome handling              │
//! │  - BlockExecutor: apply with rollback               │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Inner - Pure Logic)                        │
//! │  - BlockCollection: pending set + branches          │
//! │  - ValidationResult / SyncSuggestion                │
//! │  - Invariants: no skip, height step, window         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Critical Invariants
//!
//! 1. **No Skip**: a block executes only at `local_height + 1`
//! 2. **Monotonic Height**: local height moves up one block at a time
//! 3. **Unique Tracking**: a hash lives in the pending set or one branch
//! 4. **Continuous Branches**: every branch links parent to child
//! 5. **Atomic Apply**: a failed block leaves no persisted effect
//!
//! ## Module Structure
//!
//! - [`domain`]: Pending blocks, branches, validation results, invariants
//! - [`algorithms`]: Validation filters and the pipeline
//! - [`ports`]: Hexagonal architecture interfaces (inbound/outbound)
//! - [`application`]: Service, synchronizer, executor
//! - [`adapters`]: In-memory and logging implementations of the ports

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use config::SyncConfig;

// Re-export commonly used types
pub use domain::{
    AbandonReason, BlockCollection, BlockVerdict, BranchedChain, ChainContext, ExecutionError,
    ExecutionOutcome, Job, PendingBlock, StoreReason, SyncError, SyncEvent, SyncPhase,
    SyncSuggestion, TransactionResult, TransactionStatus, ValidationResult,
};

pub use algorithms::{ChainContextFilter, TransactionMerkleFilter, ValidationFilter, ValidationPipeline};

pub use ports::{
    BlockSyncApi, ChainHead, ChainStore, ExecutionService, NetworkGateway, PeerRequestApi,
    PoolInsertion, TransactionPool, TransactionStore, WorldState,
};

pub use application::{
    BlockExecutor, BlockSyncService, RequestResponder, StatusSnapshot, SyncDependencies,
    SyncStatus,
};

/// Subsystem identifier used in log prefixes.
pub const SUBSYSTEM_ID: u8 = 18;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
