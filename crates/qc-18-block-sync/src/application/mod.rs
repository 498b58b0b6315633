//! # Application Layer
//!
//! The job worker, block execution and the service wiring them together.

pub mod executor;
pub mod requests;
pub mod responder;
pub mod service;
pub mod status;
pub mod synchronizer;

pub use executor::BlockExecutor;
pub use requests::RequestTracker;
pub use responder::RequestResponder;
pub use service::{run_worker, BlockSyncService, SyncDependencies};
pub use status::{StatusSnapshot, SyncStatus};
pub use synchronizer::{BlockSynchronizer, SynchronizerParts};
