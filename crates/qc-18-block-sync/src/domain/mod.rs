//! # Domain Module
//!
//! Core domain types for Block Sync.

pub mod branch;
pub mod collection;
pub mod errors;
pub mod execution;
pub mod invariants;
pub mod jobs;
pub mod pending;
pub mod validation;

pub use branch::*;
pub use collection::*;
pub use errors::*;
pub use execution::*;
pub use invariants::*;
pub use jobs::*;
pub use pending::*;
pub use validation::*;
