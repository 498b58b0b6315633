//! # Shared Types Crate
//!
//! Chain entities shared between the block sync subsystem and the
//! collaborators around it (network, pool, storage, execution).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: block and transaction hashing live here, so
//!   every crate derives identical identifiers from identical bytes.
//! - **Consumed, not owned**: the sync engine never mutates a `Block`; it
//!   wraps it with its own bookkeeping.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
