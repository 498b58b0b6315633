//! # Adapters Module
//!
//! Implementations of the outbound ports.

pub mod memory;
pub mod network;

pub use memory::{
    state_root_for, InMemoryChainStore, InMemoryExecutionService, InMemoryTransactionPool,
    InMemoryTransactionStore, InMemoryWorldState,
};
pub use network::LoggingNetwork;
