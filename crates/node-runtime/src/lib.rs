//! # Node Runtime Library
//!
//! Exposes the runtime's wiring for testing. The entry point is the
//! `main.rs` binary.

#![warn(missing_docs)]

pub mod container;

pub use container::{load_config, SyncContainer};
