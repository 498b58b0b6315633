//! # Quantum-Chain Test Suite
//!
//! Cross-module scenarios for Block Sync (qc-18).
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs          # Node fixture, chain builders
//!     ├── scenarios.rs        # Admission scenarios A-F, rollback
//!     └── fork_resolution.rs  # Branch promotion, height ordering
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests
//! cargo test -p qc-tests integration::fork_resolution
//!
//! # Benchmarks
//! cargo bench -p qc-tests
//! ```

#![allow(dead_code)]

pub mod integration;
