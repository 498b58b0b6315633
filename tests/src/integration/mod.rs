//! Block Sync integration tests.

pub mod fork_resolution;
pub mod scenarios;
pub mod support;
