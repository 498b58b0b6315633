//! # Algorithms Module
//!
//! Block validation: independent filters and the pipeline folding them
//! into one suggestion.

pub mod filters;
pub mod pipeline;

pub use filters::{ChainContextFilter, TransactionMerkleFilter, ValidationFilter};
pub use pipeline::ValidationPipeline;
