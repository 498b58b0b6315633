//! # Validation Pipeline
//!
//! Runs filters in registration order and folds their results:
//! - first abandon-band result: `Abandon`, later filters do not run
//! - all `Success`: `Apply`
//! - anything else: `Store`

use super::filters::{ChainContextFilter, TransactionMerkleFilter, ValidationFilter};
use crate::domain::{BlockVerdict, ChainContext, SyncSuggestion, ValidationResult};
use crate::ports::ChainStore;
use shared_types::{short_hex, Block, PublicKey};
use std::sync::Arc;
use tracing::trace;

/// Ordered set of validation filters.
#[derive(Default)]
pub struct ValidationPipeline {
    filters: Vec<Box<dyn ValidationFilter>>,
}

impl ValidationPipeline {
    /// Empty pipeline. Accepts every block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction-merkle check followed by the chain-context check.
    pub fn standard(chain: Arc<dyn ChainStore>, out_of_date_window: u64) -> Self {
        Self::new()
            .with_filter(TransactionMerkleFilter)
            .with_filter(ChainContextFilter::new(chain, out_of_date_window))
    }

    /// Register a filter after the existing ones.
    pub fn with_filter(mut self, filter: impl ValidationFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether no filters are registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the filters and keep every result.
    pub async fn evaluate(
        &self,
        block: &Block,
        context: &ChainContext,
        node_key: Option<&PublicKey>,
    ) -> BlockVerdict {
        let mut results = Vec::with_capacity(self.filters.len());

        for filter in &self.filters {
            let result = filter.validate(block, context, node_key).await;
            results.push(result);

            if result.band() == SyncSuggestion::Abandon {
                trace!(
                    "[qc-18] {} abandoned block {}: {}",
                    filter.name(),
                    short_hex(&block.hash()),
                    result
                );
                return BlockVerdict {
                    suggestion: SyncSuggestion::Abandon,
                    results,
                };
            }
        }

        let suggestion = if results.iter().all(|r| *r == ValidationResult::Success) {
            SyncSuggestion::Apply
        } else {
            SyncSuggestion::Store
        };
        BlockVerdict {
            suggestion,
            results,
        }
    }

    /// Run the filters and return only the suggestion.
    pub async fn validate(
        &self,
        block: &Block,
        context: &ChainContext,
        node_key: Option<&PublicKey>,
    ) -> SyncSuggestion {
        self.evaluate(block, context, node_key).await.suggestion
    }
}
