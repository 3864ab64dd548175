//! Batch Evaluation
//!
//! Fans a list of requests out to the engine concurrently. Each request is
//! evaluated independently; requests for the same key in one batch are not
//! coordinated and may all observe the same usage count.

use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use tracing::debug;

use super::engine::QuotaEngine;
use super::error::QuotaResult;
use super::types::{QuotaDecision, QuotaRequest};

/// Concurrent wrapper over a shared engine
#[derive(Clone)]
pub struct BatchEvaluator {
    engine: Arc<QuotaEngine>,
}

impl BatchEvaluator {
    pub fn new(engine: Arc<QuotaEngine>) -> Self {
        Self { engine }
    }

    /// Evaluate every request, returning decisions in input order
    ///
    /// # Errors
    ///
    /// Fails with the first error any evaluation produces; no partial results.
    pub async fn evaluate_many(&self, requests: &[QuotaRequest]) -> QuotaResult<Vec<QuotaDecision>> {
        debug!(count = requests.len(), "Evaluating quota batch");
        try_join_all(requests.iter().map(|r| self.engine.evaluate(r))).await
    }

    /// Evaluate every request, keeping each request's own result
    pub async fn evaluate_all_settled(
        &self,
        requests: &[QuotaRequest],
    ) -> Vec<QuotaResult<QuotaDecision>> {
        join_all(requests.iter().map(|r| self.engine.evaluate(r))).await
    }
}
