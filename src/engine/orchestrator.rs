//! Batch orchestrator.
//!
//! A fixed pool of K workers drains a shared item list. Each worker claims
//! the next unprocessed index with an atomic counter, runs it through
//! valuation, profit and advice, and appends the result. Every index is
//! claimed exactly once. A failed item is omitted and counted; it never
//! stops the other workers.
//!
//! Completion order is irrelevant: results are re-sorted by expected profit
//! (descending, ties in input order) once every worker has finished, and
//! `meets_criteria` is assigned in that final pass.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::advisor::ResaleAdvisor;
use super::valuation::ValuationEngine;
use crate::strategy::ProfitModel;
use crate::types::{AnalyzedItem, NormalizedItem};

// ---------------------------------------------------------------------------
// Per-item work
// ---------------------------------------------------------------------------

/// Work done for one item by a pool worker.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, item: &NormalizedItem) -> Result<AnalyzedItem>;
}

/// Valuation, then profit, then advice.
pub struct AnalysisPipeline<'a> {
    pub valuation: &'a ValuationEngine,
    pub advisor: &'a ResaleAdvisor,
    pub profit: &'a ProfitModel,
}

#[async_trait]
impl ItemProcessor for AnalysisPipeline<'_> {
    async fn process(&self, item: &NormalizedItem) -> Result<AnalyzedItem> {
        let valuation = self.valuation.estimate(item).await?;
        let profit = self
            .profit
            .analyze(valuation.estimated_value, item.size_class, item.current_bid);
        let advice = self.advisor.advise(item, &valuation, &profit).await;

        Ok(AnalyzedItem {
            item: item.clone(),
            valuation,
            profit,
            advice,
            meets_criteria: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Sorted by expected profit, highest first. Equal profits keep input
    /// order.
    pub results: Vec<AnalyzedItem>,
    pub failures: usize,
}

pub struct BatchOrchestrator {
    concurrency: usize,
}

impl BatchOrchestrator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run<P>(&self, processor: &P, items: &[NormalizedItem], profit: &ProfitModel) -> BatchOutcome
    where
        P: ItemProcessor + ?Sized,
    {
        let workers = self.concurrency.min(items.len());
        info!(items = items.len(), workers, "Starting analysis workers");

        let next = AtomicUsize::new(0);
        let failures = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, AnalyzedItem)>> = Mutex::new(Vec::with_capacity(items.len()));

        let pool = (0..workers).map(|worker| {
            let (next, failures, results) = (&next, &failures, &results);
            async move {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = items.get(index) else { break };

                    debug!(worker, index, title = %item.title, "Processing item");
                    match processor.process(item).await {
                        Ok(analyzed) => results.lock().await.push((index, analyzed)),
                        Err(e) => {
                            warn!(worker, item = %item.id, title = %item.title, error = %e, "Item analysis failed, omitting");
                            failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        });
        join_all(pool).await;

        let mut indexed = results.into_inner();
        indexed.sort_by(|(ia, a), (ib, b)| {
            b.profit
                .expected_profit
                .total_cmp(&a.profit.expected_profit)
                .then(ia.cmp(ib))
        });
        let mut results: Vec<AnalyzedItem> = indexed.into_iter().map(|(_, r)| r).collect();
        for r in &mut results {
            r.meets_criteria = profit.meets_criteria(&r.profit, r.item.current_bid);
        }

        let failures = failures.into_inner();
        info!(
            analyzed = results.len(),
            failures,
            profitable = results.iter().filter(|r| r.meets_criteria).count(),
            "Analysis workers finished"
        );

        BatchOutcome { results, failures }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
