//! Batch analysis entry point.
//!
//! Raw records go through classification, exclusion and the category
//! allow-list, then the worker pool values, prices and advises every
//! remaining item. Only configuration problems abort the call; everything
//! else is counted in the summary.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::advisor::ResaleAdvisor;
use super::orchestrator::{AnalysisPipeline, BatchOrchestrator};
use super::parser::ItemParser;
use super::valuation::ValuationEngine;
use crate::config::{AnalysisConfig, AppConfig, Credentials};
use crate::data::search::SerpApiClient;
use crate::data::SearchProvider;
use crate::fetch::Fetcher;
use crate::llm::{build_provider, ReasoningProvider};
use crate::strategy::{ProfitConfig, ProfitModel};
use crate::types::{AnalysisSummary, AnalyzedItem, NormalizedItem, PipelineError, RawItemRecord};

/// Input to [`Analyzer::analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub min_dollar_profit: f64,
    /// Percent.
    pub min_roi_pct: f64,
    pub fee_rate: f64,
    pub items: Vec<RawItemRecord>,
    /// Case-insensitive substrings; an item is kept when its category
    /// contains any of them.
    pub category_allow_list: Option<Vec<String>>,
}

impl AnalysisRequest {
    /// Request carrying the configured targets.
    pub fn from_config(cfg: &AnalysisConfig, items: Vec<RawItemRecord>) -> Self {
        Self {
            min_dollar_profit: cfg.min_dollar_profit,
            min_roi_pct: cfg.min_roi_pct,
            fee_rate: cfg.fee_rate,
            items,
            category_allow_list: cfg.category_allow_list.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Highest expected profit first.
    pub items: Vec<AnalyzedItem>,
    pub summary: AnalysisSummary,
}

pub struct Analyzer {
    parser: ItemParser,
    valuation: ValuationEngine,
    advisor: ResaleAdvisor,
    orchestrator: BatchOrchestrator,
    reasoning: Arc<dyn ReasoningProvider>,
    buyers_premium_rate: f64,
}

impl Analyzer {
    /// Resolve credentials from the environment and build every client.
    /// A missing key fails with [`PipelineError::Configuration`].
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let credentials = Credentials::resolve(cfg)?;
        Self::with_credentials(cfg, credentials)
    }

    pub fn with_credentials(cfg: &AppConfig, credentials: Credentials) -> Result<Self> {
        let reasoning = build_provider(&cfg.llm, credentials.llm_api_key)?;

        let fetcher = Fetcher::new(cfg.scraper.retry_policy(), &cfg.scraper.user_agent)?;
        let search: Arc<dyn SearchProvider> =
            Arc::new(SerpApiClient::new(fetcher.clone(), &cfg.search, credentials.search_api_key));
        let images = cfg.analysis.attach_images.then_some(fetcher);

        info!(
            provider = %cfg.llm.provider,
            model = %reasoning.model_name(),
            images = cfg.analysis.attach_images,
            concurrency = cfg.analysis.item_concurrency,
            "Analyzer ready"
        );

        Ok(Self::with_providers(cfg, reasoning, search, images))
    }

    /// Build around already-constructed providers.
    pub fn with_providers(
        cfg: &AppConfig,
        reasoning: Arc<dyn ReasoningProvider>,
        search: Arc<dyn SearchProvider>,
        images: Option<Fetcher>,
    ) -> Self {
        let analysis = &cfg.analysis;
        Self {
            parser: ItemParser::new(
                reasoning.clone(),
                images,
                analysis.batch_size,
                Duration::from_millis(analysis.batch_pause_ms),
            ),
            valuation: ValuationEngine::new(search, reasoning.clone(), cfg.search.results_per_query),
            advisor: ResaleAdvisor::new(reasoning.clone()),
            orchestrator: BatchOrchestrator::new(analysis.item_concurrency),
            reasoning,
            buyers_premium_rate: analysis.buyers_premium_rate,
        }
    }

    /// Classify, filter and analyse a batch of raw records.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, PipelineError> {
        let profit = ProfitModel::new(self.profit_config(request)?);
        let scraped = request.items.len();

        let parsed = self.parser.parse_all(&request.items).await;
        let candidates = filter_candidates(parsed.items, request.category_allow_list.as_deref());

        let outcome = self.orchestrator.run(&self.pipeline(&profit), &candidates, &profit).await;

        let summary = AnalysisSummary {
            scraped,
            analyzed: outcome.results.len(),
            profitable: outcome.results.iter().filter(|r| r.meets_criteria).count(),
            errors: parsed.errors + outcome.failures,
        };
        info!(%summary, "Analysis complete");

        Ok(AnalysisReport {
            items: outcome.results,
            summary,
        })
    }

    /// Reasoning calls made so far and their approximate USD cost.
    pub fn llm_usage(&self) -> (u64, f64) {
        (self.reasoning.total_calls(), self.reasoning.cumulative_cost())
    }

    fn pipeline<'a>(&'a self, profit: &'a ProfitModel) -> AnalysisPipeline<'a> {
        AnalysisPipeline {
            valuation: &self.valuation,
            advisor: &self.advisor,
            profit,
        }
    }

    fn profit_config(&self, request: &AnalysisRequest) -> Result<ProfitConfig, PipelineError> {
        let bad = |msg: String| Err(PipelineError::Configuration(msg));

        if !(0.0..1.0).contains(&request.fee_rate) {
            return bad(format!("fee_rate must be in [0, 1), got {}", request.fee_rate));
        }
        if !request.min_dollar_profit.is_finite() || !request.min_roi_pct.is_finite() {
            return bad("profit targets must be finite".to_string());
        }
        if request.min_roi_pct < 0.0 {
            return bad(format!("min_roi_pct must not be negative, got {}", request.min_roi_pct));
        }

        Ok(ProfitConfig {
            min_dollar_profit: request.min_dollar_profit,
            min_roi_pct: request.min_roi_pct,
            fee_rate: request.fee_rate,
            buyers_premium_rate: self.buyers_premium_rate,
        })
    }
}

/// Drop excluded items and items outside the allow-list.
fn filter_candidates(items: Vec<NormalizedItem>, allow_list: Option<&[String]>) -> Vec<NormalizedItem> {
    let allow: Option<Vec<String>> = allow_list.map(|list| {
        list.iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    });

    items
        .into_iter()
        .filter(|item| {
            if item.excluded {
                debug!(
                    title = %item.title,
                    reason = item.exclusion_reason.as_deref().unwrap_or("classifier"),
                    "Excluded item skipped"
                );
                return false;
            }
            match &allow {
                Some(allow) if !allow.is_empty() => {
                    let category = item.category.to_lowercase();
                    let keep = allow.iter().any(|c| category.contains(c.as_str()));
                    if !keep {
                        debug!(title = %item.title, category = %item.category, "Category not allowed");
                    }
                    keep
                }
                _ => true,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
