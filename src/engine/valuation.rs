//! Valuation engine.
//!
//! Runs several differently-phrased searches for an item, bundles the top
//! organic snippets into one evidence block, and asks the reasoning
//! provider for a point estimate with a range. No evidence at all yields a
//! zero-value, low-confidence placeholder instead of an error.

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::data::{SearchProvider, SearchSnippet};
use crate::llm::{complete_json, PromptRequest, ReasoningProvider};
use crate::types::{cents, Confidence, NormalizedItem, ValuationEstimate};

/// Query phrasings issued per item.
const QUERY_SUFFIXES: &[&str] = &["sold price", "for sale", "worth value"];

/// Words carried into search queries from the title.
const MAX_QUERY_WORDS: usize = 8;

/// Listing noise that hurts search relevance.
const QUERY_STOP_WORDS: &[&str] = &["lot", "item", "auction", "bid", "new", "used", "the", "and", "with", "for"];

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Synthesis {
    estimated_value: f64,
    low_estimate: f64,
    high_estimate: f64,
    confidence: String,
    sources: Vec<String>,
    reasoning: String,
}

pub struct ValuationEngine {
    search: Arc<dyn SearchProvider>,
    provider: Arc<dyn ReasoningProvider>,
    results_per_query: usize,
}

impl ValuationEngine {
    pub fn new(search: Arc<dyn SearchProvider>, provider: Arc<dyn ReasoningProvider>, results_per_query: usize) -> Self {
        Self {
            search,
            provider,
            results_per_query: results_per_query.max(1),
        }
    }

    /// Estimate resale value for one item.
    pub async fn estimate(&self, item: &NormalizedItem) -> Result<ValuationEstimate> {
        let terms = search_terms(&item.title);
        if terms.is_empty() {
            warn!(item = %item.id, "No usable search terms, using placeholder valuation");
            return Ok(ValuationEstimate::placeholder("No searchable title"));
        }

        let queries: Vec<String> = QUERY_SUFFIXES.iter().map(|s| format!("{terms} {s}")).collect();
        let results = join_all(
            queries
                .iter()
                .map(|q| self.search.search(q, self.results_per_query)),
        )
        .await;

        let mut evidence: Vec<SearchSnippet> = Vec::new();
        let mut seen = HashSet::new();
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(snippets) => {
                    debug!(query = %query, results = snippets.len(), "Search evidence");
                    evidence.extend(snippets.into_iter().filter(|s| seen.insert(s.link.clone())));
                }
                Err(e) => warn!(query = %query, error = %e, "Search failed, continuing"),
            }
        }

        if evidence.is_empty() {
            warn!(item = %item.id, title = %item.title, "No market evidence found, using placeholder valuation");
            return Ok(ValuationEstimate::placeholder("No market evidence found"));
        }

        let request = PromptRequest::new(Self::system_prompt(), Self::build_prompt(item, &evidence));
        let synthesis: Synthesis = complete_json(self.provider.as_ref(), &request)
            .await
            .with_context(|| format!("Valuation synthesis failed for {}", item.title))?;

        Ok(sanitize(synthesis, &evidence))
    }

    pub fn system_prompt() -> &'static str {
        "You are a resale pricing analyst. Estimate what an item will sell for on the \
         secondary market using ONLY the search evidence provided.\n\n\
         Reply with a single JSON object and nothing else:\n\
         {\"estimated_value\": number, \"low_estimate\": number, \"high_estimate\": number, \
         \"confidence\": \"low\" | \"medium\" | \"high\", \"sources\": [url, ...], \
         \"reasoning\": string}\n\n\
         RULES:\n\
         1. Prefer sold prices over asking prices.\n\
         2. Account for the stated condition.\n\
         3. Cite the URLs you relied on in sources.\n\
         4. Use low confidence when the evidence is thin or inconsistent."
    }

    pub fn build_prompt(item: &NormalizedItem, evidence: &[SearchSnippet]) -> String {
        let mut prompt = String::with_capacity(2000);
        prompt.push_str(&format!("ITEM: \"{}\"\n", item.title));
        if !item.description.is_empty() {
            prompt.push_str(&format!("DESCRIPTION: {}\n", item.description));
        }
        prompt.push_str(&format!("CATEGORY: {}\n", item.category));
        prompt.push_str(&format!("CONDITION: {}\n", item.condition));

        prompt.push_str(&format!("\nSEARCH EVIDENCE ({} results):\n", evidence.len()));
        for (i, s) in evidence.iter().enumerate() {
            prompt.push_str(&format!("{}. {} [{}]\n   {}\n", i + 1, s.title, s.link, s.snippet));
        }
        prompt.push_str("\nEstimate the resale value.\n");
        prompt
    }
}

/// Clean title words for a search query.
pub fn search_terms(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
        .filter(|w| !w.is_empty())
        .filter(|w| !QUERY_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit() || c == '-') || w.len() == 4)
        .take(MAX_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Clamp to non-negative cents, fill a missing range from the point
/// estimate, widen the range to contain it, and dedupe sources.
fn sanitize(synthesis: Synthesis, evidence: &[SearchSnippet]) -> ValuationEstimate {
    let clean = |v: f64| if v.is_finite() { cents(v.max(0.0)) } else { 0.0 };
    let mut low = clean(synthesis.low_estimate);
    let mut high = clean(synthesis.high_estimate);

    let mut estimate = clean(synthesis.estimated_value);
    if estimate == 0.0 && high > 0.0 {
        // Range without a point estimate: take its midpoint.
        estimate = cents((low + high) / 2.0);
    }
    if low == 0.0 {
        low = estimate;
    }
    if high == 0.0 {
        high = estimate;
    }
    if low > high {
        std::mem::swap(&mut low, &mut high);
    }

    let mut seen = HashSet::new();
    let mut sources: Vec<String> = synthesis
        .sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect();
    if sources.is_empty() {
        sources = evidence.iter().take(3).map(|s| s.link.clone()).collect();
    }

    ValuationEstimate {
        low_estimate: low.min(estimate),
        estimated_value: estimate,
        high_estimate: high.max(estimate),
        confidence: synthesis.confidence.parse::<Confidence>().unwrap_or_default(),
        sources,
        reasoning: synthesis.reasoning,
    }
}
