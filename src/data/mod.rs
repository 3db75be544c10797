//! External data providers.
//!
//! Defines the `SearchProvider` trait used by the valuation engine to
//! gather resale-price evidence, and a SerpAPI implementation.

pub mod search;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One ranked organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchSnippet {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// Abstraction over web search providers.
///
/// Returns at most `limit` organic results for a query, best first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchSnippet>>;
}
