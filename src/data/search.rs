//! SerpAPI web search.
//!
//! API: `https://serpapi.com/search.json?engine=google&q=...`
//! Auth: API key via `api_key` query param.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{SearchProvider, SearchSnippet};
use crate::config::SearchConfig;
use crate::fetch::{fetch_with_retry, Fetcher};

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

pub struct SerpApiClient {
    fetcher: Fetcher,
    endpoint: String,
    api_key: SecretString,
}

impl SerpApiClient {
    pub fn new(fetcher: Fetcher, cfg: &SearchConfig, api_key: SecretString) -> Self {
        Self {
            fetcher,
            endpoint: cfg.endpoint.clone(),
            api_key,
        }
    }

    /// Request URL and the key-free form used in logs and errors.
    fn query_urls(&self, query: &str, limit: usize) -> (String, String) {
        let label = format!("{}?q={}&num={}", self.endpoint, urlencoding::encode(query), limit);
        let full = format!(
            "{label}&engine=google&api_key={}",
            urlencoding::encode(self.api_key.expose_secret())
        );
        (full, label)
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchSnippet>> {
        let (url, label) = self.query_urls(query, limit);
        let body = fetch_with_retry(&label, self.fetcher.policy(), || self.fetcher.client().get(&url))
            .await?
            .text();

        let parsed: SerpResponse =
            serde_json::from_str(&body).context("Failed to parse search response")?;
        if let Some(error) = parsed.error {
            anyhow::bail!("Search provider error: {error}");
        }

        let snippets: Vec<SearchSnippet> = parsed
            .organic_results
            .into_iter()
            .filter_map(|r| {
                let link = r.link?;
                Some(SearchSnippet {
                    title: r.title.unwrap_or_default(),
                    link,
                    snippet: r.snippet.unwrap_or_default(),
                })
            })
            .take(limit)
            .collect();

        debug!(query, results = snippets.len(), "Search complete");
        Ok(snippets)
    }
}
