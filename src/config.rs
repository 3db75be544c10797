//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved once per process into a [`Credentials`] value that is passed
//! down explicitly to the clients that need it.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::fetch::RetryPolicy;
use crate::types::PipelineError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScraperConfig {
    /// Page listing every open auction.
    pub index_url: String,
    /// Regex matching auction links; capture group 1 is the auction id.
    pub auction_path_pattern: String,
    /// Regex matching item-detail links; capture group 1 is the item id.
    pub item_path_pattern: String,
    pub max_items: usize,
    pub parallel_auctions: usize,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on numbered pages walked in single-auction mode.
    pub max_pages: u32,
    /// Open auctions kept when the date window matches nothing.
    pub fallback_auctions: usize,
    /// Window length used by the binary: today .. today + days_ahead.
    pub days_ahead: i64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            index_url: "https://auctions.example.com/auctions".to_string(),
            auction_path_pattern: r"/auctions?/(\d+)".to_string(),
            item_path_pattern: r"/(?:item|lot)s?/(\d+)".to_string(),
            max_items: 200,
            parallel_auctions: 4,
            request_timeout_ms: 15_000,
            retries: 2,
            retry_delay_ms: 1_000,
            max_pages: 10,
            fallback_auctions: 3,
            days_ahead: 3,
            user_agent: "Mozilla/5.0 (compatible; BIDSCOUT/0.1.0)".to_string(),
        }
    }
}

impl ScraperConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.request_timeout_ms),
            retries: self.retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Raw items classified per batch.
    pub batch_size: usize,
    /// Pause between classification batches.
    pub batch_pause_ms: u64,
    /// Worker count for valuation/profit/advice.
    pub item_concurrency: usize,
    /// Buyer's premium as a fraction of the winning bid.
    pub buyers_premium_rate: f64,
    pub min_dollar_profit: f64,
    /// Minimum ROI in percent.
    pub min_roi_pct: f64,
    /// Resale channel fee as a fraction of sale price.
    pub fee_rate: f64,
    /// Attach the listing image to classification calls.
    pub attach_images: bool,
    pub category_allow_list: Option<Vec<String>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_pause_ms: 1_000,
            item_concurrency: 3,
            buyers_premium_rate: 0.10,
            min_dollar_profit: 20.0,
            min_roi_pct: 30.0,
            fee_rate: 0.13,
            attach_images: true,
            category_allow_list: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// "anthropic" | "openrouter"
    pub provider: String,
    pub model: String,
    /// Second model tried when the primary fails (OpenRouter only).
    pub fallback_model: Option<String>,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            fallback_model: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 1024,
            timeout_secs: 120,
            retries: 2,
            retry_delay_ms: 2_000,
        }
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key_env: String,
    pub endpoint: String,
    /// Organic snippets kept per query.
    pub results_per_query: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "SERPAPI_KEY".to_string(),
            endpoint: "https://serpapi.com/search.json".to_string(),
            results_per_query: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject knob values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: &str| Err(PipelineError::Configuration(msg.to_string()));

        if self.scraper.parallel_auctions == 0 {
            return bad("scraper.parallel_auctions must be at least 1");
        }
        if self.scraper.max_items == 0 {
            return bad("scraper.max_items must be at least 1");
        }
        if self.analysis.batch_size == 0 {
            return bad("analysis.batch_size must be at least 1");
        }
        if self.analysis.item_concurrency == 0 {
            return bad("analysis.item_concurrency must be at least 1");
        }
        if !(0.0..1.0).contains(&self.analysis.fee_rate) {
            return bad("analysis.fee_rate must be in [0, 1)");
        }
        if self.analysis.buyers_premium_rate < 0.0 {
            return bad("analysis.buyers_premium_rate must not be negative");
        }
        regex::Regex::new(&self.scraper.auction_path_pattern)
            .map_err(|e| PipelineError::Configuration(format!("auction_path_pattern: {e}")))?;
        regex::Regex::new(&self.scraper.item_path_pattern)
            .map_err(|e| PipelineError::Configuration(format!("item_path_pattern: {e}")))?;
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String, PipelineError> {
        match std::env::var(env_name) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(PipelineError::Configuration(format!(
                "Environment variable not set: {env_name}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API credentials resolved once per process.
pub struct Credentials {
    pub llm_api_key: SecretString,
    pub search_api_key: SecretString,
}

impl Credentials {
    /// Resolve both keys. A missing key aborts with a configuration error.
    pub fn resolve(cfg: &AppConfig) -> Result<Self, PipelineError> {
        let llm = AppConfig::resolve_env(&cfg.llm.api_key_env)?;
        let search = AppConfig::resolve_env(&cfg.search.api_key_env)?;
        Ok(Self {
            llm_api_key: SecretString::new(llm),
            search_api_key: SecretString::new(search),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"[REDACTED]")
            .field("search_api_key", &"[REDACTED]")
            .finish()
    }
}
