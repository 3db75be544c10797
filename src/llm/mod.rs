//! Reasoning-provider integration.
//!
//! Defines the `ReasoningProvider` trait used for item classification,
//! valuation synthesis and resale advice, and provides implementations for
//! the Anthropic Messages API and OpenRouter.

pub mod anthropic;
pub mod openrouter;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::config::LlmConfig;
use crate::types::PipelineError;

/// Image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PromptRequest {
    pub system: String,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
}

impl PromptRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Option<ImageAttachment>) -> Self {
        self.image = image;
        self
    }
}

/// Provider output for one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
    /// Approximate USD cost of the call.
    pub cost: f64,
}

/// Abstraction over text/vision reasoning providers.
///
/// Implementors send a prompt (optionally with an image) and return the
/// raw completion text; callers ask for JSON in the prompt and recover it
/// with [`complete_json`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn complete(&self, request: &PromptRequest) -> Result<Completion>;

    /// Model identifier string.
    fn model_name(&self) -> String;

    /// Successful calls so far.
    fn total_calls(&self) -> u64 {
        0
    }

    /// Approximate USD spent so far.
    fn cumulative_cost(&self) -> f64 {
        0.0
    }
}

/// Build the provider named in the configuration.
pub fn build_provider(cfg: &LlmConfig, api_key: SecretString) -> Result<Arc<dyn ReasoningProvider>> {
    let provider: Arc<dyn ReasoningProvider> = match cfg.provider.to_lowercase().as_str() {
        "anthropic" => Arc::new(anthropic::AnthropicClient::new(api_key, cfg)?),
        "openrouter" => Arc::new(openrouter::OpenRouterClient::new(api_key, cfg)?),
        other => {
            return Err(PipelineError::Configuration(format!("Unknown llm.provider: {other}")).into())
        }
    };
    Ok(provider)
}

/// Run a prompt and deserialise the JSON object in the reply.
pub async fn complete_json<T: DeserializeOwned>(
    provider: &dyn ReasoningProvider,
    request: &PromptRequest,
) -> Result<T> {
    let completion = provider.complete(request).await?;
    debug!(
        model = %provider.model_name(),
        tokens = completion.tokens_used,
        cost = format!("${:.4}", completion.cost),
        "Completion received"
    );
    parse_json_reply(&completion.text)
}

/// Deserialise the outermost JSON object found in free-form model text.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json_object(text)
        .ok_or_else(|| anyhow::anyhow!("No JSON object in model reply"))?;
    serde_json::from_str(json).context("Model reply JSON did not match the expected shape")
}

/// Locate the first balanced `{ ... }` in `text`, ignoring braces inside
/// string literals. Code fences and surrounding prose are skipped.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Cumulative cost stored as micro-dollars so it fits an atomic.
pub(crate) fn to_micro_dollars(cost: f64) -> u64 {
    (cost.max(0.0) * 1_000_000.0) as u64
}
