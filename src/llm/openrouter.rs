//! OpenRouter integration.
//!
//! Routes calls through OpenRouter's unified API using the OpenAI-compatible
//! chat completions format. Images travel as `data:` URLs. When a fallback
//! model is configured it is tried once the primary exhausts its retries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{to_micro_dollars, Completion, PromptRequest, ReasoningProvider};
use crate::config::LlmConfig;
use crate::fetch::{fetch_with_retry, RetryPolicy};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

// ---------------------------------------------------------------------------
// Cost tables (approximate per-1K-token pricing via OpenRouter)
// ---------------------------------------------------------------------------

/// Returns (input_cost_per_1k, output_cost_per_1k) for known models.
fn model_costs(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("claude") && m.contains("sonnet") => (0.003, 0.015),
        m if m.contains("claude") && m.contains("opus") => (0.015, 0.075),
        m if m.contains("claude") && m.contains("haiku") => (0.0008, 0.004),
        m if m.contains("gpt-4o-mini") => (0.00015, 0.0006),
        m if m.contains("gpt-4o") => (0.005, 0.015),
        m if m.contains("gemini") && m.contains("flash") => (0.0003, 0.0025),
        // Conservative default
        _ => (0.005, 0.015),
    }
}

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterClient {
    http: Client,
    api_key: SecretString,
    endpoint: String,
    primary_model: String,
    fallback_model: Option<String>,
    max_tokens: u32,
    policy: RetryPolicy,
    total_cost: AtomicU64, // stored as cost * 1_000_000
    total_calls: AtomicU64,
}

impl OpenRouterClient {
    pub fn new(api_key: SecretString, cfg: &LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            endpoint: OPENROUTER_API_URL.to_string(),
            primary_model: cfg.model.clone(),
            fallback_model: cfg.fallback_model.clone().filter(|m| !m.is_empty()),
            max_tokens: cfg.max_tokens,
            policy: cfg.retry_policy(),
            total_cost: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request<'a>(&self, model: &'a str, request: &PromptRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: vec![ContentPart::Text {
                    text: request.system.clone(),
                }],
            });
        }

        let mut user = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        if let Some(image) = &request.image {
            user.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", image.media_type, BASE64.encode(&image.data)),
                },
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        ChatRequest {
            model,
            max_tokens: self.max_tokens,
            messages,
        }
    }

    /// One model, with the fetch layer's retry policy.
    async fn call_model(&self, model: &str, request: &PromptRequest) -> Result<Completion> {
        let body = self.build_request(model, request);
        debug!(model, image = request.image.is_some(), "Sending OpenRouter request");

        let response = fetch_with_retry(&self.endpoint, &self.policy, || {
            self.http
                .post(&self.endpoint)
                .header(
                    "Authorization",
                    format!("Bearer {}", self.api_key.expose_secret()),
                )
                .header("Content-Type", "application/json")
                .header("X-Title", "BIDSCOUT")
                .json(&body)
        })
        .await?;

        let parsed: ChatResponse = serde_json::from_slice(&response.bytes)
            .context("Failed to parse OpenRouter response")?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let usage = parsed.usage.unwrap_or_default();

        // Use the actual model returned (may differ from requested)
        let actual_model = parsed.model.as_deref().unwrap_or(model);
        let (input_cost, output_cost) = model_costs(actual_model);
        let cost = (usage.prompt_tokens as f64 / 1000.0) * input_cost
            + (usage.completion_tokens as f64 / 1000.0) * output_cost;

        self.total_cost.fetch_add(to_micro_dollars(cost), Ordering::Relaxed);
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        Ok(Completion {
            text,
            tokens_used: usage.prompt_tokens + usage.completion_tokens,
            cost,
        })
    }
}

#[async_trait]
impl ReasoningProvider for OpenRouterClient {
    async fn complete(&self, request: &PromptRequest) -> Result<Completion> {
        match self.call_model(&self.primary_model, request).await {
            Ok(completion) => Ok(completion),
            Err(primary_err) => match &self.fallback_model {
                Some(fallback) => {
                    warn!(
                        primary = %self.primary_model,
                        fallback = %fallback,
                        error = %primary_err,
                        "Primary model failed, falling back"
                    );
                    self.call_model(fallback, request).await.with_context(|| {
                        format!(
                            "Both primary ({}) and fallback ({}) models failed. Primary error: {}",
                            self.primary_model, fallback, primary_err
                        )
                    })
                }
                None => Err(primary_err),
            },
        }
    }

    fn model_name(&self) -> String {
        self.primary_model.clone()
    }

    fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn cumulative_cost(&self) -> f64 {
        self.total_cost.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
