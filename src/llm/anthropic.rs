//! Anthropic Claude integration.
//!
//! Implements `ReasoningProvider` using the Anthropic Messages API.
//! Images are sent as base64 content blocks ahead of the text prompt.
//! Requests go through the shared fetch layer for timeout and retry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{to_micro_dollars, Completion, PromptRequest, ReasoningProvider};
use crate::config::LlmConfig;
use crate::fetch::{fetch_with_retry, RetryPolicy};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Approximate cost per 1K input tokens (Sonnet).
const INPUT_COST_PER_1K: f64 = 0.003;
/// Approximate cost per 1K output tokens (Sonnet).
const OUTPUT_COST_PER_1K: f64 = 0.015;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RequestBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    max_tokens: u32,
    policy: RetryPolicy,
    total_cost: AtomicU64, // stored as cost * 1_000_000
    total_calls: AtomicU64,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, cfg: &LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key,
            endpoint: ANTHROPIC_API_URL.to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            policy: cfg.retry_policy(),
            total_cost: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    /// Point the client at a different Messages endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request(&self, request: &PromptRequest) -> MessagesRequest {
        let mut content = Vec::with_capacity(2);
        if let Some(image) = &request.image {
            content.push(RequestBlock::Image {
                source: ImageSource {
                    source_type: "base64",
                    media_type: image.media_type.clone(),
                    data: BASE64.encode(&image.data),
                },
            });
        }
        content.push(RequestBlock::Text {
            text: request.prompt.clone(),
        });

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message { role: "user", content }],
            system: Some(request.system.clone()).filter(|s| !s.is_empty()),
        }
    }
}

#[async_trait]
impl ReasoningProvider for AnthropicClient {
    async fn complete(&self, request: &PromptRequest) -> Result<Completion> {
        let body = self.build_request(request);

        debug!(
            model = %self.model,
            image = request.image.is_some(),
            "Sending Anthropic request"
        );

        let response = fetch_with_retry(&self.endpoint, &self.policy, || {
            self.http
                .post(&self.endpoint)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
        })
        .await?;

        let parsed: MessagesResponse = serde_json::from_slice(&response.bytes)
            .context("Failed to parse Anthropic response")?;

        let text = parsed
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed.usage.unwrap_or_default();
        let tokens_used = usage.input_tokens + usage.output_tokens;
        let cost = (usage.input_tokens as f64 / 1000.0) * INPUT_COST_PER_1K
            + (usage.output_tokens as f64 / 1000.0) * OUTPUT_COST_PER_1K;

        self.total_cost.fetch_add(to_micro_dollars(cost), Ordering::Relaxed);
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        Ok(Completion {
            text,
            tokens_used,
            cost,
        })
    }

    fn model_name(&self) -> String {
        self.model.clone()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AnthropicClient {
        let cfg = LlmConfig {
            retries: 1,
            retry_delay_ms: 10,
            ..Default::default()
        };
        AnthropicClient::new(SecretString::new("sk-test".into()), &cfg)
            .unwrap()
            .with_endpoint(format!("{}/v1/messages", server.uri()))
    }

    fn reply() -> serde_json::Value {
        serde_json::json!({
            "content": [{"type": "text", "text": "{\"category\":"}, {"type": "text", "text": "\"Tools\"}"}],
            "usage": {"input_tokens": 1000, "output_tokens": 1000}
        })
    }

    #[test]
    fn test_request_serialization_with_image() {
        let cfg = LlmConfig::default();
        let client = AnthropicClient::new(SecretString::new("k".into()), &cfg).unwrap();
        let request = PromptRequest::new("sys", "describe").with_image(Some(ImageAttachment {
            media_type: "image/png".into(),
            data: vec![1, 2, 3],
        }));

        let json = serde_json::to_value(client.build_request(&request)).unwrap();
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "AQID");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "describe");
        assert_eq!(json["system"], "sys");
    }

    #[test]
    fn test_empty_system_is_omitted() {
        let client = AnthropicClient::new(SecretString::new("k".into()), &LlmConfig::default()).unwrap();
        let json = serde_json::to_value(client.build_request(&PromptRequest::new("", "hi"))).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_joins_text_and_tracks_cost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({"model": "claude-sonnet-4-20250514"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let completion = client.complete(&PromptRequest::new("s", "p")).await.unwrap();

        assert_eq!(completion.text, r#"{"category":"Tools"}"#);
        assert_eq!(completion.tokens_used, 2000);
        assert!((completion.cost - 0.018).abs() < 1e-9);
        assert_eq!(client.total_calls(), 1);
        assert!((client.cumulative_cost() - 0.018).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_delay(Duration::from_millis(1)))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.complete(&PromptRequest::new("s", "p")).await.is_err());
        assert_eq!(client.total_calls(), 0);
    }

    #[test]
    fn test_model_name() {
        let cfg = LlmConfig {
            model: "claude-test".into(),
            ..Default::default()
        };
        let client = AnthropicClient::new(SecretString::new("k".into()), &cfg).unwrap();
        assert_eq!(client.model_name(), "claude-test");
    }
}
