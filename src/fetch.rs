//! Fetch resilience layer.
//!
//! Every outbound request (auction pages, images, search queries and
//! reasoning-provider calls) goes through [`fetch_with_retry`]: each
//! attempt runs under its own deadline, a non-success status fails the
//! attempt before the body is read, and failed attempts wait a fixed
//! delay before retrying. Exhausting the retries yields a
//! [`PipelineError::Network`] scoped to that one URL.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::PipelineError;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Per-request timeout and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt, including reading the body.
    pub timeout: Duration,
    /// Re-attempts after the first failure.
    pub retries: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// Successful response body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedBody {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Run a request with per-attempt timeout and fixed-delay retries.
///
/// `build` is called once per attempt because a `RequestBuilder` is
/// consumed by `send`.
pub async fn fetch_with_retry<F>(
    url: &str,
    policy: &RetryPolicy,
    build: F,
) -> Result<FetchedBody, PipelineError>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.attempts();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            debug!(url, attempt, delay_ms = policy.delay.as_millis() as u64, "Retrying request");
            tokio::time::sleep(policy.delay).await;
        }

        match tokio::time::timeout(policy.timeout, attempt_once(build())).await {
            Ok(Ok(body)) => return Ok(body),
            Ok(Err(e)) => {
                warn!(url, attempt, error = %e, "Request failed");
                last_error = e;
            }
            Err(_) => {
                warn!(url, attempt, timeout_ms = policy.timeout.as_millis() as u64, "Request timed out");
                last_error = format!("timed out after {}ms", policy.timeout.as_millis());
            }
        }
    }

    Err(PipelineError::Network {
        url: url.to_string(),
        attempts,
        message: last_error,
    })
}

async fn attempt_once(request: RequestBuilder) -> Result<FetchedBody, String> {
    let response = request.send().await.map_err(|e| format!("request error: {}", e.without_url()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("body read error: {}", e.without_url()))?;

    Ok(FetchedBody {
        bytes: bytes.to_vec(),
        content_type,
    })
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Shared HTTP client bound to one retry policy, used for plain GETs.
#[derive(Clone)]
pub struct Fetcher {
    http: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(policy: RetryPolicy, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build fetch HTTP client")?;
        Ok(Self { http, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn client(&self) -> &Client {
        &self.http
    }

    /// GET a page as text.
    pub async fn get_text(&self, url: &str) -> Result<String, PipelineError> {
        let body = self.get_bytes(url).await?;
        Ok(body.text())
    }

    /// GET raw bytes (images).
    pub async fn get_bytes(&self, url: &str) -> Result<FetchedBody, PipelineError> {
        fetch_with_retry(url, &self.policy, || self.http.get(url)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
