//! Structured item parser.
//!
//! Turns raw listing records into [`NormalizedItem`]s with one classification
//! call per record. Records are processed in fixed-size batches (calls in a
//! batch run concurrently) with a pause between batches for provider rate
//! limits. After classification two deterministic rules apply:
//!
//! - the exclusion denylist overrides a permissive classifier verdict;
//! - interest level comes from the extracted bid/bidder counts only.
//!
//! A record whose classification fails is dropped and counted as an error.

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::fetch::Fetcher;
use crate::llm::{parse_json_reply, ImageAttachment, PromptRequest, ReasoningProvider};
use crate::strategy::{denylisted_keyword, interest_level};
use crate::types::{NormalizedItem, PipelineError, RawItemRecord, SizeClass};

/// Title length used when the classifier returns none.
const FALLBACK_TITLE_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Classifier reply
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Classification {
    title: Option<String>,
    description: Option<String>,
    current_bid: Option<f64>,
    category: Option<String>,
    condition: Option<String>,
    size_class: Option<String>,
    shipping_available: Option<bool>,
    excluded: Option<bool>,
    exclusion_reason: Option<String>,
}

/// Items produced by one parse run.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub items: Vec<NormalizedItem>,
    /// Records dropped because classification failed.
    pub errors: usize,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct ItemParser {
    provider: Arc<dyn ReasoningProvider>,
    /// Fetches item photos; `None` disables image attachment.
    images: Option<Fetcher>,
    batch_size: usize,
    batch_pause: Duration,
}

impl ItemParser {
    pub fn new(
        provider: Arc<dyn ReasoningProvider>,
        images: Option<Fetcher>,
        batch_size: usize,
        batch_pause: Duration,
    ) -> Self {
        Self {
            provider,
            images,
            batch_size: batch_size.max(1),
            batch_pause,
        }
    }

    /// Classify every record, batch by batch.
    pub async fn parse_all(&self, records: &[RawItemRecord]) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let batches = records.len().div_ceil(self.batch_size);

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            debug!(batch = index + 1, of = batches, size = batch.len(), "Classifying batch");

            let results = join_all(batch.iter().map(|record| self.parse_one(record))).await;
            for result in results {
                match result {
                    Ok(item) => outcome.items.push(item),
                    Err(e) => {
                        warn!(error = %e, "Classification failed, dropping item");
                        outcome.errors += 1;
                    }
                }
            }
        }

        info!(
            records = records.len(),
            parsed = outcome.items.len(),
            errors = outcome.errors,
            "Item parsing complete"
        );
        outcome
    }

    /// Classify one record.
    pub async fn parse_one(&self, record: &RawItemRecord) -> Result<NormalizedItem, PipelineError> {
        let image = self.fetch_image(record).await;
        let request = PromptRequest::new(Self::system_prompt(), Self::build_prompt(record)).with_image(image);

        let label = record.dedup_key();
        let classification_error = |message: String| PipelineError::Classification {
            item: label.chars().take(100).collect(),
            message,
        };

        let completion = self
            .provider
            .complete(&request)
            .await
            .map_err(|e| classification_error(format!("{e:#}")))?;
        let reply: Classification =
            parse_json_reply(&completion.text).map_err(|e| classification_error(format!("{e:#}")))?;

        Ok(Self::normalize(record, reply))
    }

    /// Attach the item photo when enabled. Any failure falls back to text only.
    async fn fetch_image(&self, record: &RawItemRecord) -> Option<ImageAttachment> {
        let fetcher = self.images.as_ref()?;
        let url = record.image_url.as_deref()?;

        match fetcher.get_bytes(url).await {
            Ok(body) if !body.bytes.is_empty() => Some(ImageAttachment {
                media_type: image_media_type(body.content_type.as_deref(), url),
                data: body.bytes,
            }),
            Ok(_) => {
                warn!(url, "Empty image body, classifying from text only");
                None
            }
            Err(e) => {
                warn!(url, error = %e, "Image fetch failed, classifying from text only");
                None
            }
        }
    }

    /// Merge the classifier reply with what the extractor already knows.
    fn normalize(record: &RawItemRecord, reply: Classification) -> NormalizedItem {
        let title = reply
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title(&record.text));
        let category = reply.category.unwrap_or_default().trim().to_string();

        // A zero from the classifier loses to a positive extracted bid.
        let classified_bid = reply.current_bid.filter(|b| b.is_finite()).unwrap_or(0.0).max(0.0);
        let extracted_bid = record.current_bid.unwrap_or(0.0).max(0.0);
        let current_bid = if classified_bid <= 0.0 && extracted_bid > 0.0 {
            extracted_bid
        } else {
            classified_bid
        };

        let size_class = reply
            .size_class
            .as_deref()
            .and_then(|s| s.parse::<SizeClass>().ok())
            .unwrap_or_default();

        let mut excluded = reply.excluded.unwrap_or(false);
        let mut exclusion_reason = reply.exclusion_reason.filter(|r| !r.trim().is_empty());
        if !excluded {
            if let Some(keyword) = denylisted_keyword(&category, &title) {
                debug!(title = %title, keyword = %keyword, "Denylist override");
                excluded = true;
                exclusion_reason = Some(format!("Denylisted keyword: {keyword}"));
            }
        }
        if !excluded {
            exclusion_reason = None;
        }

        NormalizedItem {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description: reply.description.unwrap_or_default(),
            current_bid,
            category,
            condition: reply.condition.unwrap_or_else(|| "unknown".to_string()),
            size_class,
            auction_url: record.url.clone().unwrap_or_default(),
            image_url: record.image_url.clone(),
            shipping_available: reply.shipping_available.unwrap_or(false),
            excluded,
            exclusion_reason,
            auction_end: record.auction_end.clone(),
            bid_count: record.bid_count,
            bidder_count: record.bidder_count,
            interest_level: interest_level(record.bid_count, record.bidder_count),
        }
    }

    pub fn system_prompt() -> &'static str {
        "You classify items listed in online liquidation auctions for a reseller.\n\n\
         Reply with a single JSON object and nothing else, using exactly these keys:\n\
         {\"title\": string, \"description\": string, \"current_bid\": number, \
         \"category\": string, \"condition\": string, \
         \"size_class\": \"small\" | \"medium\" | \"large\" | \"oversized\", \
         \"shipping_available\": boolean, \"excluded\": boolean, \
         \"exclusion_reason\": string | null}\n\n\
         RULES:\n\
         1. size_class is the shipping size: small fits a padded mailer or shoebox, \
            medium a standard box, large needs a big box, oversized ships freight.\n\
         2. current_bid is the bid shown in the listing in dollars, 0 if none.\n\
         3. Set excluded=true for vehicles, real estate, firearms, bullion or coins, \
            heavy/farm/industrial equipment, and anything illegal to resell, with a reason.\n\
         4. condition is a short phrase such as \"new\", \"used - good\", \"for parts\"."
    }

    pub fn build_prompt(record: &RawItemRecord) -> String {
        let mut prompt = String::with_capacity(record.text.len() + 256);
        prompt.push_str("LISTING TEXT:\n");
        prompt.push_str(&record.text);
        prompt.push('\n');

        if let Some(url) = &record.url {
            prompt.push_str(&format!("URL: {url}\n"));
        }
        if let Some(bid) = record.current_bid {
            prompt.push_str(&format!("EXTRACTED CURRENT BID: ${bid:.2}\n"));
        }
        if let Some(end) = &record.auction_end {
            prompt.push_str(&format!("AUCTION ENDS: {end}\n"));
        }
        prompt.push_str("\nClassify this item.\n");
        prompt
    }
}

/// First segment of the text blob, shortened.
fn fallback_title(text: &str) -> String {
    let head = text.split(" | ").next().unwrap_or(text).trim();
    head.chars().take(FALLBACK_TITLE_CHARS).collect()
}

/// Media type from the response header, else from the file extension.
fn image_media_type(content_type: Option<&str>, url: &str) -> String {
    if let Some(ct) = content_type {
        let mime = ct.split(';').next().unwrap_or(ct).trim().to_lowercase();
        if mime.starts_with("image/") {
            return mime;
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    let media_type = if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    };
    media_type.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use crate::llm::{Completion, MockReasoningProvider};
    use crate::types::InterestLevel;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(text: &str, bid: Option<f64>) -> RawItemRecord {
        RawItemRecord {
            text: text.to_string(),
            url: Some(format!("https://auctions.example.com/item/{}", text.len())),
            current_bid: bid,
            bid_count: Some(6),
            bidder_count: Some(2),
            auction_end: Some("2026-03-14 19:00".into()),
            ..Default::default()
        }
    }

    fn reply(json: &str) -> anyhow::Result<Completion> {
        Ok(Completion {
            text: json.to_string(),
            tokens_used: 100,
            cost: 0.001,
        })
    }

    fn parser(mock: MockReasoningProvider, batch_size: usize) -> ItemParser {
        ItemParser::new(Arc::new(mock), None, batch_size, Duration::ZERO)
    }

    const MIXER: &str = r#"{"title":"KitchenAid Mixer","description":"Tilt-head","current_bid":0,
        "category":"Kitchen","condition":"used - good","size_class":"medium",
        "shipping_available":true,"excluded":false,"exclusion_reason":null}"#;

    #[tokio::test]
    async fn test_extracted_bid_wins_over_zero() {
        let mut mock = MockReasoningProvider::new();
        mock.expect_complete().returning(|_| reply(MIXER));

        let item = parser(mock, 5)
            .parse_one(&record("KitchenAid Mixer | Current Bid: $40", Some(40.0)))
            .await
            .unwrap();

        assert_eq!(item.current_bid, 40.0);
        assert_eq!(item.title, "KitchenAid Mixer");
        assert_eq!(item.size_class, SizeClass::Medium);
        assert!(item.shipping_available);
        assert!(!item.excluded);
        assert_eq!(item.exclusion_reason, None);
        assert_eq!(item.interest_level, InterestLevel::High);
        assert_eq!(item.auction_end.as_deref(), Some("2026-03-14 19:00"));
        assert!(!item.id.is_empty());
    }

    #[tokio::test]
    async fn test_classifier_bid_kept_when_positive() {
        let mut mock = MockReasoningProvider::new();
        mock.expect_complete()
            .returning(|_| reply(r#"{"title":"Lamp","current_bid":12.5,"size_class":"small"}"#));
        let item = parser(mock, 5).parse_one(&record("Lamp", Some(10.0))).await.unwrap();
        assert_eq!(item.current_bid, 12.5);
        assert_eq!(item.size_class, SizeClass::Small);
    }

    #[tokio::test]
    async fn test_denylist_overrides_permissive_classifier() {
        let mut mock = MockReasoningProvider::new();
        mock.expect_complete().returning(|_| {
            reply(r#"{"title":"John Deere Tractor","category":"Outdoor","excluded":false}"#)
        });
        let item = parser(mock, 5).parse_one(&record("John Deere Tractor", None)).await.unwrap();
        assert!(item.excluded);
        assert_eq!(item.exclusion_reason.as_deref(), Some("Denylisted keyword: tractor"));
    }

    #[tokio::test]
    async fn test_classifier_exclusion_is_kept() {
        let mut mock = MockReasoningProvider::new();
        mock.expect_complete().returning(|_| {
            reply(r#"{"title":"Prescription meds","excluded":true,"exclusion_reason":"Regulated"}"#)
        });
        let item = parser(mock, 5).parse_one(&record("meds", None)).await.unwrap();
        assert!(item.excluded);
        assert_eq!(item.exclusion_reason.as_deref(), Some("Regulated"));
    }

    #[tokio::test]
    async fn test_missing_title_and_unknown_size_fall_back() {
        let mut mock = MockReasoningProvider::new();
        mock.expect_complete()
            .returning(|_| reply(r#"{"category":"Audio","size_class":"gigantic"}"#));
        let item = parser(mock, 5)
            .parse_one(&record("Bose Speaker | Current Bid: $55", None))
            .await
            .unwrap();
        assert_eq!(item.title, "Bose Speaker");
        assert_eq!(item.size_class, SizeClass::Medium);
        assert_eq!(item.current_bid, 0.0);
    }

    #[tokio::test]
    async fn test_failures_are_dropped_and_counted() {
        let mut mock = MockReasoningProvider::new();
        mock.expect_complete().times(5).returning(|request: &PromptRequest| {
            if request.prompt.contains("bad") {
                Err(anyhow::anyhow!("provider down"))
            } else if request.prompt.contains("garbled") {
                reply("I cannot help with that")
            } else {
                reply(MIXER)
            }
        });

        let records = vec![
            record("one", None),
            record("bad", None),
            record("three", None),
            record("garbled", None),
            record("five", None),
        ];
        let outcome = parser(mock, 2).parse_all(&records).await;
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.errors, 2);
    }

    #[tokio::test]
    async fn test_image_attached_when_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, 0x50], "image/png"))
            .mount(&server)
            .await;

        let mut mock = MockReasoningProvider::new();
        mock.expect_complete()
            .withf(|r: &PromptRequest| {
                r.image.as_ref().map(|i| (i.media_type.as_str(), i.data.len())) == Some(("image/png", 2))
            })
            .times(1)
            .returning(|_| reply(MIXER));

        let policy = RetryPolicy {
            timeout: Duration::from_millis(500),
            retries: 0,
            delay: Duration::from_millis(1),
        };
        let parser = ItemParser::new(
            Arc::new(mock),
            Some(Fetcher::new(policy, "test").unwrap()),
            5,
            Duration::ZERO,
        );
        let mut rec = record("Mixer", None);
        rec.image_url = Some(format!("{}/photos/1.png", server.uri()));
        assert!(parser.parse_one(&rec).await.is_ok());
    }

    #[tokio::test]
    async fn test_image_failure_degrades_to_text_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut mock = MockReasoningProvider::new();
        mock.expect_complete()
            .withf(|r: &PromptRequest| r.image.is_none())
            .times(1)
            .returning(|_| reply(MIXER));

        let policy = RetryPolicy {
            timeout: Duration::from_millis(500),
            retries: 0,
            delay: Duration::from_millis(1),
        };
        let parser = ItemParser::new(
            Arc::new(mock),
            Some(Fetcher::new(policy, "test").unwrap()),
            5,
            Duration::ZERO,
        );
        let mut rec = record("Mixer", None);
        rec.image_url = Some(format!("{}/missing.jpg", server.uri()));
        assert!(parser.parse_one(&rec).await.is_ok());
    }

    #[test]
    fn test_prompt_contains_extracted_fields() {
        let prompt = ItemParser::build_prompt(&record("Dyson V8", Some(40.0)));
        assert!(prompt.contains("Dyson V8"));
        assert!(prompt.contains("$40.00"));
        assert!(prompt.contains("2026-03-14 19:00"));
        assert!(ItemParser::system_prompt().contains("size_class"));
    }

    #[test]
    fn test_image_media_type() {
        assert_eq!(image_media_type(Some("image/webp; charset=binary"), "x"), "image/webp");
        assert_eq!(image_media_type(Some("application/octet-stream"), "a/b.PNG?w=200"), "image/png");
        assert_eq!(image_media_type(None, "a/b"), "image/jpeg");
    }
}
