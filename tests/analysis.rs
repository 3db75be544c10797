//! Batch analysis integration tests with deterministic in-process
//! providers.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bidscout::config::AppConfig;
use bidscout::data::{SearchProvider, SearchSnippet};
use bidscout::engine::advisor::ResaleAdvisor;
use bidscout::engine::parser::ItemParser;
use bidscout::engine::valuation::ValuationEngine;
use bidscout::engine::{AnalysisRequest, Analyzer};
use bidscout::fetch::{Fetcher, RetryPolicy};
use bidscout::llm::{Completion, PromptRequest, ReasoningProvider};
use bidscout::types::{PipelineError, RawItemRecord, RiskScore, SizeClass};

/// Answers by prompt kind. Listing text carries the test fixture:
/// `"<title> ~ <value> ~ <size>"`.
struct ScriptedReasoner {
    images_seen: AtomicUsize,
}

impl ScriptedReasoner {
    fn new() -> Self {
        Self {
            images_seen: AtomicUsize::new(0),
        }
    }

    /// `(line, title, value, size)` from the first fixture line in a prompt.
    fn fixture(prompt: &str) -> Option<(String, String, f64, String)> {
        let line = prompt.lines().find(|l| l.contains(" ~ "))?;
        let line = line.trim_start_matches("ITEM: ").trim_matches('"');
        let mut parts = line.split(" ~ ").map(str::trim);
        let title = parts.next()?.to_string();
        let value = parts.next()?.parse().ok()?;
        let size = parts.next()?.to_string();
        Some((line.to_string(), title, value, size))
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedReasoner {
    async fn complete(&self, request: &PromptRequest) -> Result<Completion> {
        if request.image.is_some() {
            self.images_seen.fetch_add(1, Ordering::SeqCst);
        }

        let text = if request.system == ItemParser::system_prompt() {
            let (line, title, _, size) = Self::fixture(&request.prompt)
                .ok_or_else(|| anyhow::anyhow!("unreadable listing"))?;
            // The fixture line becomes the title so later prompts carry it.
            serde_json::json!({
                "title": line,
                "category": if title.contains("Rifle") { "Sporting Goods" } else { "Household" },
                "condition": "used",
                "size_class": size,
                "current_bid": 0,
                "shipping_available": true,
                "excluded": false
            })
            .to_string()
        } else if request.system == ValuationEngine::system_prompt() {
            let (_, _, value, _) = Self::fixture(&request.prompt)
                .ok_or_else(|| anyhow::anyhow!("no fixture in valuation prompt"))?;
            if value < 0.0 {
                anyhow::bail!("synthesis unavailable");
            }
            serde_json::json!({
                "estimated_value": value,
                "low_estimate": value * 0.8,
                "high_estimate": value * 1.2,
                "confidence": "medium",
                "sources": ["https://market.example/sold/1"],
                "reasoning": "Comparable sold listings"
            })
            .to_string()
        } else if request.system == ResaleAdvisor::system_prompt() {
            "Here you go:\n```json\n{\"recommended_channel\":\"Mercari\",\"risk_score\":\"high\",\"tips\":[\"Ship insured\"]}\n```"
                .to_string()
        } else {
            anyhow::bail!("unexpected prompt");
        };

        Ok(Completion {
            text,
            tokens_used: 10,
            cost: 0.0,
        })
    }

    fn model_name(&self) -> String {
        "scripted".to_string()
    }
}

struct StaticSearch;

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchSnippet>> {
        Ok((0..limit.min(2))
            .map(|i| SearchSnippet {
                title: format!("{query} #{i}"),
                link: format!("https://market.example/{}/{i}", query.len()),
                snippet: "Sold for a fair price".to_string(),
            })
            .collect())
    }
}

fn raw(title: &str, value: f64, size: &str, bid: f64) -> RawItemRecord {
    RawItemRecord {
        text: format!("{title} ~ {value} ~ {size}"),
        url: Some(format!("https://auctions.example.com/item/{}", title.len())),
        current_bid: Some(bid),
        bid_count: Some(6),
        bidder_count: Some(2),
        ..Default::default()
    }
}

fn config(concurrency: usize) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.analysis.item_concurrency = concurrency;
    cfg.analysis.batch_size = 2;
    cfg.analysis.batch_pause_ms = 0;
    cfg
}

fn request(items: Vec<RawItemRecord>) -> AnalysisRequest {
    AnalysisRequest {
        min_dollar_profit: 20.0,
        min_roi_pct: 30.0,
        fee_rate: 0.13,
        items,
        category_allow_list: None,
    }
}

#[tokio::test]
async fn test_batch_analysis_ranks_and_flags_items() {
    let reasoner = Arc::new(ScriptedReasoner::new());
    let analyzer = Analyzer::with_providers(&config(2), reasoner.clone(), Arc::new(StaticSearch), None);

    let report = analyzer
        .analyze(&request(vec![
            raw("Stand Mixer", 150.0, "medium", 40.0),
            raw("Espresso Machine", 400.0, "medium", 350.0),
            raw("Hunting Rifle", 600.0, "large", 10.0),
            raw("Desk Lamp", 30.0, "small", 2.0),
            raw("Broken Synth", -1.0, "small", 5.0),
            RawItemRecord {
                text: "no fixture here".to_string(),
                ..Default::default()
            },
        ]))
        .await
        .unwrap();

    // Rifle excluded by the denylist; synth fails valuation; last record
    // fails classification.
    assert_eq!(report.summary.scraped, 6);
    assert_eq!(report.summary.analyzed, 3);
    assert_eq!(report.summary.errors, 2);
    assert_eq!(report.summary.profitable, 1);

    let profits: Vec<f64> = report.items.iter().map(|r| r.profit.expected_profit).collect();
    assert!(profits.windows(2).all(|w| w[0] >= w[1]), "{profits:?}");

    let mixer = report
        .items
        .iter()
        .find(|r| r.item.title.starts_with("Stand Mixer"))
        .unwrap();
    assert_eq!(mixer.item.current_bid, 40.0);
    assert_eq!(mixer.item.size_class, SizeClass::Medium);
    assert_eq!(mixer.profit.max_bid, 80.77);
    assert!(mixer.meets_criteria);
    assert_eq!(mixer.advice.recommended_channel, "Mercari");
    assert_eq!(mixer.advice.risk_score, RiskScore::High);

    // Bid already past the ceiling.
    let espresso = report
        .items
        .iter()
        .find(|r| r.item.title.starts_with("Espresso"))
        .unwrap();
    assert!(espresso.item.current_bid > espresso.profit.max_bid);
    assert!(!espresso.meets_criteria);
}

#[tokio::test]
async fn test_allow_list_limits_categories() {
    let analyzer = Analyzer::with_providers(
        &config(3),
        Arc::new(ScriptedReasoner::new()),
        Arc::new(StaticSearch),
        None,
    );
    let mut req = request(vec![raw("Stand Mixer", 150.0, "medium", 40.0)]);
    req.category_allow_list = Some(vec!["electronics".to_string()]);

    let report = analyzer.analyze(&req).await.unwrap();
    assert_eq!(report.summary.scraped, 1);
    assert_eq!(report.summary.analyzed, 0);
    assert_eq!(report.summary.errors, 0);
}

#[tokio::test]
async fn test_image_attached_when_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/1.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]),
        )
        .mount(&server)
        .await;

    let reasoner = Arc::new(ScriptedReasoner::new());
    let policy = RetryPolicy {
        timeout: Duration::from_secs(2),
        retries: 0,
        delay: Duration::ZERO,
    };
    let fetcher = Fetcher::new(policy, "bidscout-test").unwrap();
    let analyzer = Analyzer::with_providers(&config(1), reasoner.clone(), Arc::new(StaticSearch), Some(fetcher));

    let mut with_photo = raw("Stand Mixer", 150.0, "medium", 40.0);
    with_photo.image_url = Some(format!("{}/photos/1.jpg", server.uri()));
    // A missing photo downgrades to a text-only call.
    let mut missing_photo = raw("Desk Lamp", 30.0, "small", 2.0);
    missing_photo.image_url = Some(format!("{}/photos/missing.jpg", server.uri()));

    let report = analyzer.analyze(&request(vec![with_photo, missing_photo])).await.unwrap();
    assert_eq!(report.summary.analyzed, 2);
    assert_eq!(report.summary.errors, 0);
    assert_eq!(reasoner.images_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_credentials_abort_before_work() {
    let mut cfg = AppConfig::default();
    cfg.llm.api_key_env = "BIDSCOUT_IT_UNSET_LLM_KEY_71C4".to_string();
    cfg.search.api_key_env = "BIDSCOUT_IT_UNSET_SEARCH_KEY_71C4".to_string();

    let err = Analyzer::from_config(&cfg).err().expect("missing keys must fail");
    let pipeline = err.downcast_ref::<PipelineError>().expect("typed error");
    assert!(matches!(pipeline, PipelineError::Configuration(_)));
}
