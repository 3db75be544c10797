//! BIDSCOUT: auction discovery, item valuation and bid-ceiling analysis.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! scrapes the configured auction site (or one auction given on the
//! command line), analyses every item and prints the ranked results as
//! JSON on stdout.

use anyhow::{Context, Result};
use chrono::{Duration, Local};
use tracing::{info, warn};

use bidscout::auction::{AuctionScraper, ScrapeRequest};
use bidscout::config::{self, Credentials};
use bidscout::engine::{AnalysisRequest, Analyzer};

const BANNER: &str = r#"
 ____ ___ ____  ____   ____ ___  _   _ _____
| __ )_ _|  _ \/ ___| / ___/ _ \| | | |_   _|
|  _ \| || | | \___ \| |  | | | | | | | | |
| |_) | || |_| |___) | |__| |_| | |_| | | |
|____/___|____/|____/ \____\___/ \___/  |_|

  Auction discovery and bid-ceiling analysis
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::var("BIDSCOUT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    eprintln!("{BANNER}");

    // Credentials first: a missing key aborts before any scraping.
    let credentials = Credentials::resolve(&cfg)?;
    let analyzer = Analyzer::with_credentials(&cfg, credentials)?;
    let scraper = AuctionScraper::new(&cfg.scraper)?;

    let auction_url = std::env::args().nth(1);
    let today = Local::now().date_naive();
    let request = ScrapeRequest {
        max_items: cfg.scraper.max_items,
        start_date: today,
        end_date: today + Duration::days(cfg.scraper.days_ahead.max(0)),
        auction_url,
    };
    info!(
        start = %request.start_date,
        end = %request.end_date,
        auction = ?request.auction_url,
        max_items = request.max_items,
        "BIDSCOUT starting"
    );

    let scraped = scraper.scrape(&request).await.context("Scrape failed")?;
    if scraped.items.is_empty() {
        warn!("No items found, nothing to analyse");
    }
    if scraped.total_count > scraped.items.len() {
        info!(
            total = scraped.total_count,
            kept = scraped.items.len(),
            "Item cap reached, extra items dropped"
        );
    }

    let report = analyzer
        .analyze(&AnalysisRequest::from_config(&cfg.analysis, scraped.items))
        .await?;

    let (llm_calls, llm_cost) = analyzer.llm_usage();
    info!(
        summary = %report.summary,
        llm_calls,
        llm_cost = format!("${llm_cost:.4}"),
        "BIDSCOUT finished"
    );
    for item in report.items.iter().filter(|r| r.meets_criteria) {
        info!(
            title = %item.item.title,
            current_bid = item.item.current_bid,
            max_bid = item.profit.max_bid,
            expected_profit = item.profit.expected_profit,
            channel = %item.advice.recommended_channel,
            "Profitable item"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Initialise the tracing subscriber with env-filter support.
///
/// Set `RUST_LOG=bidscout=debug` for verbose output, or
/// `BIDSCOUT_LOG_JSON=1` for machine-readable logs. Logs go to stderr so
/// stdout carries only the JSON report.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bidscout=info"));

    let json_logging = std::env::var("BIDSCOUT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
