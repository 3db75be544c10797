//! Auction discovery and listing extraction.
//!
//! [`AuctionScraper::scrape`] is the acquisition entry point. It runs in
//! one of two modes:
//!
//! - **Discovery**: find auctions closing inside the date window, then
//!   fetch and extract each auction page with bounded parallelism.
//! - **Single auction**: try several "show all" query variants of one URL,
//!   keep the variant that yields the most items, then walk numbered pages.
//!
//! Either way records are deduplicated and capped at `max_items`.

pub mod discovery;
pub mod end_time;
pub mod extractor;
pub mod html;

use anyhow::Result;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::fetch::Fetcher;
use crate::types::{AuctionRecord, PipelineError, RawItemRecord};
use discovery::AuctionDiscovery;
use extractor::{dedup_records, ListingExtractor, Page};

/// Query parameters some auction sites honour to render every lot at once.
const SHOW_ALL_VARIANTS: &[(&str, &str)] = &[
    ("showall", "1"),
    ("view", "all"),
    ("limit", "500"),
    ("per_page", "500"),
];

/// Request for the acquisition entry point.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub max_items: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Scrape only this auction, skipping discovery.
    pub auction_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    pub items: Vec<RawItemRecord>,
    /// Unique items found before the `max_items` cap.
    pub total_count: usize,
}

pub struct AuctionScraper {
    fetcher: Fetcher,
    discovery: AuctionDiscovery,
    extractor: ListingExtractor,
    parallel_auctions: usize,
    max_pages: u32,
}

impl AuctionScraper {
    pub fn new(cfg: &ScraperConfig) -> Result<Self> {
        let fetcher = Fetcher::new(cfg.retry_policy(), &cfg.user_agent)?;
        let discovery = AuctionDiscovery::new(
            fetcher.clone(),
            &cfg.index_url,
            &cfg.auction_path_pattern,
            cfg.fallback_auctions,
        )?;
        let extractor = ListingExtractor::new(&cfg.item_path_pattern)?;

        Ok(Self {
            fetcher,
            discovery,
            extractor,
            parallel_auctions: cfg.parallel_auctions.max(1),
            max_pages: cfg.max_pages.max(1),
        })
    }

    /// Discover (or take the given auction) and extract raw item records.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResult, PipelineError> {
        let items = match &request.auction_url {
            Some(url) => self.scrape_single(url, request.max_items).await?,
            None => {
                let auctions = self
                    .discovery
                    .discover(request.start_date, request.end_date)
                    .await?;
                self.scrape_auctions(&auctions).await
            }
        };

        let mut items = dedup_records(items);
        let total_count = items.len();
        items.truncate(request.max_items);

        info!(
            total = total_count,
            returned = items.len(),
            max = request.max_items,
            "Scrape complete"
        );

        Ok(ScrapeResult { items, total_count })
    }

    // -- Discovery mode --------------------------------------------------

    /// Fetch every auction with bounded parallelism and merge the results
    /// in discovery order. A failed auction is skipped.
    pub async fn scrape_auctions(&self, auctions: &[AuctionRecord]) -> Vec<RawItemRecord> {
        info!(
            auctions = auctions.len(),
            parallel = self.parallel_auctions,
            "Extracting auctions"
        );

        let mut per_auction: Vec<(usize, Vec<RawItemRecord>)> = stream::iter(auctions.iter().enumerate())
            .map(|(i, auction)| async move {
                match self.scrape_auction(auction).await {
                    Ok(items) => (i, items),
                    Err(e) => {
                        warn!(url = %auction.url, error = %e, "Auction failed, skipping");
                        (i, Vec::new())
                    }
                }
            })
            .buffer_unordered(self.parallel_auctions)
            .collect()
            .await;

        per_auction.sort_by_key(|(i, _)| *i);
        per_auction.into_iter().flat_map(|(_, items)| items).collect()
    }

    async fn scrape_auction(&self, auction: &AuctionRecord) -> Result<Vec<RawItemRecord>, PipelineError> {
        let html = self.fetcher.get_text(&auction.url).await?;
        let end = auction
            .end_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .or_else(|| Some(auction.end_time_raw.clone()).filter(|s| !s.is_empty()));

        let items = self.extractor.extract(&Page {
            html: &html,
            base_url: &auction.url,
            auction_end: end.as_deref(),
        })?;
        debug!(url = %auction.url, count = items.len(), "Auction extracted");
        Ok(items)
    }

    // -- Single-auction mode ---------------------------------------------

    /// Best "show all" variant, then numbered pages until nothing new
    /// turns up, `max_pages` is reached, or `max_items` are collected.
    pub async fn scrape_single(&self, url: &str, max_items: usize) -> Result<Vec<RawItemRecord>, PipelineError> {
        let mut variants = vec![url.to_string()];
        variants.extend(
            SHOW_ALL_VARIANTS
                .iter()
                .filter_map(|(k, v)| html::with_query(url, k, v)),
        );

        let mut best: Option<(String, Vec<RawItemRecord>)> = None;
        let mut last_error = None;
        for variant in variants {
            match self.fetch_page(&variant).await {
                Ok(items) => {
                    debug!(variant = %variant, count = items.len(), "Variant extracted");
                    let better = best.as_ref().map_or(true, |(_, b)| items.len() > b.len());
                    if better {
                        best = Some((variant, items));
                    }
                }
                Err(e) => {
                    warn!(variant = %variant, error = %e, "Variant failed");
                    last_error = Some(e);
                }
            }
        }

        let (base, mut items) = match (best, last_error) {
            (Some(best), _) => best,
            (None, Some(e)) => return Err(e),
            (None, None) => return Ok(Vec::new()),
        };
        info!(variant = %base, count = items.len(), "Selected listing variant");

        let mut seen: HashSet<String> = items.iter().map(|r| r.dedup_key()).collect();
        for page in 2..=self.max_pages {
            if items.len() >= max_items {
                break;
            }
            let Some(page_url) = html::with_query(&base, "page", &page.to_string()) else {
                break;
            };
            let page_items = match self.fetch_page(&page_url).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(page, error = %e, "Page failed, stopping pagination");
                    break;
                }
            };
            let before = items.len();
            items.extend(page_items.into_iter().filter(|r| seen.insert(r.dedup_key())));
            let added = items.len() - before;
            debug!(page, added, "Page extracted");
            if added == 0 {
                break;
            }
        }

        Ok(items)
    }

    /// Records on one page. A page with no recognisable listings counts
    /// as empty so variant selection and pagination can move on.
    async fn fetch_page(&self, url: &str) -> Result<Vec<RawItemRecord>, PipelineError> {
        let html = self.fetcher.get_text(url).await?;
        let extracted = self.extractor.extract(&Page {
            html: &html,
            base_url: url,
            auction_end: None,
        });
        match extracted {
            Err(PipelineError::Parse(reason)) => {
                debug!(url, reason = %reason, "No listings on page");
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
