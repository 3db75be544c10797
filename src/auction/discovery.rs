//! Auction discovery.
//!
//! Reads the auction index, groups anchors by auction id, parses each
//! auction's close time from the text around its links, and applies the
//! caller's date window. When the window matches nothing, the first few
//! still-open auctions are returned instead so a run always has work.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::Html;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

use super::end_time::parse_end_time;
use super::html::{absolutize, flatten, Marker};
use crate::fetch::Fetcher;
use crate::types::{AuctionRecord, PipelineError};

static END_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ends?|ending|closes?|closing|end date|end time)\b[:\s]*[^|]{0,60}").unwrap()
});

/// Upper bound on the text scanned for one auction's card.
const MAX_REGION_BYTES: usize = 3000;

pub struct AuctionDiscovery {
    fetcher: Fetcher,
    index_url: String,
    auction_link: Regex,
    fallback_count: usize,
}

impl AuctionDiscovery {
    pub fn new(
        fetcher: Fetcher,
        index_url: &str,
        auction_path_pattern: &str,
        fallback_count: usize,
    ) -> Result<Self> {
        let auction_link = Regex::new(auction_path_pattern)
            .with_context(|| format!("Invalid auction path pattern: {auction_path_pattern}"))?;
        Ok(Self {
            fetcher,
            index_url: index_url.to_string(),
            auction_link,
            fallback_count,
        })
    }

    /// Fetch the index and return auctions closing inside `[start, end]`.
    pub async fn discover(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AuctionRecord>, PipelineError> {
        info!(index = %self.index_url, %start, %end, "Discovering auctions");

        let html = self.fetcher.get_text(&self.index_url).await?;
        let now = Local::now().naive_local();

        let candidates = self.find_auctions(&html, now);
        let total = candidates.len();
        let selected = filter_window(candidates, start, end, now, self.fallback_count);

        info!(found = total, selected = selected.len(), "Auction discovery complete");
        Ok(selected)
    }

    /// Group anchors by auction id and build one record per auction.
    ///
    /// An auction's region is the page text from its first anchor up to
    /// the next auction's first anchor.
    pub(crate) fn find_auctions(&self, html: &str, now: NaiveDateTime) -> Vec<AuctionRecord> {
        let document = Html::parse_document(html);
        let flat = flatten(document.root_element());

        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<&Marker>> = HashMap::new();
        for link in &flat.links {
            let Some(caps) = self.auction_link.captures(&link.value) else {
                continue;
            };
            let id = caps
                .get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if !grouped.contains_key(&id) {
                order.push(id.clone());
            }
            grouped.entry(id).or_default().push(link);
        }

        let mut records = Vec::with_capacity(order.len());
        for (i, id) in order.iter().enumerate() {
            let Some(links) = grouped.get(id) else { continue };
            let start = links[0].offset;
            let next_start = order
                .get(i + 1)
                .and_then(|next| grouped.get(next))
                .map_or(flat.text.len(), |l| l[0].offset);
            let end = next_start.min(start + MAX_REGION_BYTES).max(start);
            let region_text = flat.slice(start, end);

            let Some(url) = absolutize(&self.index_url, &links[0].value) else {
                continue;
            };

            let title = links
                .iter()
                .map(|m| m.label.as_str())
                .chain(
                    flat.headings
                        .iter()
                        .filter(|h| h.offset >= start && h.offset < end)
                        .map(|h| h.label.as_str()),
                )
                .find(|t| !t.is_empty())
                .map_or_else(|| format!("Auction {id}"), String::from);

            let end_time_raw = END_PHRASE
                .find(region_text)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            let end_time = parse_end_time(&end_time_raw, now)
                .or_else(|| parse_end_time(region_text, now));

            debug!(id = %id, %url, ?end_time, "Auction candidate");
            records.push(AuctionRecord {
                url,
                title,
                end_time,
                end_time_raw,
            });
        }

        records
    }
}

/// Apply the close-time window.
///
/// Past auctions are dropped. Auctions closing inside the window, or with
/// no parseable close time, are kept. An empty result falls back to the
/// first `fallback_count` open auctions.
pub fn filter_window(
    auctions: Vec<AuctionRecord>,
    start: NaiveDate,
    end: NaiveDate,
    now: NaiveDateTime,
    fallback_count: usize,
) -> Vec<AuctionRecord> {
    let open: Vec<AuctionRecord> = auctions
        .into_iter()
        .filter(|a| a.end_time.map_or(true, |t| t >= now))
        .collect();

    let in_window: Vec<AuctionRecord> = open
        .iter()
        .filter(|a| match a.end_time {
            Some(t) => {
                let d = t.date();
                d >= start && d <= end
            }
            None => true,
        })
        .cloned()
        .collect();

    if in_window.is_empty() && !open.is_empty() {
        info!(
            open = open.len(),
            fallback = fallback_count,
            "No auctions in date window, falling back to first open auctions"
        );
        return open.into_iter().take(fallback_count).collect();
    }

    in_window
}
