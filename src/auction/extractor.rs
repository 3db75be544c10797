//! Listing extraction.
//!
//! An auction page is parsed once and turned into [`RawItemRecord`]s by an
//! ordered list of [`ExtractionStrategy`] implementations. A strategy that
//! does not recognise the page structure returns
//! [`PipelineError::Parse`] and the next one is tried:
//!
//! 1. [`StructuralBlocks`]: item containers holding both an item link and
//!    a bid indicator.
//! 2. [`LinkWindows`]: a text window around every unique item link,
//!    bounded by its neighbours, for pages whose containers are not
//!    recognisable.
//! 3. [`GenericRows`]: any table row or card carrying a price.
//!
//! Field extraction (URL, title, bid, image, counts) is shared by all
//! strategies through [`FieldExtractor`]. Items showing a closed-auction
//! phrase are discarded here.

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::html::{absolutize, element_text, flatten, FlatText, Marker};
use crate::types::{PipelineError, RawItemRecord};

// ---------------------------------------------------------------------------
// Selectors and text patterns
// ---------------------------------------------------------------------------

static CLASSED_CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[class], li[class], article[class], section[class], tr[class]").unwrap());

static ROWS_AND_CARDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr, div[class], li[class], article[class]").unwrap());

static BOLD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("b, strong").unwrap());

/// "Current Bid: $1,234.56" inside a bold label's parent.
static LABELLED_BID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)current\s+bid\s*:?\s*(?:USD\s*)?\$\s*([\d,]+(?:\.\d{1,2})?)").unwrap()
});

static LOOSE_BID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:current|high|winning|starting|opening)?\s*bid(?:\s+amount)?\s*:?\s*(?:USD\s*)?\$\s*([\d,]+(?:\.\d{1,2})?)")
        .unwrap()
});

/// A count directly before "bids", not part of a dollar amount.
static BID_COUNT_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[^$\d.,])(\d+)\s+bids?\b").unwrap());

static BID_COUNT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:bids|bid\s+count|number\s+of\s+bids|#\s*of\s*bids)\s*:?\s*(\d+)\b").unwrap()
});

static BIDDER_COUNT_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[^$\d.,])(\d+)\s+(?:unique\s+)?bidders?\b").unwrap());

static BIDDER_COUNT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbidders?\s*:?\s*(\d+)\b").unwrap());

static BID_INDICATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:current\s+bid|high\s+bid|winning\s+bid|bids?|bidding|bidders?)\b").unwrap()
});

static CURRENCY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\s*\d").unwrap());

/// Phrases marking an item whose bidding is over.
pub const CLOSED_PHRASES: &[&str] = &[
    "auction closed",
    "auction has ended",
    "auction ended",
    "bidding closed",
    "bidding has ended",
    "bidding is closed",
    "bidding ended",
    "lot closed",
    "item closed",
    "closed for bidding",
    "no longer available",
];

/// Class tokens that mark an item container.
const ITEM_CLASS_ROOTS: &[&str] = &["item", "lot", "listing", "auction-item", "lot-item"];
const ITEM_CLASS_SUFFIXES: &[&str] = &["", "card", "row", "container", "tile", "wrapper", "block", "box"];

/// Class fragments the row fallback treats as a card.
const ROW_CLASS_HINTS: &[&str] = &["card", "row", "product", "tile", "result"];

/// Most text a link window takes before and after its link.
const WINDOW_BEFORE: usize = 400;
const WINDOW_AFTER: usize = 1600;
/// Stored text blob length.
const MAX_TEXT_CHARS: usize = 1500;
/// Row fallback ignores fragments shorter than this.
const MIN_ROW_TEXT: usize = 10;

// ---------------------------------------------------------------------------
// Page + strategy contract
// ---------------------------------------------------------------------------

/// One fetched auction page.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub html: &'a str,
    /// URL the page was fetched from; relative links resolve against it.
    pub base_url: &'a str,
    /// Close time of the auction, copied onto every record.
    pub auction_end: Option<&'a str>,
}

/// One way of finding item boundaries on a page.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Records found on the page, or [`PipelineError::Parse`] when the
    /// page does not have the structure this strategy looks for.
    fn extract(&self, document: &Html, page: &Page<'_>) -> Result<Vec<RawItemRecord>, PipelineError>;
}

/// Returns true if the text carries a closed-auction phrase.
pub fn is_closed(text: &str) -> bool {
    let lower = text.to_lowercase();
    CLOSED_PHRASES.iter().any(|p| lower.contains(p))
}

/// Parse "1,234.50" into 1234.5.
fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|v| *v >= 0.0 && v.is_finite())
}

fn unrecognised(strategy: &str, detail: &str) -> PipelineError {
    PipelineError::Parse(format!("{strategy}: {detail}"))
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// An item-detail link with its position in the flattened text.
#[derive(Debug, Clone)]
pub struct ItemLink {
    pub offset: usize,
    pub url: String,
    pub label: String,
}

/// Everything gathered for one item before the record is built.
#[derive(Debug, Default)]
struct Candidate {
    /// Text belonging to this item only: checked for closed phrases, bids
    /// and counts.
    body: String,
    /// Preceding context kept in the text blob.
    lead: String,
    title: Option<String>,
    url: Option<String>,
    image_url: Option<String>,
    labelled_bid: Option<f64>,
}

impl Candidate {
    fn into_record(self, page: &Page<'_>) -> Option<RawItemRecord> {
        if self.body.is_empty() || is_closed(&self.body) {
            return None;
        }

        let mut text = if self.lead.is_empty() {
            self.body.clone()
        } else {
            format!("{} {}", self.lead, self.body)
        };
        if let Some(title) = self.title.filter(|t| !text.contains(t.as_str())) {
            text = format!("{title} | {text}");
        }
        let text: String = text.chars().take(MAX_TEXT_CHARS).collect();

        Some(RawItemRecord {
            current_bid: self.labelled_bid.or_else(|| FieldExtractor::loose_bid(&self.body)),
            bid_count: FieldExtractor::bid_count(&self.body),
            bidder_count: FieldExtractor::bidder_count(&self.body),
            image_url: self.image_url,
            url: self.url,
            text,
            auction_end: page.auction_end.map(String::from),
        })
    }
}

/// Pulls item fields out of a flattened fragment.
pub struct FieldExtractor {
    item_link: Regex,
}

impl FieldExtractor {
    pub fn new(item_path_pattern: &str) -> Result<Self> {
        let item_link = Regex::new(item_path_pattern)
            .with_context(|| format!("Invalid item path pattern: {item_path_pattern}"))?;
        Ok(Self { item_link })
    }

    /// Unique absolute item-detail URLs, at the offset of their first
    /// occurrence.
    pub fn item_links(&self, flat: &FlatText, base_url: &str) -> Vec<ItemLink> {
        let mut seen = HashSet::new();
        flat.links
            .iter()
            .filter(|m| self.item_link.is_match(&m.value))
            .filter_map(|m| {
                let url = absolutize(base_url, &m.value)?;
                seen.insert(url.clone()).then(|| ItemLink {
                    offset: m.offset,
                    url,
                    label: m.label.clone(),
                })
            })
            .collect()
    }

    /// Build a record from one container element.
    fn record_from_element(&self, el: ElementRef<'_>, flat: FlatText, page: &Page<'_>) -> Option<RawItemRecord> {
        let url = self.item_links(&flat, page.base_url).into_iter().next().map(|l| l.url);
        Candidate {
            title: Self::title(&flat),
            image_url: Self::image_url(&flat.images, page.base_url),
            labelled_bid: Self::labelled_bid(el),
            url,
            body: flat.text,
            lead: String::new(),
        }
        .into_record(page)
    }

    /// First heading, or the alt text of the first image that has one.
    pub fn title(flat: &FlatText) -> Option<String> {
        flat.headings
            .iter()
            .chain(flat.images.iter())
            .map(|m| m.label.as_str())
            .find(|t| !t.is_empty())
            .map(String::from)
    }

    /// Bolded "Current Bid" label read together with its parent's text.
    pub fn labelled_bid(block: ElementRef<'_>) -> Option<f64> {
        block
            .select(&BOLD)
            .filter(|b| element_text(*b).to_lowercase().contains("current bid"))
            .find_map(|b| {
                let scope = b.parent().and_then(ElementRef::wrap).unwrap_or(b);
                LABELLED_BID
                    .captures(&element_text(scope))
                    .and_then(|c| parse_amount(&c[1]))
            })
    }

    pub fn loose_bid(text: &str) -> Option<f64> {
        LOOSE_BID.captures(text).and_then(|c| parse_amount(&c[1]))
    }

    pub fn bid_count(text: &str) -> Option<u32> {
        BID_COUNT_BEFORE
            .captures(text)
            .or_else(|| BID_COUNT_LABEL.captures(text))
            .and_then(|c| c[1].parse().ok())
    }

    pub fn bidder_count(text: &str) -> Option<u32> {
        BIDDER_COUNT_BEFORE
            .captures(text)
            .or_else(|| BIDDER_COUNT_LABEL.captures(text))
            .and_then(|c| c[1].parse().ok())
    }

    /// First image that resolves to an absolute URL.
    pub fn image_url<'m>(images: impl IntoIterator<Item = &'m Marker>, base_url: &str) -> Option<String> {
        images.into_iter().find_map(|m| absolutize(base_url, &m.value))
    }
}

/// Candidates that contain no other candidate.
fn innermost<'a>(candidates: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
    let ids: HashSet<_> = candidates.iter().map(|el| el.id()).collect();
    candidates
        .into_iter()
        .filter(|el| !el.descendants().skip(1).any(|d| ids.contains(&d.id())))
        .collect()
}

fn is_item_class(token: &str) -> bool {
    let token = token.to_lowercase();
    ITEM_CLASS_ROOTS.iter().any(|root| {
        ITEM_CLASS_SUFFIXES.iter().any(|suffix| {
            if suffix.is_empty() {
                token == *root
            } else {
                token == format!("{root}-{suffix}") || token == format!("{root}_{suffix}")
            }
        })
    })
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Item containers that hold both an item link and a bid indicator.
pub struct StructuralBlocks {
    fields: Arc<FieldExtractor>,
}

impl ExtractionStrategy for StructuralBlocks {
    fn name(&self) -> &'static str {
        "structural-blocks"
    }

    fn extract(&self, document: &Html, page: &Page<'_>) -> Result<Vec<RawItemRecord>, PipelineError> {
        let blocks: Vec<(ElementRef<'_>, FlatText)> = innermost(
            document
                .select(&CLASSED_CONTAINERS)
                .filter(|el| el.value().classes().any(is_item_class))
                .filter(|el| {
                    let flat = flatten(*el);
                    !self.fields.item_links(&flat, page.base_url).is_empty() && BID_INDICATOR.is_match(&flat.text)
                })
                .collect(),
        )
        .into_iter()
        .map(|el| (el, flatten(el)))
        .collect();

        if blocks.is_empty() {
            return Err(unrecognised(self.name(), "no item containers"));
        }
        Ok(blocks
            .into_iter()
            .filter_map(|(el, flat)| self.fields.record_from_element(el, flat, page))
            .collect())
    }
}

/// Text window around every unique item link.
///
/// A window runs from this link to the next one (at most
/// `WINDOW_AFTER` bytes), and only that part is checked for closed phrases
/// and bids. Up to `WINDOW_BEFORE` bytes of preceding text, never past the
/// midpoint to the previous link, are kept as context.
pub struct LinkWindows {
    fields: Arc<FieldExtractor>,
}

impl ExtractionStrategy for LinkWindows {
    fn name(&self) -> &'static str {
        "link-windows"
    }

    fn extract(&self, document: &Html, page: &Page<'_>) -> Result<Vec<RawItemRecord>, PipelineError> {
        let flat = flatten(document.root_element());
        let links = self.fields.item_links(&flat, page.base_url);
        if links.is_empty() {
            return Err(unrecognised(self.name(), "no item links"));
        }

        let records = links
            .iter()
            .enumerate()
            .filter_map(|(i, link)| {
                let offset = link.offset;
                let next = links.get(i + 1).map_or(flat.text.len(), |l| l.offset);
                let end = next.min(offset + WINDOW_AFTER);
                let lead_start = i
                    .checked_sub(1)
                    .map_or(0, |p| links[p].offset + (offset - links[p].offset) / 2)
                    .max(offset.saturating_sub(WINDOW_BEFORE));

                let in_window = |m: &&Marker| m.offset >= lead_start && m.offset < end.max(offset + 1);
                let title = Some(link.label.clone())
                    .filter(|t| !t.is_empty())
                    .or_else(|| FieldExtractor::title(&FlatText {
                        headings: flat.headings.iter().filter(in_window).cloned().collect(),
                        images: flat.images.iter().filter(in_window).cloned().collect(),
                        ..FlatText::default()
                    }));

                Candidate {
                    body: flat.slice(offset, end).to_string(),
                    lead: flat.slice(lead_start, offset).to_string(),
                    title,
                    url: Some(link.url.clone()),
                    image_url: FieldExtractor::image_url(flat.images.iter().filter(in_window), page.base_url),
                    labelled_bid: None,
                }
                .into_record(page)
            })
            .collect();
        Ok(records)
    }
}

/// Last resort: any table row or card carrying a price.
pub struct GenericRows {
    fields: Arc<FieldExtractor>,
}

impl ExtractionStrategy for GenericRows {
    fn name(&self) -> &'static str {
        "generic-rows"
    }

    fn extract(&self, document: &Html, page: &Page<'_>) -> Result<Vec<RawItemRecord>, PipelineError> {
        let rows = innermost(
            document
                .select(&ROWS_AND_CARDS)
                .filter(|el| {
                    el.value().name() == "tr"
                        || el
                            .value()
                            .classes()
                            .any(|c| ROW_CLASS_HINTS.iter().any(|h| c.to_lowercase().contains(h)))
                })
                .filter(|el| {
                    let text = flatten(*el).text;
                    text.len() >= MIN_ROW_TEXT && CURRENCY.is_match(&text)
                })
                .collect(),
        );

        if rows.is_empty() {
            return Err(unrecognised(self.name(), "no priced rows"));
        }
        Ok(rows
            .into_iter()
            .filter_map(|el| self.fields.record_from_element(el, flatten(el), page))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Runs the strategies in priority order.
pub struct ListingExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ListingExtractor {
    /// Standard strategy chain for the given item-link pattern.
    pub fn new(item_path_pattern: &str) -> Result<Self> {
        let fields = Arc::new(FieldExtractor::new(item_path_pattern)?);
        Ok(Self::with_strategies(vec![
            Box::new(StructuralBlocks { fields: fields.clone() }),
            Box::new(LinkWindows { fields: fields.clone() }),
            Box::new(GenericRows { fields }),
        ]))
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Deduplicated records from the first strategy that finds any.
    /// [`PipelineError::Parse`] when none does.
    pub fn extract(&self, page: &Page<'_>) -> Result<Vec<RawItemRecord>, PipelineError> {
        let document = Html::parse_document(page.html);
        for strategy in &self.strategies {
            match strategy.extract(&document, page) {
                Ok(records) if !records.is_empty() => {
                    debug!(
                        strategy = strategy.name(),
                        count = records.len(),
                        page = page.base_url,
                        "Extraction strategy matched"
                    );
                    return Ok(dedup_records(records));
                }
                Ok(_) => debug!(strategy = strategy.name(), page = page.base_url, "Only closed items found"),
                Err(e) => debug!(page = page.base_url, error = %e, "Strategy found nothing"),
            }
        }
        Err(PipelineError::Parse(format!("no listings recognised on {}", page.base_url)))
    }
}

/// Keep the first record per dedup key, preserving order.
pub fn dedup_records(records: Vec<RawItemRecord>) -> Vec<RawItemRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
