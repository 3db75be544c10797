//! Shared types for the BIDSCOUT pipeline.
//!
//! These types form the data model passed between discovery, extraction,
//! parsing, valuation and the profit model. They are kept free of any
//! client or engine dependency so every module can use them.

use chrono::NaiveDateTime;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Discovery / extraction records
// ---------------------------------------------------------------------------

/// A candidate auction found on the auction index page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuctionRecord {
    pub url: String,
    pub title: String,
    /// Parsed close time, `None` when no grammar rule matched.
    pub end_time: Option<NaiveDateTime>,
    /// The free text the end time was parsed from.
    pub end_time_raw: String,
}

/// One item as carved out of an auction page, before classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawItemRecord {
    /// Tag-stripped text of the item block.
    pub text: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub current_bid: Option<f64>,
    pub bid_count: Option<u32>,
    pub bidder_count: Option<u32>,
    /// Close time of the parent auction, as displayed.
    pub auction_end: Option<String>,
}

impl RawItemRecord {
    /// Identity used for deduplication: the item URL, or the first
    /// 100 characters of text when no URL was found.
    pub fn dedup_key(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => self.text.chars().take(100).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Discrete shipping bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    #[default]
    Medium,
    Large,
    Oversized,
}

impl SizeClass {
    /// Flat shipping estimate in dollars for this size class.
    pub fn shipping_estimate(&self) -> f64 {
        match self {
            SizeClass::Small => 8.0,
            SizeClass::Medium => 15.0,
            SizeClass::Large => 35.0,
            SizeClass::Oversized => 85.0,
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeClass::Small => write!(f, "small"),
            SizeClass::Medium => write!(f, "medium"),
            SizeClass::Large => write!(f, "large"),
            SizeClass::Oversized => write!(f, "oversized"),
        }
    }
}

impl std::str::FromStr for SizeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" | "s" => Ok(SizeClass::Small),
            "medium" | "m" | "med" => Ok(SizeClass::Medium),
            "large" | "l" => Ok(SizeClass::Large),
            "oversized" | "oversize" | "xl" | "freight" => Ok(SizeClass::Oversized),
            _ => Err(format!("Unknown size class: {s}")),
        }
    }
}

/// Coarse bidding-activity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for InterestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterestLevel::Low => write!(f, "low"),
            InterestLevel::Medium => write!(f, "medium"),
            InterestLevel::High => write!(f, "high"),
        }
    }
}

/// Confidence tier of a valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" | "moderate" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(format!("Unknown confidence: {s}")),
        }
    }
}

/// Qualitative resale risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskScore {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for RiskScore {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskScore::Low),
            "medium" | "moderate" => Ok(RiskScore::Medium),
            "high" => Ok(RiskScore::High),
            _ => Err(format!("Unknown risk score: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized item
// ---------------------------------------------------------------------------

/// A classified auction item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NormalizedItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Always >= 0.
    pub current_bid: f64,
    pub category: String,
    pub condition: String,
    pub size_class: SizeClass,
    pub auction_url: String,
    pub image_url: Option<String>,
    pub shipping_available: bool,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
    pub auction_end: Option<String>,
    pub bid_count: Option<u32>,
    pub bidder_count: Option<u32>,
    pub interest_level: InterestLevel,
}

impl fmt::Display for NormalizedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (${:.2} | {} | {} | {} interest)",
            self.title, self.current_bid, self.category, self.size_class, self.interest_level,
        )
    }
}

// ---------------------------------------------------------------------------
// Analysis outputs
// ---------------------------------------------------------------------------

/// Resale value estimate synthesised from search evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationEstimate {
    pub estimated_value: f64,
    pub low_estimate: f64,
    pub high_estimate: f64,
    pub confidence: Confidence,
    pub sources: Vec<String>,
    pub reasoning: String,
}

impl ValuationEstimate {
    /// Zero-value, low-confidence estimate used when no evidence exists.
    pub fn placeholder(reason: &str) -> Self {
        Self {
            estimated_value: 0.0,
            low_estimate: 0.0,
            high_estimate: 0.0,
            confidence: Confidence::Low,
            sources: Vec::new(),
            reasoning: reason.to_string(),
        }
    }
}

/// Output of the profit model. All monetary fields are in dollars,
/// ROI fields in percent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfitAnalysis {
    pub max_bid: f64,
    pub expected_profit: f64,
    pub expected_roi: f64,
    pub actual_profit: f64,
    pub actual_roi: f64,
    pub break_even_price: f64,
    pub shipping_estimate: f64,
    pub fees: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResaleAdvice {
    pub recommended_channel: String,
    pub risk_score: RiskScore,
    pub risk_reasoning: String,
    pub tips: Vec<String>,
}

impl ResaleAdvice {
    /// Generic advice used when the advisory call fails.
    pub fn fallback() -> Self {
        Self {
            recommended_channel: "eBay".to_string(),
            risk_score: RiskScore::Medium,
            risk_reasoning: "Advice unavailable; assuming average resale risk.".to_string(),
            tips: vec![
                "Photograph the item clearly from several angles.".to_string(),
                "Check recent sold listings before setting a price.".to_string(),
            ],
        }
    }
}

/// A fully analysed item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzedItem {
    pub item: NormalizedItem,
    pub valuation: ValuationEstimate,
    pub profit: ProfitAnalysis,
    pub advice: ResaleAdvice,
    pub meets_criteria: bool,
}

/// Counters reported by the batch analysis entry point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub scraped: usize,
    pub analyzed: usize,
    pub profitable: usize,
    pub errors: usize,
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scraped={} analyzed={} profitable={} errors={}",
            self.scraped, self.analyzed, self.profitable, self.errors,
        )
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Round to cent precision, half away from zero. Non-finite input maps to 0.
pub fn cents(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for BIDSCOUT.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Network error ({url}) after {attempts} attempts: {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Classification error ({item}): {message}")]
    Classification { item: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
