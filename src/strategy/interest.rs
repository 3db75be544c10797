//! Bidding-interest classification.
//!
//! Interest is derived only from the extracted bid and bidder counts so the
//! same item always gets the same level, whatever the classifier said.

use crate::types::InterestLevel;

/// Distinct bidders needed for medium or high interest.
const MIN_COMPETING_BIDDERS: u32 = 2;
/// Average bids per bidder needed for high interest.
const HIGH_BIDS_PER_BIDDER: f64 = 3.0;
/// Raw bid count that alone signals medium interest.
const MEDIUM_MIN_BIDS: u32 = 3;

/// Map bid/bidder counts to an interest level. Missing counts read as zero.
pub fn interest_level(bid_count: Option<u32>, bidder_count: Option<u32>) -> InterestLevel {
    let bids = bid_count.unwrap_or(0);
    let bidders = bidder_count.unwrap_or(0);

    if bidders >= MIN_COMPETING_BIDDERS && f64::from(bids) / f64::from(bidders) >= HIGH_BIDS_PER_BIDDER {
        InterestLevel::High
    } else if bidders >= MIN_COMPETING_BIDDERS || bids >= MEDIUM_MIN_BIDS {
        InterestLevel::Medium
    } else {
        InterestLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_levels() {
        assert_eq!(interest_level(Some(6), Some(2)), InterestLevel::High);
        assert_eq!(interest_level(Some(3), Some(2)), InterestLevel::Medium);
        assert_eq!(interest_level(Some(1), Some(1)), InterestLevel::Low);
    }

    #[test]
    fn test_many_bids_single_bidder_is_medium() {
        // One bidder cannot be "escalating competition".
        assert_eq!(interest_level(Some(12), Some(1)), InterestLevel::Medium);
        assert_eq!(interest_level(Some(3), None), InterestLevel::Medium);
    }

    #[test]
    fn test_two_bidders_few_bids_is_medium() {
        assert_eq!(interest_level(Some(2), Some(2)), InterestLevel::Medium);
        assert_eq!(interest_level(None, Some(4)), InterestLevel::Medium);
    }

    #[test]
    fn test_missing_counts_are_low() {
        assert_eq!(interest_level(None, None), InterestLevel::Low);
        assert_eq!(interest_level(Some(2), None), InterestLevel::Low);
    }

    #[test]
    fn test_high_boundary() {
        assert_eq!(interest_level(Some(9), Some(3)), InterestLevel::High);
        assert_eq!(interest_level(Some(8), Some(3)), InterestLevel::Medium);
    }
}
