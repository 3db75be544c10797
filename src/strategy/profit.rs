//! Bid-ceiling profit model.
//!
//! Given an estimated resale value, inverts the acquisition-cost formula to
//! find the highest bid that still meets both the dollar-profit and the ROI
//! target. Pure arithmetic: no I/O, no shared state.
//!
//! ```text
//! N              = V - V*f - S
//! cost(b)        = b * (1 + p)
//! bid_for_dollar = (N - D) / (1 + p)
//! bid_for_roi    = N / ((1 + p) * (1 + R/100))
//! max_bid        = max(0, min(bid_for_dollar, bid_for_roi))
//! ```

use tracing::debug;

use crate::types::{cents, ProfitAnalysis, SizeClass};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Targets and rates for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitConfig {
    /// Minimum profit in dollars (D).
    pub min_dollar_profit: f64,
    /// Minimum ROI in percent (R).
    pub min_roi_pct: f64,
    /// Resale channel fee rate (f), in [0, 1).
    pub fee_rate: f64,
    /// Buyer's premium on the winning bid (p).
    pub buyers_premium_rate: f64,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            min_dollar_profit: 20.0,
            min_roi_pct: 30.0,
            fee_rate: 0.13,
            buyers_premium_rate: 0.10,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

pub struct ProfitModel {
    config: ProfitConfig,
}

impl ProfitModel {
    pub fn new(config: ProfitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfitConfig {
        &self.config
    }

    /// Net proceeds after selling fees and shipping.
    pub fn net_proceeds(&self, estimated_value: f64, size_class: SizeClass) -> f64 {
        estimated_value - estimated_value * self.config.fee_rate - size_class.shipping_estimate()
    }

    /// Total acquisition cost at bid `b`.
    fn cost(&self, bid: f64) -> f64 {
        bid * (1.0 + self.config.buyers_premium_rate)
    }

    /// Profit and ROI (percent) at bid `b` for net proceeds `n`.
    /// ROI is 0 when nothing is spent.
    pub fn outcome_at(&self, net: f64, bid: f64) -> (f64, f64) {
        let cost = self.cost(bid);
        let profit = net - cost;
        let roi = if cost > 0.0 { profit / cost * 100.0 } else { 0.0 };
        (profit, roi)
    }

    /// Unrounded bid ceiling for net proceeds `n`.
    pub fn max_bid_for(&self, net: f64) -> f64 {
        let premium = 1.0 + self.config.buyers_premium_rate;
        let bid_for_dollar = (net - self.config.min_dollar_profit) / premium;
        let bid_for_roi = net / (premium * (1.0 + self.config.min_roi_pct / 100.0));
        bid_for_dollar.min(bid_for_roi).max(0.0)
    }

    /// Full analysis for one item. Monetary outputs are rounded to cents.
    pub fn analyze(&self, estimated_value: f64, size_class: SizeClass, current_bid: f64) -> ProfitAnalysis {
        let net = self.net_proceeds(estimated_value, size_class);
        let max_bid = self.max_bid_for(net);
        let (expected_profit, expected_roi) = self.outcome_at(net, max_bid);
        let (actual_profit, actual_roi) = self.outcome_at(net, current_bid.max(0.0));
        let break_even = (net / (1.0 + self.config.buyers_premium_rate)).max(0.0);

        debug!(
            value = estimated_value,
            net = format!("{net:.2}"),
            max_bid = format!("{max_bid:.2}"),
            current_bid,
            "Profit analysis"
        );

        ProfitAnalysis {
            max_bid: cents(max_bid),
            expected_profit: cents(expected_profit),
            expected_roi: cents(expected_roi),
            actual_profit: cents(actual_profit),
            actual_roi: cents(actual_roi),
            break_even_price: cents(break_even),
            shipping_estimate: size_class.shipping_estimate(),
            fees: cents(estimated_value * self.config.fee_rate),
        }
    }

    /// Both targets met at the ceiling, and the current bid is still under it.
    pub fn meets_criteria(&self, analysis: &ProfitAnalysis, current_bid: f64) -> bool {
        analysis.expected_profit >= self.config.min_dollar_profit
            && analysis.expected_roi >= self.config.min_roi_pct
            && current_bid <= analysis.max_bid
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn model(d: f64, r: f64) -> ProfitModel {
        ProfitModel::new(ProfitConfig {
            min_dollar_profit: d,
            min_roi_pct: r,
            fee_rate: 0.13,
            buyers_premium_rate: 0.10,
        })
    }

    #[test]
    fn test_worked_example() {
        let m = model(20.0, 30.0);
        let net = m.net_proceeds(150.0, SizeClass::Medium);
        assert!((net - 115.5).abs() < EPS);

        let a = m.analyze(150.0, SizeClass::Medium, 40.0);
        assert_eq!(a.max_bid, 80.77);
        assert_eq!(a.expected_profit, 26.65);
        assert_eq!(a.expected_roi, 30.0);
        assert_eq!(a.shipping_estimate, 15.0);
        assert_eq!(a.fees, 19.5);
        assert_eq!(a.break_even_price, 105.0);
        // 115.5 - 44 = 71.5; 71.5 / 44 = 162.5%
        assert_eq!(a.actual_profit, 71.5);
        assert_eq!(a.actual_roi, 162.5);
        assert!(m.meets_criteria(&a, 40.0));
    }

    #[test]
    fn test_dollar_constraint_binds_for_cheap_items() {
        // N = 40 - 5.2 - 8 = 26.8; dollar bid = 6.8/1.1 = 6.18; roi bid = 18.74
        let m = model(20.0, 30.0);
        let a = m.analyze(40.0, SizeClass::Small, 0.0);
        assert_eq!(a.max_bid, 6.18);
        assert_eq!(a.expected_profit, 20.0);
        assert!(a.expected_roi > 30.0);
    }

    #[test]
    fn test_max_bid_never_negative() {
        let m = model(20.0, 30.0);
        let a = m.analyze(10.0, SizeClass::Oversized, 5.0);
        assert_eq!(a.max_bid, 0.0);
        assert_eq!(a.break_even_price, 0.0);
        assert!(a.expected_profit < 0.0);
        assert_eq!(a.expected_roi, 0.0);
        assert!(!m.meets_criteria(&a, 5.0));
    }

    #[test]
    fn test_break_even_equals_max_bid_without_targets() {
        let m = model(0.0, 0.0);
        for value in [15.0, 80.0, 150.0, 999.99] {
            let a = m.analyze(value, SizeClass::Large, 0.0);
            assert_eq!(a.break_even_price, a.max_bid, "value {value}");
        }
    }

    #[test]
    fn test_max_bid_satisfies_both_targets_and_is_supremum() {
        let sizes = [SizeClass::Small, SizeClass::Medium, SizeClass::Large, SizeClass::Oversized];
        for &(d, r) in &[(0.0, 0.0), (20.0, 30.0), (50.0, 10.0), (5.0, 100.0)] {
            let m = model(d, r);
            for value in [0.0, 25.0, 90.0, 150.0, 480.0, 2500.0] {
                for size in sizes {
                    let net = m.net_proceeds(value, size);
                    let bid = m.max_bid_for(net);
                    if bid <= 0.0 {
                        continue;
                    }
                    let (profit, roi) = m.outcome_at(net, bid);
                    assert!(profit >= d - EPS, "profit {profit} < {d}");
                    assert!(roi >= r - EPS, "roi {roi} < {r}");

                    // A slightly higher bid breaks at least one target.
                    let (p2, r2) = m.outcome_at(net, bid + 0.01);
                    assert!(p2 < d || r2 < r, "bid {bid} is not the supremum");
                }
            }
        }
    }

    #[test]
    fn test_actual_profit_strictly_decreasing_in_bid() {
        let m = model(20.0, 30.0);
        let mut previous = f64::INFINITY;
        for bid in [0.0, 10.0, 40.0, 80.0, 81.0, 200.0] {
            let a = m.analyze(150.0, SizeClass::Medium, bid);
            assert!(a.actual_profit < previous);
            previous = a.actual_profit;
        }
    }

    #[test]
    fn test_overbid_never_meets_criteria() {
        let m = model(20.0, 30.0);
        let a = m.analyze(150.0, SizeClass::Medium, 80.78);
        assert!(a.actual_profit < a.expected_profit);
        assert!(!m.meets_criteria(&a, 80.78));
        assert!(m.meets_criteria(&a, 80.77));
    }
}
