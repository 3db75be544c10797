//! Resale advisor: one advisory call per item.
//!
//! Never gates an item. Any failure yields [`ResaleAdvice::fallback`].

use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::llm::{complete_json, PromptRequest, ReasoningProvider};
use crate::types::{NormalizedItem, ProfitAnalysis, ResaleAdvice, RiskScore, ValuationEstimate};

/// Tips kept from a reply.
const MAX_TIPS: usize = 5;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AdviceReply {
    recommended_channel: String,
    risk_score: String,
    risk_reasoning: String,
    tips: Vec<String>,
}

pub struct ResaleAdvisor {
    provider: Arc<dyn ReasoningProvider>,
}

impl ResaleAdvisor {
    pub fn new(provider: Arc<dyn ReasoningProvider>) -> Self {
        Self { provider }
    }

    pub async fn advise(
        &self,
        item: &NormalizedItem,
        valuation: &ValuationEstimate,
        profit: &ProfitAnalysis,
    ) -> ResaleAdvice {
        let request = PromptRequest::new(Self::system_prompt(), Self::build_prompt(item, valuation, profit));

        match complete_json::<AdviceReply>(self.provider.as_ref(), &request).await {
            Ok(reply) if !reply.recommended_channel.trim().is_empty() => ResaleAdvice {
                recommended_channel: reply.recommended_channel.trim().to_string(),
                risk_score: reply.risk_score.parse::<RiskScore>().unwrap_or_default(),
                risk_reasoning: reply.risk_reasoning,
                tips: reply
                    .tips
                    .into_iter()
                    .filter(|t| !t.trim().is_empty())
                    .take(MAX_TIPS)
                    .collect(),
            },
            Ok(_) => {
                warn!(item = %item.id, "Advice reply had no channel, using default advice");
                ResaleAdvice::fallback()
            }
            Err(e) => {
                warn!(item = %item.id, error = %e, "Advice call failed, using default advice");
                ResaleAdvice::fallback()
            }
        }
    }

    pub fn system_prompt() -> &'static str {
        "You advise a reseller on where and how to resell auction purchases.\n\n\
         Reply with a single JSON object and nothing else:\n\
         {\"recommended_channel\": string, \"risk_score\": \"low\" | \"medium\" | \"high\", \
         \"risk_reasoning\": string, \"tips\": [string, ...]}\n\n\
         Pick one channel (e.g. eBay, Facebook Marketplace, Mercari, Poshmark, local consignment). \
         Risk covers authenticity, condition uncertainty, demand and shipping damage."
    }

    pub fn build_prompt(item: &NormalizedItem, valuation: &ValuationEstimate, profit: &ProfitAnalysis) -> String {
        let mut prompt = String::with_capacity(800);
        prompt.push_str(&format!("ITEM: \"{}\"\n", item.title));
        prompt.push_str(&format!("CATEGORY: {}\n", item.category));
        prompt.push_str(&format!("CONDITION: {}\n", item.condition));
        prompt.push_str(&format!("SIZE: {}\n", item.size_class));
        prompt.push_str(&format!(
            "ESTIMATED VALUE: ${:.2} (range ${:.2}-${:.2}, {:?} confidence)\n",
            valuation.estimated_value, valuation.low_estimate, valuation.high_estimate, valuation.confidence
        ));
        prompt.push_str(&format!("MAX BID: ${:.2}\n", profit.max_bid));
        prompt.push_str(&format!(
            "EXPECTED PROFIT: ${:.2} ({:.1}% ROI)\n",
            profit.expected_profit, profit.expected_roi
        ));
        prompt.push_str(&format!("BIDDING INTEREST: {}\n", item.interest_level));
        prompt
    }
}
