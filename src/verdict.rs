//! Verdict synthesis.
//!
//! Given a claimed price and the gathered evidence, the oracle picks one of
//! the four concrete verdicts. When it cannot (no oracle, a transport error,
//! an unparseable reply, or an answer outside the four labels) a
//! deterministic fallback is returned instead: a ±10% range around the
//! claimed price with verdict `Analysis Pending`.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::extract::format_inr;
use crate::models::{AnalysisResult, ConfidenceTier, PriceEntry, Verdict, WebEvidence};
use crate::oracle::{ask_json, Oracle, OracleError};

/// History entries shown to the oracle.
const HISTORY_IN_PROMPT: usize = 5;

const SYSTEM: &str = "You judge whether a quoted price in India is fair. Compare the claimed \
price with the historical entries and web prices you are given. If the claimed price is above \
the market price it leans overpriced; below the market price it leans underpriced; close to it \
is fair. Reply with JSON only: {\"expectedPriceRange\": \"₹<low> - ₹<high>\", \"verdict\": one \
of \"Likely Underpriced\", \"Fair Deal\", \"Slightly High\", \"Likely Overpriced\", \
\"confidence\": \"Low\" | \"Medium\" | \"High\", \"explanation\": \"<one or two sentences>\"}.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerdictReply {
    expected_price_range: String,
    verdict: String,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    explanation: String,
}

pub struct VerdictSynthesizer {
    oracle: Arc<dyn Oracle>,
}

impl VerdictSynthesizer {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Judge `claimed_price` for `item`. Always returns a result.
    pub async fn synthesize(
        &self,
        item: &str,
        claimed_price: i64,
        history: &[PriceEntry],
        web: &[WebEvidence],
    ) -> AnalysisResult {
        let user = build_prompt(item, claimed_price, history, web);

        let outcome = ask_json::<VerdictReply>(self.oracle.as_ref(), SYSTEM, &user)
            .await
            .and_then(|reply| to_result(reply, history.len()));

        match outcome {
            Ok(result) => {
                info!(item, verdict = %result.verdict, "verdict synthesized");
                result
            }
            Err(e) => {
                warn!(item, error = %e, "verdict oracle unavailable, using fallback");
                fallback(claimed_price, history.len())
            }
        }
    }
}

fn build_prompt(item: &str, claimed: i64, history: &[PriceEntry], web: &[WebEvidence]) -> String {
    let mut prompt = format!("Item: {}\nClaimed price: {}\n", item, format_inr(claimed));

    prompt.push_str("\nHistorical entries:\n");
    if history.is_empty() {
        prompt.push_str("(none)\n");
    }
    for entry in history.iter().take(HISTORY_IN_PROMPT) {
        prompt.push_str(&format!(
            "- {} in {}: {} ({})\n",
            entry.item,
            entry.location,
            format_inr(entry.price),
            entry.timestamp.format("%d %b %Y")
        ));
    }

    prompt.push_str("\nWeb results:\n");
    if web.is_empty() {
        prompt.push_str("(none)\n");
    }
    for ev in web {
        prompt.push_str(&format!(
            "- {} [{}]: {}\n",
            ev.title,
            ev.source,
            ev.price().unwrap_or("no price")
        ));
    }
    prompt
}

fn to_result(reply: VerdictReply, history_len: usize) -> Result<AnalysisResult, OracleError> {
    let verdict = Verdict::from_concrete_label(&reply.verdict).ok_or_else(|| {
        OracleError::Malformed(format!("not a concrete verdict: '{}'", reply.verdict))
    })?;
    let confidence = reply
        .confidence
        .as_deref()
        .and_then(ConfidenceTier::parse)
        .unwrap_or_else(|| tier_for_history(history_len));

    Ok(AnalysisResult {
        expected_price_range: reply.expected_price_range.trim().to_string(),
        verdict,
        confidence,
        explanation: reply.explanation.trim().to_string(),
    })
}

/// High above five historical entries, Medium with any, Low with none.
pub fn tier_for_history(history_len: usize) -> ConfidenceTier {
    match history_len {
        n if n > 5 => ConfidenceTier::High,
        n if n > 0 => ConfidenceTier::Medium,
        _ => ConfidenceTier::Low,
    }
}

/// Deterministic result used whenever the oracle cannot answer.
pub fn fallback(claimed_price: i64, history_len: usize) -> AnalysisResult {
    let low = (claimed_price as f64 * 0.9).round() as i64;
    let high = (claimed_price as f64 * 1.1).round() as i64;
    AnalysisResult {
        expected_price_range: format!("{} - {}", format_inr(low), format_inr(high)),
        verdict: Verdict::AnalysisPending,
        confidence: tier_for_history(history_len),
        explanation: format!(
            "Automated analysis is unavailable. The range is a ±10% band around the quoted \
             price, informed by {} historical entries.",
            history_len
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AUTO_LOGGED;
    use crate::oracle::testing::FnOracle;
    use crate::oracle::DisabledOracle;

    fn history(n: usize) -> Vec<PriceEntry> {
        (0..n)
            .map(|i| PriceEntry::new("iphone 12", 11000 + i as i64 * 100, None, AUTO_LOGGED))
            .collect()
    }

    #[tokio::test]
    async fn test_oracle_verdict_used() {
        let oracle = Arc::new(FnOracle::new(|user: &str| {
            assert!(user.contains("Claimed price: ₹12,000"));
            Ok(r#"```json
{"expectedPriceRange": "₹10,500 - ₹11,800", "verdict": "Slightly High",
 "confidence": "medium", "explanation": "Slightly above recent listings."}
```"#
                .to_string())
        }));
        let synth = VerdictSynthesizer::new(oracle);
        let result = synth.synthesize("iphone 12", 12000, &history(2), &[]).await;

        assert_eq!(result.verdict, Verdict::SlightlyHigh);
        assert_eq!(result.confidence, ConfidenceTier::Medium);
        assert_eq!(result.expected_price_range, "₹10,500 - ₹11,800");
    }

    #[tokio::test]
    async fn test_fallback_without_oracle() {
        let synth = VerdictSynthesizer::new(Arc::new(DisabledOracle::new("none")));
        let result = synth.synthesize("iphone 12", 12000, &history(0), &[]).await;

        assert_eq!(result.verdict, Verdict::AnalysisPending);
        assert_eq!(result.expected_price_range, "₹10,800 - ₹13,200");
        assert_eq!(result.confidence, ConfidenceTier::Low);
        assert!(result.explanation.contains("0 historical entries"));
    }

    #[tokio::test]
    async fn test_non_concrete_label_falls_back() {
        let oracle = Arc::new(FnOracle::new(|_: &str| {
            Ok(r#"{"expectedPriceRange": "?", "verdict": "Analysis Pending", "explanation": ""}"#
                .to_string())
        }));
        let synth = VerdictSynthesizer::new(oracle);
        let result = synth.synthesize("kettle", 1000, &history(7), &[]).await;
        assert_eq!(result.verdict, Verdict::AnalysisPending);
        assert_eq!(result.confidence, ConfidenceTier::High);
        assert_eq!(result.expected_price_range, "₹900 - ₹1,100");
    }

    #[test]
    fn test_prompt_limits_history_and_lists_web_prices() {
        let mut priced = WebEvidence::new("Amazon listing", "", "https://www.amazon.in/x", "");
        priced.set_price_if_unset("₹11,500");
        let bare = WebEvidence::new("Forum post", "", "https://forum.in/y", "");

        let prompt = build_prompt("iphone 12", 12000, &history(8), &[priced, bare]);
        assert_eq!(prompt.matches("- iphone 12 in Unknown").count(), 5);
        assert!(prompt.contains("- Amazon listing [amazon.in]: ₹11,500"));
        assert!(prompt.contains("- Forum post [forum.in]: no price"));
    }

    #[test]
    fn test_fallback_brackets_claim() {
        for claimed in [1, 999, 12_000, 119_999] {
            let r = fallback(claimed, 3);
            let bounds: Vec<f64> = r
                .expected_price_range
                .split(" - ")
                .filter_map(crate::extract::price_amount)
                .collect();
            assert_eq!(bounds.len(), 2);
            assert!(bounds[0] <= claimed as f64 && claimed as f64 <= bounds[1]);
            assert_eq!(r.confidence, ConfidenceTier::Medium);
        }
    }
}
