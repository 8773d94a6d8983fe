//! Core data models used throughout Fair Price.
//!
//! These types represent the historical entries, web evidence, admin-managed
//! source lists, and analysis results that flow through the price-resolution
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contributor id recorded on entries created by the pipeline itself.
pub const AUTO_LOGGED: &str = "auto-logged";

/// A historical price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub id: String,
    pub item: String,
    pub location: String,
    /// Price in whole currency units. Always > 0.
    pub price: i64,
    pub timestamp: DateTime<Utc>,
    pub upvotes: i64,
    pub downvotes: i64,
    pub is_trusted: bool,
    pub contributor_id: String,
}

impl PriceEntry {
    /// Create a new entry with a fresh id and the current timestamp.
    ///
    /// A missing or blank location is stored as `"Unknown"`.
    pub fn new(item: &str, price: i64, location: Option<&str>, contributor_id: &str) -> Self {
        let location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("Unknown");
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item: item.trim().to_string(),
            location: location.to_string(),
            price,
            timestamp: Utc::now(),
            upvotes: 0,
            downvotes: 0,
            is_trusted: false,
            contributor_id: contributor_id.to_string(),
        }
    }
}

/// A [`PriceEntry`] together with its cosine distance from a query vector.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: PriceEntry,
    pub distance: f32,
}

/// A single web result gathered for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvidence {
    pub title: String,
    pub body: String,
    /// Bare hostname, without a leading `www.`.
    pub source: String,
    pub url: String,
    pub date: String,
    price: Option<String>,
}

impl WebEvidence {
    pub fn new(title: &str, body: &str, url: &str, date: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            source: bare_host(url).unwrap_or_default(),
            url: url.to_string(),
            date: date.to_string(),
            price: None,
        }
    }

    pub fn price(&self) -> Option<&str> {
        self.price.as_deref()
    }

    pub fn has_price(&self) -> bool {
        self.price.is_some()
    }

    /// Record a price unless an earlier, higher-priority stage already did.
    ///
    /// Returns `true` when the price was stored.
    pub fn set_price_if_unset(&mut self, price: impl Into<String>) -> bool {
        if self.price.is_some() {
            return false;
        }
        let price = price.into();
        if price.trim().is_empty() {
            return false;
        }
        self.price = Some(price);
        true
    }

    /// Point this evidence at a different page, e.g. after a drill-down.
    pub fn retarget(&mut self, url: &str, body: &str) {
        self.url = url.to_string();
        self.body = body.to_string();
        if let Some(host) = bare_host(url) {
            self.source = host;
        }
    }
}

/// Lowercased hostname of `url` with any leading `www.` removed.
pub fn bare_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// An admin-curated domain that is searched preferentially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedSource {
    pub id: String,
    pub name: String,
    /// Lowercase-normalized URL, unique across sources.
    pub url: String,
    pub category: String,
    /// CSS selector addressing the price element on this domain's pages.
    pub price_selector: Option<String>,
    pub is_active: bool,
}

impl TrustedSource {
    pub fn new(name: &str, url: &str, category: &str, price_selector: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            url: normalize_source_url(url),
            category: category.trim().to_string(),
            price_selector: price_selector
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            is_active: true,
        }
    }

    /// Hostname this source restricts searches to.
    pub fn host(&self) -> Option<String> {
        bare_host(&self.url).or_else(|| bare_host(&format!("https://{}", self.url)))
    }
}

/// Lowercase a source URL and drop any trailing slash.
pub fn normalize_source_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Kind of [`BlacklistRule`] pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleKind {
    Domain,
    Regex,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Domain => "DOMAIN",
            RuleKind::Regex => "REGEX",
        }
    }
}

impl std::str::FromStr for RuleKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DOMAIN" => Ok(RuleKind::Domain),
            "REGEX" => Ok(RuleKind::Regex),
            other => anyhow::bail!("Unknown rule kind: '{}'. Must be DOMAIN or REGEX.", other),
        }
    }
}

/// An admin-curated exclusion applied to web evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistRule {
    pub id: String,
    pub pattern: String,
    pub kind: RuleKind,
    pub description: Option<String>,
    pub is_active: bool,
}

impl BlacklistRule {
    pub fn new(pattern: &str, kind: RuleKind, description: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pattern: pattern.trim().to_string(),
            kind,
            description: description.map(String::from),
            is_active: true,
        }
    }
}

/// Final verdict label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Likely Underpriced")]
    LikelyUnderpriced,
    #[serde(rename = "Fair Deal")]
    FairDeal,
    #[serde(rename = "Slightly High")]
    SlightlyHigh,
    #[serde(rename = "Likely Overpriced")]
    LikelyOverpriced,
    #[serde(rename = "Analysis Pending")]
    AnalysisPending,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::LikelyUnderpriced => "Likely Underpriced",
            Verdict::FairDeal => "Fair Deal",
            Verdict::SlightlyHigh => "Slightly High",
            Verdict::LikelyOverpriced => "Likely Overpriced",
            Verdict::AnalysisPending => "Analysis Pending",
        }
    }

    /// Parse one of the four concrete verdicts. `Analysis Pending` is not
    /// something the oracle may answer with.
    pub fn from_concrete_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "likely underpriced" => Some(Verdict::LikelyUnderpriced),
            "fair deal" => Some(Verdict::FairDeal),
            "slightly high" => Some(Verdict::SlightlyHigh),
            "likely overpriced" => Some(Verdict::LikelyOverpriced),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse confidence tier reported alongside a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(ConfidenceTier::Low),
            "medium" => Some(ConfidenceTier::Medium),
            "high" => Some(ConfidenceTier::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceTier::Low => "Low",
            ConfidenceTier::Medium => "Medium",
            ConfidenceTier::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub expected_price_range: String,
    pub verdict: Verdict,
    pub confidence: ConfidenceTier,
    pub explanation: String,
}

impl AnalysisResult {
    /// Terminal result for a query that carried no price.
    pub fn awaiting_price() -> Self {
        Self {
            expected_price_range: "Unknown".to_string(),
            verdict: Verdict::AnalysisPending,
            confidence: ConfidenceTier::Low,
            explanation: "No price was found in your query. Include the price you were quoted \
                (e.g. \"for 12000 rs\") to get a verdict."
                .to_string(),
        }
    }
}

/// Outcome recorded on an audit log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Error => "error",
        }
    }
}

/// Audit row written once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub id: String,
    pub query: String,
    pub price: i64,
    pub deep_search: bool,
    pub status: LogStatus,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A URL a user flagged as showing a wrong price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedUrl {
    pub id: String,
    pub url: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of one price request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceReport {
    pub query: String,
    pub item: String,
    /// Claimed (or, for direct URLs, detected) price; 0 when unknown.
    pub price: i64,
    pub location: Option<String>,
    pub analysis: AnalysisResult,
    pub confidence_score: u8,
    pub history: Vec<PriceEntry>,
    pub web_data: Vec<WebEvidence>,
    pub deep_search: bool,
    pub is_direct_url: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults_location() {
        let e = PriceEntry::new("iphone 12", 12000, None, AUTO_LOGGED);
        assert_eq!(e.location, "Unknown");
        assert_eq!(e.upvotes, 0);
        assert!(!e.is_trusted);

        let e = PriceEntry::new("iphone 12", 12000, Some("  "), AUTO_LOGGED);
        assert_eq!(e.location, "Unknown");
    }

    #[test]
    fn test_price_never_overwritten() {
        let mut ev = WebEvidence::new("t", "b", "https://www.amazon.in/x", "01 Jan 2026");
        assert_eq!(ev.source, "amazon.in");
        assert!(ev.set_price_if_unset("₹11,500"));
        assert!(!ev.set_price_if_unset("₹9,000"));
        assert_eq!(ev.price(), Some("₹11,500"));
    }

    #[test]
    fn test_blank_price_is_not_a_price() {
        let mut ev = WebEvidence::new("t", "b", "https://a.com", "");
        assert!(!ev.set_price_if_unset("  "));
        assert!(!ev.has_price());
    }

    #[test]
    fn test_trusted_source_normalized() {
        let src = TrustedSource::new("Amazon", "HTTPS://WWW.Amazon.in/", "retail", Some(""));
        assert_eq!(src.url, "https://www.amazon.in");
        assert_eq!(src.host().as_deref(), Some("amazon.in"));
        assert!(src.price_selector.is_none());

        let bare = TrustedSource::new("Flipkart", "flipkart.com", "retail", None);
        assert_eq!(bare.host().as_deref(), Some("flipkart.com"));
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(
            Verdict::from_concrete_label("fair deal"),
            Some(Verdict::FairDeal)
        );
        assert_eq!(Verdict::from_concrete_label("Analysis Pending"), None);
        let json = serde_json::to_string(&Verdict::LikelyOverpriced).unwrap();
        assert_eq!(json, "\"Likely Overpriced\"");
    }
}
