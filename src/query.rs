//! Free-text query parsing.
//!
//! Turns a query such as `"iphone 12 for ₹50k in New Delhi"` into an item
//! name, a claimed price and a location, or recognizes the whole query as a
//! direct product URL.
//!
//! Price patterns are tried in a fixed order and the first one that matches
//! wins:
//!
//! 1. Magnitude-suffixed amounts: `₹50k`, `1.2m rs` (×1,000 / ×1,000,000),
//!    only with a currency cue before or a currency word after.
//! 2. Plain amounts after a currency cue (`₹`, `Rs`, `INR`, `for`, `at`) or
//!    before a currency word (`rs`, `rupees`, `bucks`, `inr`).
//!
//! The matched span is cut out of the query so it does not pollute the item
//! name. Locations are capitalized words after `in`/`at`/`near`.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static DIRECT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://\S+$").expect("valid regex"));

/// A `k`/`m` amount needs a cue on one side, so `4k tv` or `2m cable` is
/// never read as a price.
static SUFFIXED_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(?:\bfor|\bat)\s+(?:₹|\brs\.?|\binr\b)?|₹|\brs\.?|\binr\b)\s*(\d+(?:\.\d+)?)\s*([km])\b(?:\s*(?:rs\b\.?|rupees\b|inr\b|bucks\b))?|\b(\d+(?:\.\d+)?)\s*([km])\s*(?:rs\b\.?|rupees\b|inr\b|bucks\b)",
    )
    .expect("valid regex")
});

static STANDARD_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(?:₹|\brs\.?|\binr\b|\bfor\b|\bat\b)\s*(\d{1,3}(?:,\d{2,3})+|\d+)\b(?:\s*(?:rs\b\.?|rupees\b|bucks\b|inr\b))?|\b(\d{1,3}(?:,\d{2,3})+|\d+)\s*(?:rs\b\.?|rupees\b|bucks\b|inr\b))",
    )
    .expect("valid regex")
});

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[Ii]n|[Aa]t|[Nn]ear)\s+([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*)")
        .expect("valid regex")
});

/// Words left dangling at either end once the price/location spans are cut.
const CONNECTORS: &[&str] = &["in", "at", "for", "near", "@", "-", ":"];

/// Structured intent extracted from a raw query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuery {
    pub is_direct_url: bool,
    pub item: String,
    /// Always > 0 when present.
    pub claimed_price: Option<i64>,
    pub location: Option<String>,
}

/// Parse a raw query.
///
/// A missing price is a normal outcome (`claimed_price: None`), not an error.
///
/// ```rust
/// use fairprice::query::parse;
///
/// let q = parse("iphone 12 for ₹50k");
/// assert_eq!(q.claimed_price, Some(50_000));
/// assert_eq!(q.item, "iphone 12");
/// ```
pub fn parse(query: &str) -> ParsedQuery {
    let trimmed = query.trim();

    if DIRECT_URL.is_match(trimmed) {
        return ParsedQuery {
            is_direct_url: true,
            item: trimmed.to_string(),
            claimed_price: None,
            location: None,
        };
    }

    let mut text = trimmed.to_string();
    let claimed_price = match extract_suffixed(&text).or_else(|| extract_standard(&text)) {
        Some((price, start, end)) => {
            text.replace_range(start..end, " ");
            Some(price)
        }
        None => None,
    };

    let found = LOCATION
        .captures(&text)
        .map(|caps| (caps.get(0).map(|m| m.range()).unwrap_or(0..0), caps[1].to_string()));
    let location = found.map(|(span, name)| {
        text.replace_range(span, " ");
        name
    });

    ParsedQuery {
        is_direct_url: false,
        item: clean_item(&text),
        claimed_price,
        location,
    }
}

/// `(price, span_start, span_end)` for the first magnitude-suffixed amount.
fn extract_suffixed(text: &str) -> Option<(i64, usize, usize)> {
    SUFFIXED_PRICE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let value: f64 = caps.get(1).or_else(|| caps.get(3))?.as_str().parse().ok()?;
        let suffix = caps.get(2).or_else(|| caps.get(4))?.as_str().to_lowercase();
        let multiplier = match suffix.as_str() {
            "k" => 1_000.0,
            "m" => 1_000_000.0,
            _ => return None,
        };
        positive(value * multiplier).map(|p| (p, whole.start(), whole.end()))
    })
}

fn extract_standard(text: &str) -> Option<(i64, usize, usize)> {
    STANDARD_PRICE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let digits = caps.get(1).or_else(|| caps.get(2))?.as_str().replace(',', "");
        let value: f64 = digits.parse().ok()?;
        positive(value).map(|p| (p, whole.start(), whole.end()))
    })
}

fn positive(value: f64) -> Option<i64> {
    let rounded = value.round();
    (rounded >= 1.0 && rounded < i64::MAX as f64).then_some(rounded as i64)
}

fn clean_item(text: &str) -> String {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    while words
        .last()
        .is_some_and(|w| CONNECTORS.contains(&w.to_lowercase().as_str()))
    {
        words.pop();
    }
    while words
        .first()
        .is_some_and(|w| CONNECTORS.contains(&w.to_lowercase().as_str()))
    {
        words.remove(0);
    }
    words.join(" ")
}
