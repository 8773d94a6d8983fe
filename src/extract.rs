//! Heuristic price detection in free text and HTML.
//!
//! [`extract_price`] locates the first plausible price in a snippet or page
//! and returns it as a `₹`-prefixed display string. Listing pages are full of
//! numbers that look like prices but are not (EMI instalments, discounts,
//! result counts), so every candidate is checked against its surrounding
//! text before it is accepted.
//!
//! # Pattern ladder
//!
//! Patterns are tried in this order; within a pattern, matches are tried
//! left to right. The first candidate that passes validation wins.
//!
//! | # | Shape | Example |
//! |---|-------|---------|
//! | 1 | comma-grouped number | `1,19,999` |
//! | 2 | currency prefix, optional k/m/b or lakh/crore | `Rs. 4500`, `₹50k`, `₹1.2 Lakh` |
//! | 3 | currency suffix | `4500 rupees` |
//! | 4 | lakh / crore | `1.2 Lakh`, `₹2 Cr` |
//! | 5 | bare number, 5+ digits | `45999` |
//!
//! # Validation
//!
//! A candidate is rejected when the 50 characters on either side contain
//! `emi`, `exchange`, or a negative keyword (`save`, `off`, `under`, `upto`,
//! `discount`, `results`, `items`, `models`, `products`, `reviews`,
//! `ratings`, `more than`, `over`). Unlike a plain substring test, keywords
//! match whole words only: `offer` and `premium` do not trigger, while
//! `off` and `EMI` do. When the whole text carries no comma
//! and no currency marker, amounts below 5000 are rejected as too likely to
//! be model numbers or counts.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

const WINDOW_CHARS: usize = 50;
const BARE_MINIMUM: f64 = 5000.0;

static PATTERNS: LazyLock<[Regex; 5]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)(?:₹|\brs\.?|\binr)?\s*\d{1,3}(?:,\d{2,3})+(?:\.\d+)?")
            .expect("valid regex"),
        Regex::new(
            r"(?i)(?:₹|\brs\.?|\binr\b)\s*\d+(?:\.\d+)?(?:\s*(?:lakhs?|lacs?|crores?|cr)\b|\s*[kmb]\b)?",
        )
            .expect("valid regex"),
        Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:rs\b\.?|rupees\b|inr\b|bucks\b)")
            .expect("valid regex"),
        Regex::new(r"(?i)(?:₹|\brs\.?|\binr\b)?\s*\d+(?:\.\d+)?\s*(?:lakhs?|lacs?|crores?|cr)\b")
            .expect("valid regex"),
        Regex::new(r"\b\d{5,}\b").expect("valid regex"),
    ]
});

static FINANCING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:emi|exchange)\b").expect("valid regex"));

static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:save|off|under|upto|discount|results|items|models|products|reviews|ratings|more\s+than|over)\b",
    )
    .expect("valid regex")
});

static CURRENCY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)₹|\brs\b|\binr\b|\brupees?\b").expect("valid regex"));

static CURRENCY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)₹|\brs\b\.?|\binr\b|\brupees\b|\bbucks\b").expect("valid regex")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(lakhs?|lacs?|crores?|cr|k|m|b)?\b").expect("valid regex")
});

/// Find the first plausible price in `text`.
///
/// When `selector` is given, `text` is first parsed as HTML and the first
/// element matching the CSS selector is used if it contains a digit. An
/// invalid selector or an empty match falls through to the pattern ladder.
pub fn extract_price(text: &str, selector: Option<&str>) -> Option<String> {
    if let Some(found) = selector.and_then(|sel| select_price(text, sel)) {
        return Some(found);
    }

    let has_marker = text.contains(',') || CURRENCY_MARKER.is_match(text);

    for pattern in PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let candidate = m.as_str().trim();
            if candidate.is_empty() {
                continue;
            }
            let Some(amount) = price_amount(candidate) else {
                continue;
            };
            if amount <= 0.0 {
                continue;
            }
            if !has_marker && amount < BARE_MINIMUM {
                continue;
            }
            let context = window(text, m.start(), m.end());
            if FINANCING.is_match(&context) || NEGATIVE.is_match(&context) {
                continue;
            }
            return Some(display(candidate));
        }
    }

    None
}

fn select_price(html: &str, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let doc = Html::parse_document(html);
    let element = doc.select(&selector).next()?;
    let text = element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        Some(format!("₹{}", text))
    } else {
        Some(text)
    }
}

/// The matched span plus up to 50 characters on each side.
fn window(text: &str, start: usize, end: usize) -> String {
    let before: String = {
        let chars: Vec<char> = text[..start].chars().rev().take(WINDOW_CHARS).collect();
        chars.into_iter().rev().collect()
    };
    let after: String = text[end..].chars().take(WINDOW_CHARS).collect();
    format!("{}{}{}", before, &text[start..end], after)
}

/// Normalize a matched candidate into a `₹`-prefixed display string.
fn display(candidate: &str) -> String {
    let stripped = CURRENCY_WORDS.replace_all(candidate, "");
    let stripped = stripped.trim().trim_start_matches('.').trim();
    format!("₹{}", stripped)
}

/// Numeric value of a price string such as `₹1,19,999`, `₹50k`,
/// `₹1.2 Lakh` or `Rs 2 Cr`.
///
/// ```rust
/// use fairprice::extract::price_amount;
///
/// assert_eq!(price_amount("₹1,19,999"), Some(119_999.0));
/// assert_eq!(price_amount("₹1.2 Lakh"), Some(120_000.0));
/// assert_eq!(price_amount("no digits"), None);
/// ```
pub fn price_amount(price: &str) -> Option<f64> {
    let cleaned = price.replace(',', "");
    let caps = AMOUNT.captures(&cleaned)?;
    let value: f64 = caps[1].parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        None => 1.0,
        Some(suffix) => match suffix.as_str() {
            "k" => 1_000.0,
            "m" => 1_000_000.0,
            "b" => 1_000_000_000.0,
            "lakh" | "lakhs" | "lac" | "lacs" => 100_000.0,
            _ => 10_000_000.0,
        },
    };
    Some(value * multiplier)
}

/// Format a whole amount with Indian digit grouping: `119999` → `₹1,19,999`.
pub fn format_inr(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let digits = amount.unsigned_abs().to_string();
    if digits.len() <= 3 {
        return format!("{}₹{}", sign, digits);
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    groups.push(rest);
    groups.reverse();

    format!("{}₹{},{}", sign, groups.join(","), tail)
}
