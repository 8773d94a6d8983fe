//! Per-result price resolution.
//!
//! Search snippets rarely carry a clean price, so each [`WebEvidence`] goes
//! through a ladder of increasingly expensive stages until one produces a
//! price. A stage never overwrites a price set by an earlier one.
//!
//! # Standard mode ([`PriceResolver::resolve`])
//!
//! 1. **Batch AI extraction**: one oracle call covering every snippet. The
//!    oracle answers per index with a price, or with a `suggestedUrl` when the
//!    snippet points at a page that probably shows one.
//! 2. **Full-page escalation**: items still unpriced (or priced with a
//!    suspiciously short string) have their page fetched, the first
//!    `escalation_chars` characters shown to the oracle, and then the local
//!    extractor run over the page, using the host's trusted CSS selector when
//!    the reader returned markup.
//!    Items escalate concurrently, at most `escalation_concurrency` at once.
//! 3. **Local pass**: the regex extractor over the body, then the title.
//!
//! # Deep mode ([`PriceResolver::resolve_deep`])
//!
//! Bodies are already full page text. Each item gets its own oracle call;
//! when the oracle suggests a better page, that page is fetched once (never
//! followed further), becomes the item's url/body, and is re-examined. The
//! regex extractor is the backstop on title and body.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::extract::{extract_price, format_inr};
use crate::models::{bare_host, WebEvidence};
use crate::oracle::{ask_json, Oracle};
use crate::reader::{truncate_chars, Page, PageReader};
use crate::store::Store;

/// Prices shorter than this (e.g. `₹500`) are treated as possibly truncated
/// or misread and stay eligible for escalation.
const SUSPECT_PRICE_CHARS: usize = 7;

const BATCH_SYSTEM: &str = "You extract current selling prices in Indian Rupees from search results. \
Reply with JSON only: {\"results\": [{\"index\": <n>, \"price\": \"₹<amount>\" or null, \
\"suggestedUrl\": \"<url>\" or null}]}. Use one entry per result index. Ignore EMI amounts, \
discounts, savings and exchange offers. When a snippet has no price but its page likely shows \
one, give that page as suggestedUrl.";

const PAGE_SYSTEM: &str = "You extract the current selling price in Indian Rupees of a product \
from page text. Reply with JSON only: {\"price\": \"₹<amount>\" or null, \
\"suggestedUrl\": \"<url>\" or null}. Ignore EMI amounts, discounts, savings and exchange \
offers. If this page does not show the price but links to a page that does, give that link \
as suggestedUrl.";

#[derive(Debug, Default, Deserialize)]
struct BatchReply {
    #[serde(default)]
    results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
struct BatchItem {
    index: usize,
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default, rename = "suggestedUrl")]
    suggested_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PageReply {
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default, rename = "suggestedUrl")]
    suggested_url: Option<String>,
}

/// Normalize an oracle-provided price. Strings without a digit are no price.
fn price_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if !s.chars().any(|c| c.is_ascii_digit()) {
                return None;
            }
            if s.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
                Some(format!("₹{}", s))
            } else {
                Some(s.to_string())
            }
        }
        serde_json::Value::Number(n) => {
            let amount = n.as_f64()?.round();
            (amount >= 1.0).then(|| format_inr(amount as i64))
        }
        _ => None,
    }
}

fn usable_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string()).filter(|u| {
        url::Url::parse(u)
            .map(|p| matches!(p.scheme(), "http" | "https"))
            .unwrap_or(false)
    })
}

fn is_suspect(ev: &WebEvidence) -> bool {
    ev.price()
        .map(|p| p.chars().count() < SUSPECT_PRICE_CHARS)
        .unwrap_or(true)
}

pub struct PriceResolver {
    oracle: Arc<dyn Oracle>,
    reader: Arc<dyn PageReader>,
    store: Arc<dyn Store>,
    limits: PipelineConfig,
}

impl PriceResolver {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        reader: Arc<dyn PageReader>,
        store: Arc<dyn Store>,
        limits: PipelineConfig,
    ) -> Self {
        Self {
            oracle,
            reader,
            store,
            limits,
        }
    }

    /// Host → CSS price selector for active trusted sources.
    pub(crate) async fn selectors(&self) -> HashMap<String, String> {
        match self.store.list_trusted_sources(true).await {
            Ok(sources) => sources
                .into_iter()
                .filter_map(|s| Some((s.host()?, s.price_selector?)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "could not load trusted selectors");
                HashMap::new()
            }
        }
    }

    /// Standard-mode resolution. Order and length of `evidence` are preserved.
    pub async fn resolve(&self, item: &str, mut evidence: Vec<WebEvidence>) -> Vec<WebEvidence> {
        if evidence.is_empty() {
            return evidence;
        }
        let selectors = self.selectors().await;

        // Stage 1: batch AI extraction
        let suggested = self.batch_extract(item, &mut evidence).await;

        // Stage 2: full-page escalation
        let targets: Vec<(usize, String)> = evidence
            .iter()
            .enumerate()
            .filter(|(_, ev)| is_suspect(ev))
            .map(|(i, ev)| {
                let url = suggested.get(&i).cloned().unwrap_or_else(|| ev.url.clone());
                (i, url)
            })
            .collect();

        if !targets.is_empty() {
            debug!(item, count = targets.len(), "escalating to full pages");
            let found: Vec<(usize, Option<String>)> = stream::iter(targets)
                .map(|(i, url)| {
                    let selectors = &selectors;
                    async move { (i, self.escalate(item, &url, selectors).await) }
                })
                .buffered(self.limits.escalation_concurrency.max(1))
                .collect()
                .await;

            for (i, price) in found {
                if let Some(price) = price {
                    evidence[i].set_price_if_unset(price);
                }
            }
        }

        // Stage 3: local pass
        for ev in evidence.iter_mut().filter(|ev| !ev.has_price()) {
            let selector = selectors.get(&ev.source).map(String::as_str);
            if let Some(price) =
                extract_price(&ev.body, selector).or_else(|| extract_price(&ev.title, None))
            {
                ev.set_price_if_unset(price);
            }
        }

        let priced = evidence.iter().filter(|ev| ev.has_price()).count();
        info!(item, total = evidence.len(), priced, "prices resolved");
        evidence
    }

    /// Returns index → suggested URL for items the oracle could not price.
    async fn batch_extract(
        &self,
        item: &str,
        evidence: &mut [WebEvidence],
    ) -> HashMap<usize, String> {
        let listing: Vec<String> = evidence
            .iter()
            .enumerate()
            .map(|(i, ev)| format!("[{}] {} | {} | {}", i, ev.title, ev.url, ev.body))
            .collect();
        let user = format!("Product: {}\n\nResults:\n{}", item, listing.join("\n"));

        let reply: BatchReply = match ask_json(self.oracle.as_ref(), BATCH_SYSTEM, &user).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(item, error = %e, "batch price extraction unavailable");
                return HashMap::new();
            }
        };

        let mut suggested = HashMap::new();
        for entry in reply.results {
            let Some(ev) = evidence.get_mut(entry.index) else {
                continue;
            };
            if let Some(price) = entry.price.as_ref().and_then(price_text) {
                ev.set_price_if_unset(price);
            }
            if let Some(url) = usable_url(entry.suggested_url) {
                suggested.insert(entry.index, url);
            }
        }
        suggested
    }

    /// Fetch one page and look for a price: oracle first, then the local
    /// extractor with the host's selector. Any failure is `None`.
    async fn escalate(
        &self,
        item: &str,
        url: &str,
        selectors: &HashMap<String, String>,
    ) -> Option<String> {
        let page = match self.reader.read(url).await {
            Ok(page) => page,
            Err(e) => {
                debug!(url, error = %e, "escalation fetch failed");
                return None;
            }
        };

        let excerpt = truncate_chars(&page.text, self.limits.escalation_chars);
        if let Some(price) = self.page_extract(item, &excerpt).await.0 {
            return Some(price);
        }

        let selector = bare_host(&page.url).and_then(|h| selectors.get(&h).cloned());
        page_price(&page, selector.as_deref())
    }

    /// One oracle call over one page of text: `(price, suggested_url)`.
    async fn page_extract(&self, item: &str, text: &str) -> (Option<String>, Option<String>) {
        let user = format!("Product: {}\n\nPage text:\n{}", item, text);
        match ask_json::<PageReply>(self.oracle.as_ref(), PAGE_SYSTEM, &user).await {
            Ok(reply) => (
                reply.price.as_ref().and_then(price_text),
                usable_url(reply.suggested_url),
            ),
            Err(e) => {
                debug!(item, error = %e, "page price extraction unavailable");
                (None, None)
            }
        }
    }

    /// Deep-mode resolution with one level of drill-down.
    pub async fn resolve_deep(&self, item: &str, evidence: Vec<WebEvidence>) -> Vec<WebEvidence> {
        if evidence.is_empty() {
            return evidence;
        }
        let selectors = self.selectors().await;

        let resolved: Vec<WebEvidence> = stream::iter(evidence)
            .map(|ev| {
                let selectors = &selectors;
                async move { self.resolve_one_deep(item, ev, selectors).await }
            })
            .buffered(self.limits.escalation_concurrency.max(1))
            .collect()
            .await;

        let priced = resolved.iter().filter(|ev| ev.has_price()).count();
        info!(item, total = resolved.len(), priced, "deep prices resolved");
        resolved
    }

    async fn resolve_one_deep(
        &self,
        item: &str,
        mut ev: WebEvidence,
        selectors: &HashMap<String, String>,
    ) -> WebEvidence {
        let (price, suggested) = self.page_extract(item, &ev.body).await;
        if let Some(price) = price {
            ev.set_price_if_unset(price);
        } else if let Some(target) = suggested.filter(|u| *u != ev.url) {
            match self.reader.read(&target).await {
                Ok(page) => {
                    let body = truncate_chars(&page.text, self.limits.deep_body_chars);
                    ev.retarget(&page.url, &body);
                    let excerpt = truncate_chars(&page.text, self.limits.escalation_chars);
                    // Drill-down stops here even if another URL is suggested
                    if let Some(price) = self.page_extract(item, &excerpt).await.0 {
                        ev.set_price_if_unset(price);
                    } else {
                        let selector = selectors.get(&ev.source).map(String::as_str);
                        if let Some(price) = page_price(&page, selector) {
                            ev.set_price_if_unset(price);
                        }
                    }
                }
                Err(e) => debug!(url = %target, error = %e, "drill-down fetch failed"),
            }
        }

        if !ev.has_price() {
            if let Some(price) =
                extract_price(&ev.title, None).or_else(|| extract_price(&ev.body, None))
            {
                ev.set_price_if_unset(price);
            }
        }
        ev
    }
}

/// Price on a fetched page. The selector only applies to real markup; a
/// reader that returned text alone gets the pattern ladder.
pub(crate) fn page_price(page: &Page, selector: Option<&str>) -> Option<String> {
    match &page.html {
        Some(html) => extract_price(html, selector).or_else(|| extract_price(&page.text, None)),
        None => extract_price(&page.text, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrustedSource;
    use crate::oracle::testing::FnOracle;
    use crate::oracle::{DisabledOracle, OracleError};
    use crate::store::memory::InMemoryStore;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves canned pages and records every URL requested.
    #[derive(Default)]
    struct CannedReader {
        pages: HashMap<String, Page>,
        requested: Mutex<Vec<String>>,
    }

    impl CannedReader {
        fn with(mut self, url: &str, text: &str, html: Option<&str>) -> Self {
            self.pages.insert(
                url.to_string(),
                Page {
                    url: url.to_string(),
                    text: text.to_string(),
                    html: html.map(String::from),
                },
            );
            self
        }
    }

    #[async_trait]
    impl PageReader for CannedReader {
        fn name(&self) -> &str {
            "canned"
        }
        async fn read(&self, url: &str) -> Result<Page> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(page) => Ok(page.clone()),
                None => bail!("404 {}", url),
            }
        }
    }

    fn ev(title: &str, body: &str, url: &str) -> WebEvidence {
        WebEvidence::new(title, body, url, "01 Jan 2026")
    }

    fn resolver(oracle: Arc<dyn Oracle>, reader: Arc<CannedReader>, store: Arc<InMemoryStore>) -> PriceResolver {
        PriceResolver::new(oracle, reader, store, PipelineConfig::default())
    }

    fn disabled() -> Arc<dyn Oracle> {
        Arc::new(DisabledOracle::new("test"))
    }

    #[tokio::test]
    async fn test_local_pass_without_oracle() {
        let reader = Arc::new(CannedReader::default());
        let r = resolver(disabled(), reader, Arc::new(InMemoryStore::new()));
        let out = r
            .resolve(
                "iphone 12",
                vec![
                    ev("iPhone 12 64GB", "Buy now at ₹11,500 with free delivery", "https://a.com/1"),
                    ev("iPhone 12 at ₹12,999", "Great phone", "https://b.com/1"),
                    ev("Reviews", "No price here", "https://c.com/1"),
                ],
            )
            .await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].price(), Some("₹11,500"));
        assert_eq!(out[1].price(), Some("₹12,999"));
        assert_eq!(out[2].price(), None);
    }

    #[tokio::test]
    async fn test_batch_prices_win_and_escalation_fills_gaps() {
        let oracle = Arc::new(FnOracle::new(|user: &str| {
            if user.contains("Results:") {
                Ok(r#"{"results": [
                    {"index": 0, "price": "₹11,499"},
                    {"index": 1, "price": null, "suggestedUrl": "https://shop.com/product"}
                ]}"#
                .to_string())
            } else {
                Err(OracleError::Malformed("no page answers".into()))
            }
        }));
        let reader = Arc::new(
            CannedReader::default().with("https://shop.com/product", "Pixel 8 now ₹52,999", None),
        );
        let r = resolver(oracle.clone(), reader.clone(), Arc::new(InMemoryStore::new()));

        let out = r
            .resolve(
                "pixel 8",
                vec![
                    // The local pass would find ₹10,000 here; the oracle's answer stays
                    ev("Pixel 8", "was ₹10,000", "https://a.com/1"),
                    ev("Pixel 8 deals", "see listing", "https://shop.com/listing"),
                ],
            )
            .await;

        assert_eq!(out[0].price(), Some("₹11,499"));
        assert_eq!(out[1].price(), Some("₹52,999"));
        let requested = reader.requested.lock().unwrap();
        assert_eq!(*requested, vec!["https://shop.com/product".to_string()]);
    }

    #[tokio::test]
    async fn test_suspect_price_kept_even_after_escalation() {
        let oracle = Arc::new(FnOracle::new(|user: &str| {
            if user.contains("Results:") {
                Ok(r#"{"results": [{"index": 0, "price": 500}]}"#.to_string())
            } else {
                Ok(r#"{"price": "₹45,000"}"#.to_string())
            }
        }));
        let reader = Arc::new(CannedReader::default().with("https://a.com/1", "page", None));
        let r = resolver(oracle, reader.clone(), Arc::new(InMemoryStore::new()));
        let out = r.resolve("x", vec![ev("x", "y", "https://a.com/1")]).await;

        // Escalated, but the first stage's price is never discarded
        assert_eq!(reader.requested.lock().unwrap().len(), 1);
        assert_eq!(out[0].price(), Some("₹500"));
    }

    #[tokio::test]
    async fn test_escalation_uses_trusted_selector() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_trusted_source(&TrustedSource::new(
                "Shop",
                "https://shop.com",
                "retail",
                Some("span.final"),
            ))
            .await
            .unwrap();
        let html = r#"<p>Save ₹3,000</p><span class="final">27,999</span>"#;
        let reader = Arc::new(CannedReader::default().with("https://www.shop.com/p", "Save ₹3,000 27,999", Some(html)));
        let r = resolver(disabled(), reader, store);
        let out = r.resolve("tv", vec![ev("TV", "listing", "https://www.shop.com/p")]).await;
        assert_eq!(out[0].price(), Some("₹27,999"));
    }

    #[tokio::test]
    async fn test_selector_ignored_for_text_only_page() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_trusted_source(&TrustedSource::new(
                "Shop",
                "https://shop.com",
                "retail",
                Some("span.deal"),
            ))
            .await
            .unwrap();
        // Reader returned text with stray markup but no HTML document
        let text = r#"Price ₹1,299 <span class="deal">₹27,999</span>"#;
        let reader = Arc::new(CannedReader::default().with("https://www.shop.com/p", text, None));
        let r = resolver(disabled(), reader, store);
        let out = r.resolve("tv", vec![ev("TV", "listing", "https://www.shop.com/p")]).await;
        assert_eq!(out[0].price(), Some("₹1,299"));
    }

    #[test]
    fn test_page_price_applies_selector_to_markup() {
        let page = Page {
            url: "https://shop.com/p".into(),
            text: "Price ₹1,299 ₹27,999".into(),
            html: Some(r#"<p>Price ₹1,299</p><span class="deal">₹27,999</span>"#.into()),
        };
        assert_eq!(page_price(&page, Some("span.deal")).as_deref(), Some("₹27,999"));
        assert_eq!(page_price(&page, None).as_deref(), Some("₹1,299"));
    }

    #[tokio::test]
    async fn test_failed_escalation_is_local_to_item() {
        let reader = Arc::new(CannedReader::default().with("https://ok.com/1", "Price ₹7,499", None));
        let r = resolver(disabled(), reader, Arc::new(InMemoryStore::new()));
        let out = r
            .resolve(
                "kettle",
                vec![
                    ev("Kettle", "snippet", "https://down.com/1"),
                    ev("Kettle", "snippet", "https://ok.com/1"),
                ],
            )
            .await;
        assert_eq!(out[0].price(), None);
        assert_eq!(out[1].price(), Some("₹7,499"));
    }

    #[tokio::test]
    async fn test_out_of_range_indices_ignored() {
        let oracle = Arc::new(FnOracle::new(|_: &str| {
            Ok(r#"{"results": [{"index": 7, "price": "₹99,999"}]}"#.to_string())
        }));
        let r = resolver(oracle, Arc::new(CannedReader::default()), Arc::new(InMemoryStore::new()));
        let out = r.resolve("x", vec![ev("x", "nothing", "https://a.com")]).await;
        assert_eq!(out[0].price(), None);
    }

    #[tokio::test]
    async fn test_deep_drill_down_one_level() {
        let oracle = Arc::new(FnOracle::new(|user: &str| {
            if user.contains("landing page") {
                Ok(r#"{"price": null, "suggestedUrl": "https://shop.com/item"}"#.to_string())
            } else if user.contains("product page") {
                Ok(r#"{"price": null, "suggestedUrl": "https://shop.com/deeper"}"#.to_string())
            } else {
                Ok(r#"{"price": null}"#.to_string())
            }
        }));
        let reader = Arc::new(
            CannedReader::default()
                .with("https://shop.com/item", "product page: Price ₹64,900", None)
                .with("https://shop.com/deeper", "never read", None),
        );
        let r = resolver(oracle, reader.clone(), Arc::new(InMemoryStore::new()));
        let out = r
            .resolve_deep("ipad", vec![ev("iPad", "landing page", "https://www.blog.com/post")])
            .await;

        assert_eq!(out[0].url, "https://shop.com/item");
        assert_eq!(out[0].source, "shop.com");
        assert_eq!(out[0].body, "product page: Price ₹64,900");
        assert_eq!(out[0].price(), Some("₹64,900"));
        assert_eq!(*reader.requested.lock().unwrap(), vec!["https://shop.com/item".to_string()]);
    }

    #[tokio::test]
    async fn test_deep_regex_backstop() {
        let r = resolver(disabled(), Arc::new(CannedReader::default()), Arc::new(InMemoryStore::new()));
        let out = r
            .resolve_deep(
                "ipad",
                vec![
                    ev("iPad at ₹34,900", "body ₹1,00,000", "https://a.com"),
                    ev("iPad", "full text, Price: ₹33,500", "https://b.com"),
                ],
            )
            .await;
        assert_eq!(out[0].price(), Some("₹34,900"));
        assert_eq!(out[1].price(), Some("₹33,500"));
    }

    #[test]
    fn test_price_text_normalization() {
        assert_eq!(price_text(&serde_json::json!("11500")), Some("₹11500".to_string()));
        assert_eq!(price_text(&serde_json::json!(119999)), Some("₹1,19,999".to_string()));
        assert_eq!(price_text(&serde_json::json!("not listed")), None);
        assert_eq!(price_text(&serde_json::json!(null)), None);
    }
}
