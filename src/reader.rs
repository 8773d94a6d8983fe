//! Page content readers.
//!
//! A [`PageReader`] turns a URL into readable text. Two independent paths
//! exist so that one failing does not leave an item without a page:
//!
//! - **[`JinaReader`]**: a readability service (`r.jina.ai`) that renders
//!   the page and returns clean text. `JINA_API_KEY` is optional.
//! - **[`DirectFetcher`]**: a plain HTTP GET, with the HTML reduced to text
//!   locally via `scraper`. Keeps the raw HTML so CSS price selectors work.
//!
//! [`ReaderChain`] tries a primary reader and falls back to a secondary one.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ReaderConfig;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const MAX_DOWNLOAD_BYTES: usize = 512_000;
const MAX_TEXT_CHARS: usize = 20_000;

/// Readable content of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub text: String,
    /// Raw markup when the reader had access to it.
    pub html: Option<String>,
}

#[async_trait]
pub trait PageReader: Send + Sync {
    fn name(&self) -> &str;
    async fn read(&self, url: &str) -> Result<Page>;
}

// ============ Jina ============

pub struct JinaReader {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl JinaReader {
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var("JINA_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            client,
        })
    }
}

#[async_trait]
impl PageReader for JinaReader {
    fn name(&self) -> &str {
        "jina"
    }

    async fn read(&self, url: &str) -> Result<Page> {
        let endpoint = format!("{}/{}", self.base_url, url);
        let mut request = self.client.get(&endpoint).header("Accept", "text/plain");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.context("reader request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("reader returned HTTP {} for {}", status, url);
        }

        let text = resp.text().await.context("failed to read reader body")?;
        let text = truncate_chars(text.trim(), MAX_TEXT_CHARS);
        if text.is_empty() {
            bail!("reader returned an empty page for {}", url);
        }

        Ok(Page {
            url: url.to_string(),
            text,
            html: None,
        })
    }
}

// ============ Direct HTTP ============

pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageReader for DirectFetcher {
    fn name(&self) -> &str {
        "direct"
    }

    async fn read(&self, url: &str) -> Result<Page> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "text/html")
            .send()
            .await
            .with_context(|| format!("fetch failed: {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, url);
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty()
            && !content_type.contains("text/html")
            && !content_type.contains("text/plain")
        {
            bail!("unsupported content type: {}", content_type);
        }

        let mut body = resp.text().await.context("failed to read body")?;
        if body.len() > MAX_DOWNLOAD_BYTES {
            let mut end = MAX_DOWNLOAD_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        let text = html_to_text(&body, MAX_TEXT_CHARS);
        if text.is_empty() {
            bail!("page contained no extractable text: {}", url);
        }

        Ok(Page {
            url: url.to_string(),
            text,
            html: Some(body),
        })
    }
}

// ============ Chain ============

/// Primary reader with a secondary fallback.
pub struct ReaderChain {
    primary: Arc<dyn PageReader>,
    secondary: Arc<dyn PageReader>,
}

impl ReaderChain {
    pub fn new(primary: Arc<dyn PageReader>, secondary: Arc<dyn PageReader>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl PageReader for ReaderChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn read(&self, url: &str) -> Result<Page> {
        match self.primary.read(url).await {
            Ok(page) => Ok(page),
            Err(e) => {
                debug!(url, reader = self.primary.name(), error = %e, "primary reader failed");
                self.secondary.read(url).await
            }
        }
    }
}

/// Build the reader configured in `[reader]`. `jina` is chained with the
/// direct fetcher; `direct` is used alone.
pub fn create_reader(config: &ReaderConfig) -> Result<Arc<dyn PageReader>> {
    let direct: Arc<dyn PageReader> = Arc::new(DirectFetcher::new(config)?);
    match config.provider.as_str() {
        "jina" => Ok(Arc::new(ReaderChain::new(
            Arc::new(JinaReader::new(config)?),
            direct,
        ))),
        "direct" => Ok(direct),
        other => bail!("Unknown reader provider: {}", other),
    }
}

// ============ Text helpers ============

/// The first `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Readable text of an HTML document.
///
/// Prefers `<main>`/`<article>` when they carry real content, else `<body>`,
/// skipping script, style and navigation subtrees.
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let doc = Html::parse_document(html);

    for sel in ["main", "article", "[role=\"main\"]", "body"] {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            let mut buf = String::new();
            collect_text(&el, &mut buf, max_chars * 2);
            let text = collapse_whitespace(&buf);
            if text.chars().count() >= 100 || sel == "body" {
                return truncate_chars(&text, max_chars);
            }
        }
    }

    let raw: String = doc.root_element().text().collect();
    truncate_chars(&collapse_whitespace(&raw), max_chars)
}

fn collect_text(node: &ElementRef<'_>, buf: &mut String, limit: usize) {
    const SKIP: &[&str] = &[
        "script", "style", "nav", "header", "footer", "noscript", "svg", "iframe", "form",
    ];
    const BLOCK: &[&str] = &[
        "p", "div", "br", "h1", "h2", "h3", "h4", "li", "tr", "td", "section", "span",
    ];

    for child in node.children() {
        if buf.len() >= limit {
            return;
        }
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(el) => {
                if SKIP.contains(&el.name()) {
                    continue;
                }
                if BLOCK.contains(&el.name()) {
                    buf.push(' ');
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(&child_ref, buf, limit);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;
    struct Fixed(&'static str);

    #[async_trait]
    impl PageReader for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn read(&self, url: &str) -> Result<Page> {
            bail!("cannot read {}", url)
        }
    }

    #[async_trait]
    impl PageReader for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn read(&self, url: &str) -> Result<Page> {
            Ok(Page {
                url: url.to_string(),
                text: self.0.to_string(),
                html: None,
            })
        }
    }

    #[tokio::test]
    async fn test_chain_falls_back() {
        let chain = ReaderChain::new(Arc::new(Failing), Arc::new(Fixed("fallback text")));
        let page = chain.read("https://a.com").await.unwrap();
        assert_eq!(page.text, "fallback text");

        let chain = ReaderChain::new(Arc::new(Fixed("primary")), Arc::new(Failing));
        assert_eq!(chain.read("https://a.com").await.unwrap().text, "primary");
    }

    #[tokio::test]
    async fn test_chain_both_fail() {
        let chain = ReaderChain::new(Arc::new(Failing), Arc::new(Failing));
        assert!(chain.read("https://a.com").await.is_err());
    }

    #[test]
    fn test_html_to_text_skips_noise() {
        let html = r#"<html><head><style>.x{}</style></head><body>
            <nav>Home | Deals</nav>
            <script>var price = 1;</script>
            <h1>Pixel 8</h1><p>Price: <b>₹52,999</b></p>
            <footer>© shop</footer></body></html>"#;
        let text = html_to_text(html, 1000);
        assert_eq!(text, "Pixel 8 Price: ₹52,999");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("₹₹₹₹", 2), "₹₹");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
