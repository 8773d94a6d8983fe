//! Web search providers.
//!
//! Defines the [`WebSearcher`] trait and its implementations:
//! - **[`SerperSearcher`]**: Google results via `google.serper.dev`.
//! - **[`BraveSearcher`]**: the Brave Search web API.
//! - **[`FallbackSearcher`]**: tries a list of searchers in order.
//! - **[`DisabledSearcher`]**: always errors; used when no API key is set.
//!
//! API keys come from the environment as comma-separated lists
//! (`SERPER_API_KEYS`, `BRAVE_API_KEYS`) and are rotated per request through
//! a [`KeyRing`]. A key that is rejected or rate limited is skipped in favour
//! of the next one.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SearchConfig;

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    /// Provider-reported publication date, free-form.
    pub date: Option<String>,
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Provider name for logs (e.g. `"serper"`).
    fn name(&self) -> &str;
    async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchHit>>;
}

// ============ Key rotation ============

/// Round-robin API key rotation shared by all requests of one provider.
pub struct KeyRing {
    keys: Vec<String>,
    cursor: Mutex<usize>,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys,
            cursor: Mutex::new(0),
        }
    }

    /// Build a ring from a comma-separated environment variable.
    pub fn from_env(var: &str) -> Self {
        let raw = std::env::var(var).unwrap_or_default();
        Self::new(raw.split(',').map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The next key in rotation, or `None` when the ring is empty.
    pub fn next_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let key = self.keys[*cursor % self.keys.len()].clone();
        *cursor = (*cursor + 1) % self.keys.len();
        Some(key)
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Status codes after which the same request is retried with the next key.
fn is_key_problem(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 402 | 403 | 429)
}

// ============ Serper ============

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

pub struct SerperSearcher {
    keys: KeyRing,
    client: reqwest::Client,
}

impl SerperSearcher {
    pub fn new(keys: KeyRing, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            keys,
            client: build_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl WebSearcher for SerperSearcher {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({ "q": query, "num": max });

        for _ in 0..self.keys.len().max(1) {
            let Some(key) = self.keys.next_key() else {
                bail!("no Serper API key configured");
            };

            let resp = self
                .client
                .post(SERPER_ENDPOINT)
                .header("X-API-KEY", &key)
                .json(&body)
                .send()
                .await
                .context("Serper API request failed")?;

            let status = resp.status();
            if is_key_problem(status) {
                warn!(%status, "serper key rejected, rotating");
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                bail!("Serper API error {}: {}", status, text);
            }

            let data: SerperResponse = resp
                .json()
                .await
                .context("Failed to parse Serper response")?;
            let hits = serper_hits(data, max);
            info!(query, count = hits.len(), "serper search complete");
            return Ok(hits);
        }

        bail!("all Serper API keys were rejected")
    }
}

fn serper_hits(data: SerperResponse, max: usize) -> Vec<SearchHit> {
    data.organic
        .into_iter()
        .filter(|r| !r.link.is_empty())
        .take(max)
        .map(|r| SearchHit {
            title: r.title,
            snippet: r.snippet,
            url: r.link,
            date: r.date,
        })
        .collect()
}

// ============ Brave ============

pub struct BraveSearcher {
    keys: KeyRing,
    client: reqwest::Client,
}

impl BraveSearcher {
    pub fn new(keys: KeyRing, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            keys,
            client: build_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl WebSearcher for BraveSearcher {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchHit>> {
        // Brave caps `count` at 20
        let count = max.clamp(1, 20).to_string();

        for _ in 0..self.keys.len().max(1) {
            let Some(key) = self.keys.next_key() else {
                bail!("no Brave API key configured");
            };

            let resp = self
                .client
                .get(BRAVE_ENDPOINT)
                .query(&[("q", query), ("count", count.as_str())])
                .header("Accept", "application/json")
                .header("X-Subscription-Token", &key)
                .send()
                .await
                .context("Brave Search request failed")?;

            let status = resp.status();
            if is_key_problem(status) {
                warn!(%status, "brave key rejected, rotating");
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                bail!("Brave Search API error {}: {}", status, text);
            }

            let json: serde_json::Value = resp
                .json()
                .await
                .context("Failed to parse Brave response")?;
            let hits = brave_hits(&json, max);
            info!(query, count = hits.len(), "brave search complete");
            return Ok(hits);
        }

        bail!("all Brave API keys were rejected")
    }
}

fn brave_hits(json: &serde_json::Value, max: usize) -> Vec<SearchHit> {
    let Some(results) = json["web"]["results"].as_array() else {
        return Vec::new();
    };
    results
        .iter()
        .filter_map(|item| {
            let url = item["url"].as_str()?.trim();
            if url.is_empty() {
                return None;
            }
            Some(SearchHit {
                title: item["title"].as_str().unwrap_or("").trim().to_string(),
                snippet: item["description"].as_str().unwrap_or("").trim().to_string(),
                url: url.to_string(),
                date: item["page_age"]
                    .as_str()
                    .or_else(|| item["age"].as_str())
                    .map(str::to_string),
            })
        })
        .take(max)
        .collect()
}

// ============ Fallback / Disabled ============

/// Tries each searcher in order and returns the first non-empty answer.
///
/// An empty answer moves on to the next provider; if every provider fails,
/// the last error is returned.
pub struct FallbackSearcher {
    searchers: Vec<Arc<dyn WebSearcher>>,
}

impl FallbackSearcher {
    pub fn new(searchers: Vec<Arc<dyn WebSearcher>>) -> Self {
        Self { searchers }
    }
}

#[async_trait]
impl WebSearcher for FallbackSearcher {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchHit>> {
        let mut last_err = None;
        let mut answered = false;

        for searcher in &self.searchers {
            match searcher.search(query, max).await {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => answered = true,
                Err(e) => {
                    warn!(provider = searcher.name(), error = %e, "search provider failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

pub struct DisabledSearcher;

#[async_trait]
impl WebSearcher for DisabledSearcher {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>> {
        bail!("Web search is disabled: no provider has an API key")
    }
}

/// Build the configured searcher chain.
///
/// Providers without keys are skipped with a warning; with none left the
/// result is a [`DisabledSearcher`].
pub fn create_searcher(config: &SearchConfig) -> Result<Arc<dyn WebSearcher>> {
    let mut searchers: Vec<Arc<dyn WebSearcher>> = Vec::new();

    for provider in &config.providers {
        match provider.as_str() {
            "serper" => {
                let keys = KeyRing::from_env("SERPER_API_KEYS");
                if keys.is_empty() {
                    warn!("SERPER_API_KEYS not set; skipping serper");
                    continue;
                }
                searchers.push(Arc::new(SerperSearcher::new(keys, config.timeout_secs)?));
            }
            "brave" => {
                let keys = KeyRing::from_env("BRAVE_API_KEYS");
                if keys.is_empty() {
                    warn!("BRAVE_API_KEYS not set; skipping brave");
                    continue;
                }
                searchers.push(Arc::new(BraveSearcher::new(keys, config.timeout_secs)?));
            }
            other => bail!("Unknown search provider: {}", other),
        }
    }

    Ok(match searchers.len() {
        0 => Arc::new(DisabledSearcher),
        1 => searchers.remove(0),
        _ => Arc::new(FallbackSearcher::new(searchers)),
    })
}
