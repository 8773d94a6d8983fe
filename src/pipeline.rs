//! The price-request pipeline.
//!
//! [`RequestOrchestrator::process_price_request`] is the single entry point
//! used by the CLI and the HTTP server:
//!
//! ```text
//! query ─► parse ─┬─► direct URL ─► read page ─► extract ─► pending report
//!                 │
//!                 └─► history lookup ─┐
//!                     web evidence ───┴─► (claimed price?) ─► verdict ─► score
//!                     + price resolve                          │
//!                                                              └─► remember entry
//! ```
//!
//! History and web gathering run concurrently. Without a claimed price the
//! report carries the evidence with an `Analysis Pending` result. Every
//! request writes one audit [`RequestLog`]; failing to write it is an error.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::confidence;
use crate::config::{Config, PipelineConfig, SearchConfig};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::evidence::{display_date, EvidenceFetcher};
use crate::extract::{format_inr, price_amount};
use crate::models::{
    bare_host, AnalysisResult, ConfidenceTier, LogStatus, PriceEntry, PriceReport, RequestLog,
    Verdict, WebEvidence, AUTO_LOGGED,
};
use crate::oracle::{create_oracle, Oracle};
use crate::query::{self, ParsedQuery};
use crate::reader::{create_reader, truncate_chars, PageReader};
use crate::resolver::{page_price, PriceResolver};
use crate::similarity::SimilarityMemory;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::verdict::VerdictSynthesizer;
use crate::websearch::{create_searcher, WebSearcher};

/// Minimum item length (in characters) for an auto-logged entry.
const MIN_ITEM_CHARS: usize = 3;

/// External collaborators the pipeline runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub embedder: Arc<dyn Embedder>,
    pub oracle: Arc<dyn Oracle>,
    pub searcher: Arc<dyn WebSearcher>,
    pub reader: Arc<dyn PageReader>,
}

pub struct RequestOrchestrator {
    store: Arc<dyn Store>,
    reader: Arc<dyn PageReader>,
    memory: SimilarityMemory,
    fetcher: EvidenceFetcher,
    resolver: PriceResolver,
    synthesizer: VerdictSynthesizer,
    limits: PipelineConfig,
}

impl RequestOrchestrator {
    pub fn new(parts: Collaborators, search: &SearchConfig, limits: &PipelineConfig) -> Self {
        Self {
            memory: SimilarityMemory::new(
                parts.store.clone(),
                parts.embedder.clone(),
                limits.history_limit,
                limits.max_distance,
            ),
            fetcher: EvidenceFetcher::new(
                parts.store.clone(),
                parts.searcher.clone(),
                parts.reader.clone(),
                search.clone(),
                limits.clone(),
            ),
            resolver: PriceResolver::new(
                parts.oracle.clone(),
                parts.reader.clone(),
                parts.store.clone(),
                limits.clone(),
            ),
            synthesizer: VerdictSynthesizer::new(parts.oracle),
            store: parts.store,
            reader: parts.reader,
            limits: limits.clone(),
        }
    }

    /// Wire up the SQLite store and the providers named in `config`.
    ///
    /// The database must already be initialized (`fairprice init`).
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let parts = Collaborators {
            store: Arc::new(SqliteStore::new(pool)),
            embedder: create_embedder(&config.embedding)?,
            oracle: create_oracle(&config.oracle)?,
            searcher: create_searcher(&config.search)?,
            reader: create_reader(&config.reader)?,
        };
        Ok(Self::new(parts, &config.search, &config.pipeline))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn memory(&self) -> &SimilarityMemory {
        &self.memory
    }

    /// Run one price request end to end and write its audit log.
    pub async fn process_price_request(&self, query: &str, deep: bool) -> Result<PriceReport> {
        let started = Instant::now();
        let outcome = self.run(query, deep).await;

        let (status, price) = match &outcome {
            Ok(report) => (LogStatus::Success, report.price),
            Err(_) => (LogStatus::Error, 0),
        };
        let log = RequestLog {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.to_string(),
            price,
            deep_search: deep,
            status,
            latency_ms: started.elapsed().as_millis() as i64,
            created_at: Utc::now(),
        };

        match outcome {
            Ok(report) => {
                self.store
                    .insert_log(&log)
                    .await
                    .context("failed to write request log")?;
                info!(
                    query,
                    price = report.price,
                    verdict = %report.analysis.verdict,
                    score = report.confidence_score,
                    latency_ms = log.latency_ms,
                    "price request complete"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(log_err) = self.store.insert_log(&log).await {
                    warn!(error = %log_err, "failed to write error log");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, query: &str, deep: bool) -> Result<PriceReport> {
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }

        let parsed = query::parse(query);
        if parsed.is_direct_url {
            return Ok(self.analyze_url(query, &parsed.item, deep).await);
        }

        let item = parsed.item.as_str();
        let (history, web) = tokio::join!(self.memory.query(item), async {
            let evidence = self.fetcher.fetch(item, deep).await;
            if deep {
                self.resolver.resolve_deep(item, evidence).await
            } else {
                self.resolver.resolve(item, evidence).await
            }
        });

        let Some(claimed) = parsed.claimed_price else {
            return Ok(report(query, &parsed, 0, AnalysisResult::awaiting_price(), 0, history, web, deep));
        };

        let analysis = self
            .synthesizer
            .synthesize(item, claimed, &history, &web)
            .await;
        let priced = web.iter().filter(|ev| ev.has_price()).count();
        let score = confidence::score(history.len(), priced, deep);

        if item.chars().count() >= MIN_ITEM_CHARS {
            let entry = PriceEntry::new(item, claimed, parsed.location.as_deref(), AUTO_LOGGED);
            if let Err(e) = self.memory.remember(&entry).await {
                warn!(item, error = %e, "could not record price entry");
            }
        }

        Ok(report(query, &parsed, claimed, analysis, score, history, web, deep))
    }

    /// Single-page analysis for a query that is just a URL.
    async fn analyze_url(&self, query: &str, url: &str, deep: bool) -> PriceReport {
        let parsed = ParsedQuery {
            is_direct_url: true,
            item: url.to_string(),
            claimed_price: None,
            location: None,
        };

        let page = match self.reader.read(url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url, error = %e, "could not read product page");
                let analysis = AnalysisResult {
                    expected_price_range: "Unknown".to_string(),
                    verdict: Verdict::AnalysisPending,
                    confidence: ConfidenceTier::Low,
                    explanation: "The product page could not be read.".to_string(),
                };
                return report(query, &parsed, 0, analysis, 0, Vec::new(), Vec::new(), deep);
            }
        };

        let host = bare_host(&page.url).unwrap_or_default();
        let selectors = self.resolver.selectors().await;
        let detected = page_price(&page, selectors.get(&host).map(String::as_str));

        let mut evidence = WebEvidence::new(
            &host,
            &truncate_chars(&page.text, self.limits.deep_body_chars),
            &page.url,
            &display_date(None),
        );

        let amount = detected
            .as_deref()
            .and_then(price_amount)
            .map(|a| a.round() as i64)
            .filter(|a| *a > 0)
            .unwrap_or(0);

        let analysis = match &detected {
            Some(price) => {
                evidence.set_price_if_unset(price.clone());
                AnalysisResult {
                    expected_price_range: format_inr(amount),
                    verdict: Verdict::AnalysisPending,
                    confidence: ConfidenceTier::Low,
                    explanation: format!(
                        "Detected a listed price of {} on {}. Search for the item by name to \
                         compare it against market prices.",
                        price, host
                    ),
                }
            }
            None => AnalysisResult {
                expected_price_range: "Unknown".to_string(),
                verdict: Verdict::AnalysisPending,
                confidence: ConfidenceTier::Low,
                explanation: format!("No price could be found on {}.", host),
            },
        };

        report(query, &parsed, amount, analysis, 0, Vec::new(), vec![evidence], deep)
    }
}

#[allow(clippy::too_many_arguments)]
fn report(
    query: &str,
    parsed: &ParsedQuery,
    price: i64,
    analysis: AnalysisResult,
    confidence_score: u8,
    history: Vec<PriceEntry>,
    web_data: Vec<WebEvidence>,
    deep_search: bool,
) -> PriceReport {
    PriceReport {
        query: query.to_string(),
        item: parsed.item.clone(),
        price,
        location: parsed.location.clone(),
        analysis,
        confidence_score,
        history,
        web_data,
        deep_search,
        is_direct_url: parsed.is_direct_url,
    }
}
