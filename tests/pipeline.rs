//! End-to-end runs of the price pipeline through the public library API,
//! with canned search results and pages in place of live providers.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

use fairprice::config::{Config, PipelineConfig, SearchConfig};
use fairprice::db;
use fairprice::embedding::{Embedder, HashEmbedder};
use fairprice::migrate;
use fairprice::models::{BlacklistRule, PriceEntry, RuleKind, Verdict};
use fairprice::oracle::DisabledOracle;
use fairprice::pipeline::{Collaborators, RequestOrchestrator};
use fairprice::reader::{Page, PageReader};
use fairprice::store::memory::InMemoryStore;
use fairprice::store::sqlite::SqliteStore;
use fairprice::store::Store;
use fairprice::websearch::{SearchHit, WebSearcher};

struct CannedSearch;

#[async_trait]
impl WebSearcher for CannedSearch {
    fn name(&self) -> &str {
        "canned"
    }

    async fn search(&self, query: &str, _max: usize) -> Result<Vec<SearchHit>> {
        if query.contains("site:") {
            return Ok(Vec::new());
        }
        Ok(vec![
            SearchHit {
                title: "Apple iPhone 12 (64GB) - Blue".to_string(),
                snippet: "Buy now at ₹11,500. Free delivery.".to_string(),
                url: "https://www.retailer.in/iphone-12".to_string(),
                date: Some("2024-03-01".to_string()),
            },
            SearchHit {
                title: "Refurbished phones marketplace".to_string(),
                snippet: "Listings from ₹9,999".to_string(),
                url: "https://www.olx.in/item/42".to_string(),
                date: None,
            },
        ])
    }
}

struct NoPages;

#[async_trait]
impl PageReader for NoPages {
    fn name(&self) -> &str {
        "none"
    }

    async fn read(&self, url: &str) -> Result<Page> {
        bail!("offline: {}", url)
    }
}

fn parts(store: Arc<dyn Store>) -> Collaborators {
    Collaborators {
        store,
        embedder: Arc::new(HashEmbedder::new(128)),
        oracle: Arc::new(DisabledOracle::new("integration test")),
        searcher: Arc::new(CannedSearch),
        reader: Arc::new(NoPages),
    }
}

fn orchestrator(store: Arc<dyn Store>) -> RequestOrchestrator {
    RequestOrchestrator::new(
        parts(store),
        &SearchConfig::default(),
        &PipelineConfig::default(),
    )
}

#[tokio::test]
async fn claimed_price_gets_evidence_and_score() {
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(store);

    let report = orch
        .process_price_request("iphone 12 in 12000 rs", false)
        .await
        .unwrap();

    assert_eq!(report.price, 12000);
    assert_eq!(report.item, "iphone 12");
    assert!(!report.web_data.is_empty());
    assert!(report.confidence_score >= 60);
    assert_eq!(report.web_data[0].source, "retailer.in");
    assert_eq!(report.web_data[0].price(), Some("₹11,500"));
}

#[tokio::test]
async fn query_without_price_is_pending() {
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(store);

    let report = orch
        .process_price_request("macbook air m1 price", false)
        .await
        .unwrap();

    assert_eq!(report.price, 0);
    assert_eq!(report.analysis.verdict, Verdict::AnalysisPending);
    assert!(!report.web_data.is_empty());
}

#[tokio::test]
async fn blacklisted_domains_never_reach_the_report() {
    let store = Arc::new(InMemoryStore::new());
    store
        .add_blacklist_rule(&BlacklistRule::new("olx.in", RuleKind::Domain, None))
        .await
        .unwrap();
    let orch = orchestrator(store);

    let report = orch
        .process_price_request("iphone 12 for 12000 rs", false)
        .await
        .unwrap();

    assert!(report.web_data.iter().all(|ev| ev.source != "olx.in"));
    assert_eq!(report.web_data.len(), 1);
}

#[tokio::test]
async fn added_entry_is_its_own_nearest_neighbour() {
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(store.clone());

    let entry = PriceEntry::new("sony wh-1000xm5 headphones", 26990, Some("Pune"), "manual");
    orch.memory().remember(&entry).await.unwrap();
    orch.memory()
        .remember(&PriceEntry::new("cast iron skillet", 1800, None, "manual"))
        .await
        .unwrap();

    let needle = HashEmbedder::new(128)
        .embed("sony wh-1000xm5 headphones")
        .await
        .unwrap();
    let nearest = store.nearest_entries(&needle, 5, 2.0).await.unwrap();
    assert_eq!(nearest[0].entry.id, entry.id);
    assert!(nearest[0].distance.abs() < 1e-4);

    let recalled = orch.memory().query("sony wh-1000xm5 headphones").await;
    assert_eq!(recalled[0].location, "Pune");
}

#[tokio::test]
async fn sqlite_store_round_trip_through_pipeline() {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db(tmp.path().join("fp.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let orch = orchestrator(store.clone());

    orch.process_price_request("iphone 12 for 12000 rs", false)
        .await
        .unwrap();
    let second = orch
        .process_price_request("iphone 12 for 12500 rs", false)
        .await
        .unwrap();

    assert_eq!(second.history.len(), 1);
    assert_eq!(second.history[0].price, 12000);
    assert_eq!(store.list_entries(10).await.unwrap().len(), 2);
    assert_eq!(store.recent_logs(10).await.unwrap().len(), 2);
}
