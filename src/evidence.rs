//! Web evidence gathering.
//!
//! [`EvidenceFetcher::fetch`] runs two searches concurrently:
//!
//! 1. **Trusted**: scoped to the active trusted sources with `site:` terms
//!    (skipped when no source is configured).
//! 2. **General**: the item plus the configured price keywords.
//!
//! Trusted results come first. The merged list is deduplicated by exact URL,
//! restricted to `http(s)`, filtered through the [`BlacklistMatcher`], and
//! then shaped for the requested mode:
//!
//! - **Standard**: at most `per_host_cap` results per hostname, truncated
//!   to `max_results`, bodies are the search snippets.
//! - **Deep**: the first `deep_results` results, each body replaced by the
//!   page text from the reader (snippet on failure), truncated to
//!   `deep_body_chars`.
//!
//! Evidence is optional: any failure yields an empty list.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::future::join_all;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{PipelineConfig, SearchConfig};
use crate::models::{bare_host, BlacklistRule, RuleKind, WebEvidence};
use crate::reader::{truncate_chars, PageReader};
use crate::store::Store;
use crate::websearch::{SearchHit, WebSearcher};

/// Display format for evidence dates, e.g. `07 Mar 2026`.
pub const DATE_FORMAT: &str = "%d %b %Y";

/// Compiled blacklist rules.
#[derive(Debug, Default)]
pub struct BlacklistMatcher {
    domains: Vec<String>,
    patterns: Vec<Regex>,
}

impl BlacklistMatcher {
    /// Compile active rules. Invalid regex rules are skipped with a warning.
    pub fn new(rules: &[BlacklistRule]) -> Self {
        let mut matcher = Self::default();
        for rule in rules.iter().filter(|r| r.is_active) {
            match rule.kind {
                RuleKind::Domain => {
                    let domain = normalize_domain(&rule.pattern);
                    if !domain.is_empty() {
                        matcher.domains.push(domain);
                    }
                }
                RuleKind::Regex => {
                    match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                        Ok(re) => matcher.patterns.push(re),
                        Err(e) => {
                            warn!(rule = %rule.id, pattern = %rule.pattern, error = %e, "skipping invalid blacklist regex")
                        }
                    }
                }
            }
        }
        matcher
    }

    /// True when `url` must be dropped. Unparseable URLs are always dropped.
    pub fn is_blocked(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str().map(str::to_lowercase) else {
            return true;
        };

        let domain_hit = self
            .domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)));

        domain_hit || self.patterns.iter().any(|re| re.is_match(url))
    }
}

fn normalize_domain(pattern: &str) -> String {
    let p = pattern.trim().to_lowercase();
    let p = if p.contains("://") {
        bare_host(&p).unwrap_or_default()
    } else {
        p.trim_end_matches('/').to_string()
    };
    p.strip_prefix("www.").unwrap_or(&p).to_string()
}

fn is_http(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Provider dates vary ("2026-01-02T10:00:00Z", "Jan 2, 2026", "3 days ago").
/// Anything unparseable shows as today.
pub fn display_date(raw: Option<&str>) -> String {
    let parsed = raw.and_then(|r| {
        let r = r.trim();
        DateTime::parse_from_rfc3339(r)
            .map(|d| d.date_naive())
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(r, "%Y-%m-%dT%H:%M:%S")
                    .map(|d| d.date())
                    .ok()
            })
            .or_else(|| NaiveDate::parse_from_str(r, "%Y-%m-%d").ok())
            .or_else(|| NaiveDate::parse_from_str(r, "%b %d, %Y").ok())
            .or_else(|| NaiveDate::parse_from_str(r, "%d %b %Y").ok())
    });
    parsed
        .unwrap_or_else(|| Utc::now().date_naive())
        .format(DATE_FORMAT)
        .to_string()
}

pub struct EvidenceFetcher {
    store: Arc<dyn Store>,
    searcher: Arc<dyn WebSearcher>,
    reader: Arc<dyn PageReader>,
    search: SearchConfig,
    limits: PipelineConfig,
}

impl EvidenceFetcher {
    pub fn new(
        store: Arc<dyn Store>,
        searcher: Arc<dyn WebSearcher>,
        reader: Arc<dyn PageReader>,
        search: SearchConfig,
        limits: PipelineConfig,
    ) -> Self {
        Self {
            store,
            searcher,
            reader,
            search,
            limits,
        }
    }

    /// Gather evidence for `item`. Never fails; errors produce `[]`.
    pub async fn fetch(&self, item: &str, deep: bool) -> Vec<WebEvidence> {
        match self.try_fetch(item, deep).await {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!(item, error = %e, "evidence gathering failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, item: &str, deep: bool) -> Result<Vec<WebEvidence>> {
        let sources = self.store.list_trusted_sources(true).await?;
        let rules = self.store.list_blacklist_rules(true).await?;
        let blacklist = BlacklistMatcher::new(&rules);

        let hosts: Vec<String> = sources.iter().filter_map(|s| s.host()).collect();
        let general_query = format!("{} {}", item, self.search.price_keywords);
        let trusted_query = (!hosts.is_empty()).then(|| {
            let sites: Vec<String> = hosts.iter().map(|h| format!("site:{}", h)).collect();
            format!("{} ({})", general_query, sites.join(" OR "))
        });

        let max = self.search.results_per_query;
        let trusted = async {
            match &trusted_query {
                Some(q) => self.searcher.search(q, max).await,
                None => Ok(Vec::new()),
            }
        };
        let general = self.searcher.search(&general_query, max);
        let (trusted, general) = tokio::join!(trusted, general);

        let trusted = trusted.unwrap_or_else(|e| {
            warn!(item, error = %e, "trusted-source search failed");
            Vec::new()
        });
        let general = general.unwrap_or_else(|e| {
            warn!(item, error = %e, "general search failed");
            Vec::new()
        });

        let hits = self.filter_hits(trusted.into_iter().chain(general), &blacklist);
        info!(item, deep, candidates = hits.len(), "search results filtered");

        if deep {
            Ok(self.deepen(hits).await)
        } else {
            Ok(self.cap_per_host(hits))
        }
    }

    /// Dedupe by exact URL, drop non-http(s) and blacklisted URLs.
    fn filter_hits(
        &self,
        hits: impl Iterator<Item = SearchHit>,
        blacklist: &BlacklistMatcher,
    ) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        hits.filter(|h| seen.insert(h.url.clone()))
            .filter(|h| is_http(&h.url))
            .filter(|h| !blacklist.is_blocked(&h.url))
            .collect()
    }

    fn cap_per_host(&self, hits: Vec<SearchHit>) -> Vec<WebEvidence> {
        let mut per_host: HashMap<String, usize> = HashMap::new();
        hits.into_iter()
            .filter(|h| {
                let host = bare_host(&h.url).unwrap_or_default();
                let count = per_host.entry(host).or_insert(0);
                *count += 1;
                *count <= self.limits.per_host_cap
            })
            .take(self.limits.max_results)
            .map(|h| to_evidence(&h, &h.snippet))
            .collect()
    }

    async fn deepen(&self, hits: Vec<SearchHit>) -> Vec<WebEvidence> {
        let top: Vec<SearchHit> = hits.into_iter().take(self.limits.deep_results).collect();
        let body_chars = self.limits.deep_body_chars;

        join_all(top.iter().map(|hit| async move {
            let body = match self.reader.read(&hit.url).await {
                Ok(page) if !page.text.trim().is_empty() => page.text,
                Ok(_) => hit.snippet.clone(),
                Err(e) => {
                    warn!(url = %hit.url, error = %e, "deep read failed, using snippet");
                    hit.snippet.clone()
                }
            };
            to_evidence(hit, &truncate_chars(&body, body_chars))
        }))
        .await
    }
}

fn to_evidence(hit: &SearchHit, body: &str) -> WebEvidence {
    WebEvidence::new(&hit.title, body, &hit.url, &display_date(hit.date.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrustedSource;
    use crate::reader::Page;
    use crate::store::memory::InMemoryStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns `trusted` for `site:` queries and `general` otherwise; records queries.
    struct ScriptedSearch {
        trusted: Vec<SearchHit>,
        general: Vec<SearchHit>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebSearcher for ScriptedSearch {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn search(&self, query: &str, _max: usize) -> Result<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            if query.contains("site:") {
                Ok(self.trusted.clone())
            } else {
                Ok(self.general.clone())
            }
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl WebSearcher for FailingSearch {
        fn name(&self) -> &str {
            "failing"
        }
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>> {
            bail!("search down")
        }
    }

    struct EchoReader;

    #[async_trait]
    impl PageReader for EchoReader {
        fn name(&self) -> &str {
            "echo"
        }
        async fn read(&self, url: &str) -> Result<Page> {
            if url.contains("broken") {
                bail!("unreachable");
            }
            Ok(Page {
                url: url.to_string(),
                text: format!("full page of {} {}", url, "x".repeat(2000)),
                html: None,
            })
        }
    }

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: format!("title {}", url),
            snippet: format!("snippet {}", url),
            url: url.to_string(),
            date: Some("2026-03-07".to_string()),
        }
    }

    fn fetcher(store: Arc<InMemoryStore>, searcher: Arc<dyn WebSearcher>) -> EvidenceFetcher {
        EvidenceFetcher::new(
            store,
            searcher,
            Arc::new(EchoReader),
            SearchConfig::default(),
            PipelineConfig::default(),
        )
    }

    #[test]
    fn test_blacklist_domain_and_subdomain() {
        let rules = vec![
            BlacklistRule::new("spam.com", RuleKind::Domain, None),
            BlacklistRule::new("https://www.Junk.in/", RuleKind::Domain, None),
        ];
        let m = BlacklistMatcher::new(&rules);
        assert!(m.is_blocked("https://spam.com/a"));
        assert!(m.is_blocked("https://shop.spam.com/a"));
        assert!(m.is_blocked("https://junk.in/x"));
        assert!(!m.is_blocked("https://notspam.com/a"));
        assert!(m.is_blocked("not a url"));
    }

    #[test]
    fn test_blacklist_regex_case_insensitive_and_invalid_skipped() {
        let rules = vec![
            BlacklistRule::new(r"/refurbished/", RuleKind::Regex, None),
            BlacklistRule::new(r"([unclosed", RuleKind::Regex, None),
        ];
        let m = BlacklistMatcher::new(&rules);
        assert!(m.is_blocked("https://a.com/REFURBISHED/iphone"));
        assert!(!m.is_blocked("https://a.com/new/iphone"));
    }

    #[test]
    fn test_inactive_rules_ignored() {
        let mut rule = BlacklistRule::new("spam.com", RuleKind::Domain, None);
        rule.is_active = false;
        assert!(!BlacklistMatcher::new(&[rule]).is_blocked("https://spam.com"));
    }

    #[test]
    fn test_display_date() {
        assert_eq!(display_date(Some("2026-03-07T10:00:00Z")), "07 Mar 2026");
        assert_eq!(display_date(Some("Mar 7, 2026")), "07 Mar 2026");
        let today = Utc::now().date_naive().format(DATE_FORMAT).to_string();
        assert_eq!(display_date(Some("3 days ago")), today);
        assert_eq!(display_date(None), today);
    }

    #[tokio::test]
    async fn test_standard_caps_per_host_and_orders_trusted_first() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_trusted_source(&TrustedSource::new("Amazon", "https://amazon.in", "retail", None))
            .await
            .unwrap();
        store
            .add_blacklist_rule(&BlacklistRule::new("spam.com", RuleKind::Domain, None))
            .await
            .unwrap();

        let search = Arc::new(ScriptedSearch {
            trusted: vec![hit("https://www.amazon.in/1"), hit("https://amazon.in/2")],
            general: vec![
                hit("https://amazon.in/2"),
                hit("https://amazon.in/3"),
                hit("https://spam.com/deal"),
                hit("ftp://files.example.com/x"),
                hit("https://flipkart.com/a"),
            ],
            queries: Mutex::new(Vec::new()),
        });
        let evidence = fetcher(store, search.clone()).fetch("iphone 12", false).await;

        let urls: Vec<&str> = evidence.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.amazon.in/1", "https://amazon.in/2", "https://flipkart.com/a"]
        );
        assert!(evidence.iter().all(|e| !e.has_price()));
        assert_eq!(evidence[0].source, "amazon.in");
        assert_eq!(evidence[0].date, "07 Mar 2026");

        let queries = search.queries.lock().unwrap();
        assert!(queries.iter().any(|q| q.contains("site:amazon.in")));
    }

    #[tokio::test]
    async fn test_no_trusted_sources_skips_scoped_search() {
        let store = Arc::new(InMemoryStore::new());
        let search = Arc::new(ScriptedSearch {
            trusted: vec![],
            general: vec![hit("https://a.com/1")],
            queries: Mutex::new(Vec::new()),
        });
        let evidence = fetcher(store, search.clone()).fetch("kettle", false).await;
        assert_eq!(evidence.len(), 1);
        assert_eq!(search.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_standard_truncates_to_max_results() {
        let store = Arc::new(InMemoryStore::new());
        let general: Vec<SearchHit> = (0..30).map(|i| hit(&format!("https://s{}.com/p", i))).collect();
        let search = Arc::new(ScriptedSearch {
            trusted: vec![],
            general,
            queries: Mutex::new(Vec::new()),
        });
        let evidence = fetcher(store, search).fetch("kettle", false).await;
        assert_eq!(evidence.len(), 16);
    }

    #[tokio::test]
    async fn test_deep_reads_pages_and_falls_back_to_snippet() {
        let store = Arc::new(InMemoryStore::new());
        let mut general: Vec<SearchHit> = (0..10).map(|i| hit(&format!("https://a.com/{}", i))).collect();
        general[1] = hit("https://broken.com/x");
        let search = Arc::new(ScriptedSearch {
            trusted: vec![],
            general,
            queries: Mutex::new(Vec::new()),
        });
        let evidence = fetcher(store, search).fetch("kettle", true).await;

        // Deep mode does not cap per host
        assert_eq!(evidence.len(), 8);
        assert!(evidence[0].body.starts_with("full page of https://a.com/0"));
        assert_eq!(evidence[0].body.chars().count(), 800);
        assert_eq!(evidence[1].body, "snippet https://broken.com/x");
    }

    #[tokio::test]
    async fn test_failures_yield_empty() {
        let store = Arc::new(InMemoryStore::new());
        let evidence = fetcher(store.clone(), Arc::new(FailingSearch)).fetch("kettle", false).await;
        assert!(evidence.is_empty());

        store.set_offline(true);
        let search = Arc::new(ScriptedSearch {
            trusted: vec![],
            general: vec![hit("https://a.com/1")],
            queries: Mutex::new(Vec::new()),
        });
        assert!(fetcher(store, search).fetch("kettle", false).await.is_empty());
    }
}
