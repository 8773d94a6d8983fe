//! In-memory [`Store`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine distance over all stored vectors.
//! [`InMemoryStore::set_offline`] makes every call fail, which is how tests
//! simulate an unreachable database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::Store;
use crate::embedding::cosine_similarity;
use crate::models::{
    BlacklistRule, PriceEntry, ReportedUrl, RequestLog, ScoredEntry, TrustedSource,
};

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, PriceEntry>>,
    vectors: RwLock<HashMap<String, Vec<f32>>>,
    sources: RwLock<Vec<TrustedSource>>,
    rules: RwLock<Vec<BlacklistRule>>,
    logs: RwLock<Vec<RequestLog>>,
    reports: RwLock<Vec<ReportedUrl>>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }

    /// Number of stored vectors, for asserting partial-write behaviour.
    pub fn vector_count(&self) -> usize {
        self.vectors.read().unwrap().len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_entry(&self, entry: &PriceEntry) -> Result<()> {
        self.check()?;
        if entry.price <= 0 {
            bail!("price must be > 0, got {}", entry.price);
        }
        let mut entries = self.entries.write().unwrap();
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, id: &str) -> Result<Option<PriceEntry>> {
        self.check()?;
        Ok(self.entries.read().unwrap().get(id).cloned())
    }

    async fn list_entries(&self, limit: usize) -> Result<Vec<PriceEntry>> {
        self.check()?;
        let mut entries: Vec<PriceEntry> = self.entries.read().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.vectors.write().unwrap().remove(id);
        Ok(self.entries.write().unwrap().remove(id).is_some())
    }

    async fn vote_entry(&self, id: &str, upvote: bool) -> Result<bool> {
        self.check()?;
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(id) {
            Some(entry) => {
                if upvote {
                    entry.upvotes += 1;
                } else {
                    entry.downvotes += 1;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_entry_vector(
        &self,
        entry_id: &str,
        vector: &[f32],
        _model: &str,
    ) -> Result<()> {
        self.check()?;
        self.vectors
            .write()
            .unwrap()
            .insert(entry_id.to_string(), vector.to_vec());
        Ok(())
    }

    async fn nearest_entries(
        &self,
        query_vec: &[f32],
        limit: usize,
        max_distance: f32,
    ) -> Result<Vec<ScoredEntry>> {
        self.check()?;
        let vectors = self.vectors.read().unwrap();
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<ScoredEntry> = vectors
            .iter()
            .filter_map(|(id, vec)| {
                let entry = entries.get(id)?;
                let distance = 1.0 - cosine_similarity(query_vec, vec);
                (distance < max_distance).then(|| ScoredEntry {
                    entry: entry.clone(),
                    distance,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn list_trusted_sources(&self, active_only: bool) -> Result<Vec<TrustedSource>> {
        self.check()?;
        Ok(self
            .sources
            .read()
            .unwrap()
            .iter()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect())
    }

    async fn upsert_trusted_source(&self, source: &TrustedSource) -> Result<()> {
        self.check()?;
        let mut sources = self.sources.write().unwrap();
        match sources.iter_mut().find(|s| s.url == source.url) {
            Some(existing) => {
                let id = existing.id.clone();
                *existing = source.clone();
                existing.id = id;
            }
            None => sources.push(source.clone()),
        }
        Ok(())
    }

    async fn delete_trusted_source(&self, id: &str) -> Result<bool> {
        self.check()?;
        let mut sources = self.sources.write().unwrap();
        let before = sources.len();
        sources.retain(|s| s.id != id);
        Ok(sources.len() != before)
    }

    async fn list_blacklist_rules(&self, active_only: bool) -> Result<Vec<BlacklistRule>> {
        self.check()?;
        Ok(self
            .rules
            .read()
            .unwrap()
            .iter()
            .filter(|r| !active_only || r.is_active)
            .cloned()
            .collect())
    }

    async fn add_blacklist_rule(&self, rule: &BlacklistRule) -> Result<()> {
        self.check()?;
        self.rules.write().unwrap().push(rule.clone());
        Ok(())
    }

    async fn delete_blacklist_rule(&self, id: &str) -> Result<bool> {
        self.check()?;
        let mut rules = self.rules.write().unwrap();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        Ok(rules.len() != before)
    }

    async fn insert_log(&self, log: &RequestLog) -> Result<()> {
        self.check()?;
        self.logs.write().unwrap().push(log.clone());
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLog>> {
        self.check()?;
        Ok(self
            .logs
            .read()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn report_url(&self, report: &ReportedUrl) -> Result<()> {
        self.check()?;
        self.reports.write().unwrap().push(report.clone());
        Ok(())
    }

    async fn list_reported_urls(&self, limit: usize) -> Result<Vec<ReportedUrl>> {
        self.check()?;
        Ok(self
            .reports
            .read()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
