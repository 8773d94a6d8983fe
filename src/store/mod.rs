//! Storage abstraction for Fair Price.
//!
//! The [`Store`] trait defines every persistence operation the pipeline and
//! the admin commands need, enabling pluggable backends:
//!
//! - [`sqlite::SqliteStore`]: the production backend (sqlx + SQLite, WAL).
//! - [`memory::InMemoryStore`]: `RwLock`-guarded maps for tests.
//!
//! Entries and their embedding vectors are written by separate calls and
//! are not transactionally linked. An entry without a vector is valid; it is
//! simply never returned by [`Store::nearest_entries`].

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    BlacklistRule, PriceEntry, ReportedUrl, RequestLog, ScoredEntry, TrustedSource,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_entry`](Store::insert_entry) | Persist a new price entry |
/// | [`delete_entry`](Store::delete_entry) | Remove an entry and its vector (idempotent) |
/// | [`upsert_entry_vector`](Store::upsert_entry_vector) | Store the embedding for an entry |
/// | [`nearest_entries`](Store::nearest_entries) | Cosine nearest-neighbour lookup |
/// | [`list_trusted_sources`](Store::list_trusted_sources) | Trusted sources, optionally active only |
/// | [`list_blacklist_rules`](Store::list_blacklist_rules) | Blacklist rules, optionally active only |
/// | [`insert_log`](Store::insert_log) | Write an audit row |
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_entry(&self, entry: &PriceEntry) -> Result<()>;

    async fn get_entry(&self, id: &str) -> Result<Option<PriceEntry>>;

    /// Most recent entries first.
    async fn list_entries(&self, limit: usize) -> Result<Vec<PriceEntry>>;

    /// Delete an entry and its vector row.
    ///
    /// Returns `false` when there was nothing to delete. A missing vector
    /// row is not an error.
    async fn delete_entry(&self, id: &str) -> Result<bool>;

    /// Add one up- or down-vote. Returns `false` when the entry is gone.
    async fn vote_entry(&self, id: &str, upvote: bool) -> Result<bool>;

    async fn upsert_entry_vector(&self, entry_id: &str, vector: &[f32], model: &str)
        -> Result<()>;

    /// Entries whose vectors lie strictly closer than `max_distance`
    /// (cosine distance, `1 - similarity`), nearest first.
    async fn nearest_entries(
        &self,
        query_vec: &[f32],
        limit: usize,
        max_distance: f32,
    ) -> Result<Vec<ScoredEntry>>;

    async fn list_trusted_sources(&self, active_only: bool) -> Result<Vec<TrustedSource>>;

    /// Insert a source, or update the existing one with the same URL.
    async fn upsert_trusted_source(&self, source: &TrustedSource) -> Result<()>;

    async fn delete_trusted_source(&self, id: &str) -> Result<bool>;

    async fn list_blacklist_rules(&self, active_only: bool) -> Result<Vec<BlacklistRule>>;

    async fn add_blacklist_rule(&self, rule: &BlacklistRule) -> Result<()>;

    async fn delete_blacklist_rule(&self, id: &str) -> Result<bool>;

    async fn insert_log(&self, log: &RequestLog) -> Result<()>;

    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLog>>;

    async fn report_url(&self, report: &ReportedUrl) -> Result<()>;

    async fn list_reported_urls(&self, limit: usize) -> Result<Vec<ReportedUrl>>;
}
