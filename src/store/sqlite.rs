//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`crate::migrate`]. Vectors are stored as little-endian f32 BLOBs and
//! cosine distance is computed in Rust after a full scan of
//! `entry_vectors`, which is adequate for the entry volumes this tool sees.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::Store;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{
    BlacklistRule, LogStatus, PriceEntry, ReportedUrl, RequestLog, RuleKind, ScoredEntry,
    TrustedSource,
};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn entry_from_row(row: &SqliteRow) -> PriceEntry {
    PriceEntry {
        id: row.get("id"),
        item: row.get("item"),
        location: row.get("location"),
        price: row.get("price"),
        timestamp: from_ts(row.get("created_at")),
        upvotes: row.get("upvotes"),
        downvotes: row.get("downvotes"),
        is_trusted: row.get::<i64, _>("is_trusted") != 0,
        contributor_id: row.get("contributor_id"),
    }
}

fn source_from_row(row: &SqliteRow) -> TrustedSource {
    TrustedSource {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        category: row.get("category"),
        price_selector: row.get("price_selector"),
        is_active: row.get::<i64, _>("is_active") != 0,
    }
}

const ENTRY_COLUMNS: &str =
    "id, item, location, price, created_at, upvotes, downvotes, is_trusted, contributor_id";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_entry(&self, entry: &PriceEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_entries (id, item, location, price, created_at,
                                       upvotes, downvotes, is_trusted, contributor_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.item)
        .bind(&entry.location)
        .bind(entry.price)
        .bind(entry.timestamp.timestamp())
        .bind(entry.upvotes)
        .bind(entry.downvotes)
        .bind(entry.is_trusted as i64)
        .bind(&entry.contributor_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_entry(&self, id: &str) -> Result<Option<PriceEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM price_entries WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn list_entries(&self, limit: usize) -> Result<Vec<PriceEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM price_entries ORDER BY created_at DESC, id ASC LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entry_vectors WHERE entry_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM price_entries WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn vote_entry(&self, id: &str, upvote: bool) -> Result<bool> {
        let sql = if upvote {
            "UPDATE price_entries SET upvotes = upvotes + 1 WHERE id = ?"
        } else {
            "UPDATE price_entries SET downvotes = downvotes + 1 WHERE id = ?"
        };
        let affected = sqlx::query(sql)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn upsert_entry_vector(
        &self,
        entry_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entry_vectors (entry_id, model, dims, embedding)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entry_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(entry_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn nearest_entries(
        &self,
        query_vec: &[f32],
        limit: usize,
        max_distance: f32,
    ) -> Result<Vec<ScoredEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.item, e.location, e.price, e.created_at, e.upvotes,
                   e.downvotes, e.is_trusted, e.contributor_id, v.embedding
            FROM entry_vectors v
            JOIN price_entries e ON e.id = v.entry_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredEntry> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let distance = 1.0 - cosine_similarity(query_vec, &blob_to_vec(&blob));
                (distance < max_distance).then(|| ScoredEntry {
                    entry: entry_from_row(row),
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
        let rows = sqlx::query(
            r#"
            SELECT id, name, url, category, price_selector, is_active
            FROM trusted_sources
            WHERE is_active = 1 OR ? = 0
            ORDER BY name ASC
            "#,
        )
        .bind(active_only as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(source_from_row).collect())
    }

    async fn upsert_trusted_source(&self, source: &TrustedSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trusted_sources (id, name, url, category, price_selector, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                price_selector = excluded.price_selector,
                is_active = excluded.is_active
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.category)
        .bind(&source.price_selector)
        .bind(source.is_active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_trusted_source(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM trusted_sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn list_blacklist_rules(&self, active_only: bool) -> Result<Vec<BlacklistRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pattern, kind, description, is_active
            FROM blacklist_rules
            WHERE is_active = 1 OR ? = 0
            ORDER BY pattern ASC
            "#,
        )
        .bind(active_only as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.get("kind");
            rules.push(BlacklistRule {
                id: row.get("id"),
                pattern: row.get("pattern"),
                kind: kind.parse::<RuleKind>()?,
                description: row.get("description"),
                is_active: row.get::<i64, _>("is_active") != 0,
            });
        }
        Ok(rules)
    }

    async fn add_blacklist_rule(&self, rule: &BlacklistRule) -> Result<()> {
        sqlx::query(
            "INSERT INTO blacklist_rules (id, pattern, kind, description, is_active) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&rule.id)
        .bind(&rule.pattern)
        .bind(rule.kind.as_str())
        .bind(&rule.description)
        .bind(rule.is_active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_blacklist_rule(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM blacklist_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn insert_log(&self, log: &RequestLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO request_logs (id, query, price, deep_search, status, latency_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.query)
        .bind(log.price)
        .bind(log.deep_search as i64)
        .bind(log.status.as_str())
        .bind(log.latency_ms)
        .bind(log.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, query, price, deep_search, status, latency_ms, created_at
            FROM request_logs
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                RequestLog {
                    id: row.get("id"),
                    query: row.get("query"),
                    price: row.get("price"),
                    deep_search: row.get::<i64, _>("deep_search") != 0,
                    status: if status == "success" {
                        LogStatus::Success
                    } else {
                        LogStatus::Error
                    },
                    latency_ms: row.get("latency_ms"),
                    created_at: from_ts(row.get("created_at")),
                }
            })
            .collect())
    }

    async fn report_url(&self, report: &ReportedUrl) -> Result<()> {
        sqlx::query("INSERT INTO reported_urls (id, url, reason, created_at) VALUES (?, ?, ?, ?)")
            .bind(&report.id)
            .bind(&report.url)
            .bind(&report.reason)
            .bind(report.created_at.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_reported_urls(&self, limit: usize) -> Result<Vec<ReportedUrl>> {
        let rows = sqlx::query(
            "SELECT id, url, reason, created_at FROM reported_urls ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| ReportedUrl {
                id: row.get("id"),
                url: row.get("url"),
                reason: row.get("reason"),
                created_at: from_ts(row.get("created_at")),
            })
            .collect())
    }
}
