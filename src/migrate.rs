use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Historical price observations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS price_entries (
            id TEXT PRIMARY KEY,
            item TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT 'Unknown',
            price INTEGER NOT NULL CHECK (price > 0),
            created_at INTEGER NOT NULL,
            upvotes INTEGER NOT NULL DEFAULT 0,
            downvotes INTEGER NOT NULL DEFAULT 0,
            is_trusted INTEGER NOT NULL DEFAULT 0,
            contributor_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One embedding per entry; no foreign key so the two writes stay independent
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entry_vectors (
            entry_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trusted_sources (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL DEFAULT '',
            price_selector TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blacklist_rules (
            id TEXT PRIMARY KEY,
            pattern TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('DOMAIN', 'REGEX')),
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_logs (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            price INTEGER NOT NULL DEFAULT 0,
            deep_search INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            latency_ms INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reported_urls (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            reason TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_price_entries_created_at ON price_entries(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_request_logs_created_at ON request_logs(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
