//! `fairprice entries`: inspect and curate the price history.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::format_inr;
use crate::models::PriceEntry;
use crate::similarity::SimilarityMemory;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Contributor id for entries added by hand.
const MANUAL: &str = "manual";

async fn open(config: &Config) -> Result<(Arc<SqliteStore>, SimilarityMemory)> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let memory = SimilarityMemory::new(
        store.clone(),
        create_embedder(&config.embedding)?,
        config.pipeline.history_limit,
        config.pipeline.max_distance,
    );
    Ok((store, memory))
}

pub async fn run_list(config: &Config, limit: usize) -> Result<()> {
    let (store, _) = open(config).await?;
    let entries = store.list_entries(limit).await?;

    if entries.is_empty() {
        println!("No entries.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<28} {:>12}  {:<12} {:>5}  DATE",
        "ID", "ITEM", "PRICE", "LOCATION", "VOTES"
    );
    for e in &entries {
        println!(
            "{:<36}  {:<28} {:>12}  {:<12} {:>5}  {}",
            e.id,
            e.item,
            format_inr(e.price),
            e.location,
            e.upvotes - e.downvotes,
            e.timestamp.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub async fn run_add(
    config: &Config,
    item: &str,
    price: i64,
    location: Option<&str>,
) -> Result<()> {
    let item = item.trim();
    if item.is_empty() {
        bail!("item must not be empty");
    }
    if price <= 0 {
        bail!("price must be a positive number of rupees");
    }

    let (_, memory) = open(config).await?;
    let entry = PriceEntry::new(item, price, location, MANUAL);
    memory.remember(&entry).await?;
    println!("Added {} ({} for {})", entry.id, format_inr(price), entry.item);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let (_, memory) = open(config).await?;
    if !memory.forget(id).await? {
        bail!("No entry with id {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}

pub async fn run_vote(config: &Config, id: &str, upvote: bool) -> Result<()> {
    let (store, _) = open(config).await?;
    if !store.vote_entry(id, upvote).await? {
        bail!("No entry with id {}", id);
    }
    println!("Recorded {} for {}", if upvote { "upvote" } else { "downvote" }, id);
    Ok(())
}
