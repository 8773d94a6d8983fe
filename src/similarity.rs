//! Semantic memory of past price entries.
//!
//! Entries are embedded on write and recalled by cosine distance. Recall is
//! best-effort: an unreachable store or a failing embedder yields no history
//! rather than an error.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::embedding::Embedder;
use crate::models::PriceEntry;
use crate::store::Store;

pub struct SimilarityMemory {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    limit: usize,
    max_distance: f32,
}

impl SimilarityMemory {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        limit: usize,
        max_distance: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            limit,
            max_distance,
        }
    }

    /// Up to `limit` entries closer than `max_distance`, nearest first.
    pub async fn query(&self, text: &str) -> Vec<PriceEntry> {
        match self.try_query(text).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(query = text, error = %e, "history lookup failed");
                Vec::new()
            }
        }
    }

    async fn try_query(&self, text: &str) -> Result<Vec<PriceEntry>> {
        let vector = self.embedder.embed(text).await?;
        let scored = self
            .store
            .nearest_entries(&vector, self.limit, self.max_distance)
            .await?;
        Ok(scored.into_iter().map(|s| s.entry).collect())
    }

    /// Store an entry and its embedding.
    ///
    /// The entry write must succeed; the embedding is best-effort and a
    /// failure only means the entry will not surface in [`query`](Self::query).
    pub async fn remember(&self, entry: &PriceEntry) -> Result<()> {
        self.store
            .insert_entry(entry)
            .await
            .with_context(|| format!("failed to store entry for '{}'", entry.item))?;

        let embedded = match self.embedder.embed(&entry.item).await {
            Ok(vector) => {
                self.store
                    .upsert_entry_vector(&entry.id, &vector, self.embedder.model_name())
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = embedded {
            warn!(entry = %entry.id, error = %e, "entry stored without embedding");
        }
        Ok(())
    }

    /// Delete an entry and its embedding. Returns whether the entry existed.
    pub async fn forget(&self, id: &str) -> Result<bool> {
        self.store.delete_entry(id).await
    }
}
