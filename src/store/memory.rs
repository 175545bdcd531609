//! In-memory [`EmbeddingStore`] implementation for testing.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock` for thread safety.
//! Similarity queries are brute-force cosine over all stored vectors.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, embed_batched, Embedder};
use crate::models::ChunkRecord;

use super::{rank_matches, DeleteSelector, EmbeddingStore, QueryMatch, WhereFilter};

struct StoredChunk {
    record: ChunkRecord,
    vector: Vec<f32>,
}

/// In-memory store keyed by chunk id.
pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    chunks: RwLock<BTreeMap<String, StoredChunk>>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: RwLock::new(BTreeMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

fn sort_records(records: &mut [ChunkRecord]) {
    records.sort_by(|a, b| {
        a.metadata
            .file_path
            .cmp(&b.metadata.file_path)
            .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
    });
}

#[async_trait]
impl EmbeddingStore for InMemoryStore {
    async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, 64).await?;

        let mut chunks = self.chunks.write().map_err(poisoned)?;
        for (record, vector) in records.iter().zip(vectors) {
            chunks.insert(
                record.id.clone(),
                StoredChunk {
                    record: record.clone(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<usize> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        let before = chunks.len();
        match selector {
            DeleteSelector::Ids(ids) => {
                for id in ids {
                    chunks.remove(id);
                }
            }
            DeleteSelector::Where(filter) => {
                chunks.retain(|_, c| !filter.matches(&c.record.metadata));
            }
        }
        Ok(before - chunks.len())
    }

    async fn get(&self, filter: &WhereFilter, limit: Option<usize>) -> Result<Vec<ChunkRecord>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut records: Vec<ChunkRecord> = chunks
            .values()
            .filter(|c| filter.matches(&c.record.metadata))
            .map(|c| c.record.clone())
            .collect();
        sort_records(&mut records);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: &WhereFilter,
    ) -> Result<Vec<QueryMatch>> {
        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let chunks = self.chunks.read().map_err(poisoned)?;
        let matches: Vec<QueryMatch> = chunks
            .values()
            .filter(|c| filter.matches(&c.record.metadata))
            .map(|c| QueryMatch {
                record: c.record.clone(),
                distance: 1.0 - cosine_similarity(&query_vec, &c.vector),
            })
            .collect();
        Ok(rank_matches(matches, n_results))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().map_err(poisoned)?.len())
    }
}
