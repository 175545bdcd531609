//! SQLite-backed [`EmbeddingStore`] implementation.
//!
//! Chunks of every collection share one `chunks` table, scoped by the
//! `collection` column. Vectors are stored as little-endian f32 BLOBs and
//! similarity queries are brute-force cosine over the filtered rows.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, embed_batched, vec_to_blob, Embedder};
use crate::error::IndexError;
use crate::models::{ChunkMetadata, ChunkRecord};

use super::{rank_matches, DeleteSelector, EmbeddingStore, QueryMatch, WhereFilter};

/// SQLite implementation of the [`EmbeddingStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

/// A row of the `collections` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub embedding_model: String,
    pub dims: usize,
    pub created_at: String,
}

impl SqliteStore {
    pub fn new(
        pool: SqlitePool,
        collection: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
            embedder,
            batch_size,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Registers the collection with the active embedder, or checks that an
    /// existing collection was built with the same model.
    pub async fn ensure_collection(&self) -> Result<CollectionInfo> {
        if let Some(info) = find_collection(&self.pool, &self.collection).await? {
            if info.embedding_model != self.embedder.model_name() {
                return Err(IndexError::EmbeddingModelMismatch {
                    collection: info.name,
                    index_model: info.embedding_model,
                    active_model: self.embedder.model_name().to_string(),
                }
                .into());
            }
            return Ok(info);
        }

        let info = CollectionInfo {
            name: self.collection.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        sqlx::query(
            "INSERT INTO collections (name, embedding_model, dims, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&info.name)
        .bind(&info.embedding_model)
        .bind(info.dims as i64)
        .bind(&info.created_at)
        .execute(&self.pool)
        .await
        .map_err(IndexError::from)?;

        tracing::info!(
            "Created collection `{}` ({}, {} dims)",
            info.name,
            info.embedding_model,
            info.dims
        );
        Ok(info)
    }
}

/// Looks up a collection by name.
pub async fn find_collection(pool: &SqlitePool, name: &str) -> Result<Option<CollectionInfo>> {
    let row = sqlx::query(
        "SELECT name, embedding_model, dims, created_at FROM collections WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(IndexError::from)?;

    Ok(row.map(|r| CollectionInfo {
        name: r.get("name"),
        embedding_model: r.get("embedding_model"),
        dims: r.get::<i64, _>("dims") as usize,
        created_at: r.get("created_at"),
    }))
}

/// Renders `filter` as SQL conditions (appended after the collection
/// predicate) plus their bind values, in order.
fn where_clause(filter: &WhereFilter) -> (String, Vec<String>) {
    let mut sql = String::new();
    let mut binds = Vec::new();

    let mut push = |cond: &str, value: &Option<String>| {
        if let Some(v) = value {
            sql.push_str(" AND ");
            sql.push_str(cond);
            binds.push(v.clone());
        }
    };
    push("file_path = ?", &filter.file_path);
    push("area = ?", &filter.area);
    push("sub_area = ?", &filter.sub_area);
    push("date <> '' AND date >= ?", &filter.date_gte);
    push("date <> '' AND date <= ?", &filter.date_lte);

    (sql, binds)
}

fn row_to_record(row: &SqliteRow) -> Result<ChunkRecord> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("Corrupt metadata for chunk {}", id))?;
    Ok(ChunkRecord {
        id,
        text: row.get("text"),
        metadata,
    })
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, self.batch_size).await?;

        let mut tx = self.pool.begin().await.map_err(IndexError::from)?;
        for (record, vector) in records.iter().zip(vectors.iter()) {
            let meta = &record.metadata;
            sqlx::query(
                r#"
                INSERT INTO chunks (collection, id, file_path, chunk_index, area, sub_area,
                                    date, text, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    file_path = excluded.file_path,
                    chunk_index = excluded.chunk_index,
                    area = excluded.area,
                    sub_area = excluded.sub_area,
                    date = excluded.date,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&meta.file_path)
            .bind(meta.chunk_index as i64)
            .bind(&meta.area)
            .bind(&meta.sub_area)
            .bind(&meta.date)
            .bind(&record.text)
            .bind(serde_json::to_string(meta)?)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(IndexError::from)?;
        }
        tx.commit().await.map_err(IndexError::from)?;

        tracing::debug!("Stored {} chunks in `{}`", records.len(), self.collection);
        Ok(())
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<usize> {
        let removed = match selector {
            DeleteSelector::Ids(ids) => {
                let mut tx = self.pool.begin().await.map_err(IndexError::from)?;
                let mut removed = 0u64;
                for id in ids {
                    let result = sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                        .bind(&self.collection)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(IndexError::from)?;
                    removed += result.rows_affected();
                }
                tx.commit().await.map_err(IndexError::from)?;
                removed
            }
            DeleteSelector::Where(filter) => {
                let (cond, binds) = where_clause(filter);
                let sql = format!("DELETE FROM chunks WHERE collection = ?{}", cond);
                let mut query = sqlx::query(&sql).bind(&self.collection);
                for value in &binds {
                    query = query.bind(value);
                }
                query
                    .execute(&self.pool)
                    .await
                    .map_err(IndexError::from)?
                    .rows_affected()
            }
        };
        Ok(removed as usize)
    }

    async fn get(&self, filter: &WhereFilter, limit: Option<usize>) -> Result<Vec<ChunkRecord>> {
        let (cond, binds) = where_clause(filter);
        let mut sql = format!(
            "SELECT id, text, metadata_json FROM chunks WHERE collection = ?{} \
             ORDER BY file_path, chunk_index",
            cond
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql).bind(&self.collection);
        for value in &binds {
            query = query.bind(value);
        }
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(IndexError::from)?;
        rows.iter().map(row_to_record).collect()
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
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector for the query"))?;

        let (cond, binds) = where_clause(filter);
        let sql = format!(
            "SELECT id, text, metadata_json, embedding FROM chunks WHERE collection = ?{}",
            cond
        );
        let mut query = sqlx::query(&sql).bind(&self.collection);
        for value in &binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(IndexError::from)?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            matches.push(QueryMatch {
                record: row_to_record(row)?,
                distance: 1.0 - cosine_similarity(&query_vec, &vector),
            });
        }
        Ok(rank_matches(matches, n_results))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(IndexError::from)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir, collection: &str) -> SqliteStore {
        let pool = crate::db::connect(tmp.path()).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let store = SqliteStore::new(pool, collection, Arc::new(HashEmbedder::new(64)), 16);
        store.ensure_collection().await.unwrap();
        store
    }

    fn record(path: &str, idx: usize, area: &str, date: &str, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: ChunkRecord::make_id(path, idx),
            text: text.to_string(),
            metadata: ChunkMetadata {
                file_path: path.to_string(),
                area: area.to_string(),
                date: date.to_string(),
                chunk_index: idx,
                ..ChunkMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn test_add_get_roundtrip_preserves_metadata() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "brain").await;
        let r = record("areas/x/a.md", 0, "areas", "2025-02-01", "some text");
        store.add(std::slice::from_ref(&r)).await.unwrap();

        let got = store.get(&WhereFilter::all(), None).await.unwrap();
        assert_eq!(got, vec![r]);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_filters_and_delete() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "brain").await;
        store
            .add(&[
                record("a.md", 0, "a", "2025-01-10", "first chunk of a"),
                record("a.md", 1, "a", "2025-01-10", "second chunk of a"),
                record("b.md", 0, "b", "", "only chunk of b"),
            ])
            .await
            .unwrap();

        let dated = store
            .get(&WhereFilter::date_range("2025-01-01", "2025-01-31"), None)
            .await
            .unwrap();
        assert_eq!(dated.len(), 2);

        let limited = store.get(&WhereFilter::area("a"), Some(1)).await.unwrap();
        assert_eq!(limited[0].id, "a.md::chunk_0");

        let removed = store
            .delete(&DeleteSelector::Where(WhereFilter::file_path("a.md")))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let brain = open(&tmp, "brain").await;
        brain
            .add(&[record("a.md", 0, "a", "", "brain text")])
            .await
            .unwrap();

        let other = SqliteStore::new(
            brain.pool().clone(),
            "other",
            Arc::new(HashEmbedder::new(64)),
            16,
        );
        other.ensure_collection().await.unwrap();
        assert_eq!(other.count().await.unwrap(), 0);
        assert_eq!(brain.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_model_mismatch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "brain").await;
        let different = SqliteStore::new(
            store.pool().clone(),
            "brain",
            Arc::new(HashEmbedder::new(32)),
            16,
        );
        let err = different.ensure_collection().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::EmbeddingModelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "brain").await;
        store
            .add(&[
                record("a.md", 0, "a", "", "postgres replication lag alerts"),
                record("b.md", 0, "b", "", "garden tomato watering schedule"),
            ])
            .await
            .unwrap();

        let hits = store
            .query("postgres replication", 5, &WhereFilter::all())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "a.md::chunk_0");
        assert!(hits[0].distance < hits[1].distance);
    }
}
