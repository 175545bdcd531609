//! The on-disk index: SQLite embedding store, BM25 blob and hash cache,
//! all inside one directory (default `<root>/.vectordb`). The store holds
//! every collection; the BM25 blob and hash cache are per collection.
//!
//! An [`Index`] is an explicitly constructed handle. Ingestion uses
//! [`Index::create`]; queries use [`Index::open`], which never creates
//! anything and fails with [`IndexError::IndexNotFound`] instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::bm25::{self, Bm25Corpus};
use crate::config::{Config, DEFAULT_DB_DIR};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::IndexError;
use crate::hash_cache;
use crate::migrate;
use crate::store::sqlite::{find_collection, SqliteStore};
use crate::store::{EmbeddingStore, WhereFilter};

/// Resolves the index directory: explicit flag, then config, then
/// `<base>/.vectordb`.
pub fn resolve_index_dir(cli: Option<&Path>, config: &Config, base: &Path) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or_else(|| config.index.db_path.clone())
        .unwrap_or_else(|| base.join(DEFAULT_DB_DIR))
}

pub struct Index {
    dir: PathBuf,
    store: SqliteStore,
}

impl Index {
    /// Opens the index for writing, creating the directory, schema and
    /// collection as needed.
    pub async fn create(dir: &Path, config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::create_with(dir, &config.index.collection, embedder, config.embedding.batch_size)
            .await
    }

    pub async fn create_with(
        dir: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let pool = db::connect(dir).await?;
        migrate::run_migrations(&pool).await?;

        let store = SqliteStore::new(pool, collection, embedder, batch_size);
        store.ensure_collection().await?;

        Ok(Self {
            dir: dir.to_path_buf(),
            store,
        })
    }

    /// Opens an existing index for reading.
    pub async fn open(dir: &Path, config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::open_with(dir, &config.index.collection, embedder, config.embedding.batch_size)
            .await
    }

    pub async fn open_with(
        dir: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let not_found = || IndexError::IndexNotFound {
            path: dir.to_path_buf(),
            collection: collection.to_string(),
        };

        let pool = db::connect_existing(dir).await?.ok_or_else(not_found)?;
        migrate::run_migrations(&pool).await?;

        let Some(info) = find_collection(&pool, collection).await? else {
            pool.close().await;
            return Err(not_found().into());
        };
        if info.embedding_model != embedder.model_name() {
            pool.close().await;
            return Err(IndexError::EmbeddingModelMismatch {
                collection: info.name,
                index_model: info.embedding_model,
                active_model: embedder.model_name().to_string(),
            }
            .into());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            store: SqliteStore::new(pool, collection, embedder, batch_size),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }

    pub fn store(&self) -> &dyn EmbeddingStore {
        &self.store
    }

    pub fn bm25_path(&self) -> PathBuf {
        bm25::bm25_path(&self.dir, self.collection())
    }

    pub fn hash_cache_path(&self) -> PathBuf {
        hash_cache::hash_cache_path(&self.dir, self.collection())
    }

    /// Loads the persisted BM25 corpus; `None` when it was never built.
    pub fn load_bm25(&self) -> Result<Option<Bm25Corpus>> {
        Ok(bm25::load_bm25_corpus(&self.bm25_path())?)
    }

    /// Refits BM25 over every chunk of this collection and persists it.
    /// Returns the number of documents indexed.
    pub async fn rebuild_bm25(&self) -> Result<usize> {
        rebuild_bm25(self.store(), &self.bm25_path()).await
    }

    pub async fn close(self) {
        self.store.pool().close().await;
    }
}

/// Refits BM25 from `store` and writes the blob to `bm25_file`.
pub async fn rebuild_bm25(store: &dyn EmbeddingStore, bm25_file: &Path) -> Result<usize> {
    let records = store.get(&WhereFilter::all(), None).await?;
    let corpus = Bm25Corpus::build(&records);
    bm25::save_bm25_corpus(&corpus, bm25_file)?;
    tracing::info!("Rebuilt BM25 index over {} chunks", corpus.len());
    Ok(corpus.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_index_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(".vectordb");
        let err = Index::open_with(&dir, "brain", Arc::new(HashEmbedder::default()), 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::IndexNotFound { .. })
        ));
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_open_unknown_collection_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(".vectordb");
        Index::create_with(&dir, "brain", Arc::new(HashEmbedder::default()), 8)
            .await
            .unwrap()
            .close()
            .await;

        let err = Index::open_with(&dir, "other", Arc::new(HashEmbedder::default()), 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::IndexNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_then_open() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        let index = Index::create_with(&dir, "brain", Arc::new(HashEmbedder::default()), 8)
            .await
            .unwrap();
        assert_eq!(index.rebuild_bm25().await.unwrap(), 0);
        assert!(index.bm25_path().exists());
        index.close().await;

        let index = Index::open_with(&dir, "brain", Arc::new(HashEmbedder::default()), 8)
            .await
            .unwrap();
        assert_eq!(index.collection(), "brain");
        assert!(index.load_bm25().unwrap().is_some());
        index.close().await;
    }

    #[tokio::test]
    async fn test_collections_have_their_own_side_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        let brain = Index::create_with(&dir, "brain", Arc::new(HashEmbedder::default()), 8)
            .await
            .unwrap();
        brain.rebuild_bm25().await.unwrap();
        let brain_bm25 = brain.bm25_path();
        let brain_cache = brain.hash_cache_path();
        brain.close().await;

        let other = Index::create_with(&dir, "other", Arc::new(HashEmbedder::default()), 8)
            .await
            .unwrap();
        assert_ne!(other.bm25_path(), brain_bm25);
        assert_ne!(other.hash_cache_path(), brain_cache);
        assert!(other.load_bm25().unwrap().is_none());
        other.close().await;
    }

    #[test]
    fn test_resolve_index_dir_precedence() {
        let mut config = Config::default();
        let base = Path::new("/notes");
        assert_eq!(
            resolve_index_dir(None, &config, base),
            PathBuf::from("/notes/.vectordb")
        );
        config.index.db_path = Some(PathBuf::from("/data/idx"));
        assert_eq!(
            resolve_index_dir(None, &config, base),
            PathBuf::from("/data/idx")
        );
        assert_eq!(
            resolve_index_dir(Some(Path::new("/cli")), &config, base),
            PathBuf::from("/cli")
        );
    }
}
