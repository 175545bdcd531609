//! Removal of chunks whose source files no longer exist.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::hash_cache::HashCache;
use crate::index::{rebuild_bm25, Index};
use crate::store::{DeleteSelector, EmbeddingStore, WhereFilter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Relative paths of the deleted files, sorted.
    pub files: Vec<String>,
    pub chunks_removed: usize,
    pub cache_entries_removed: usize,
}

/// Deletes the chunks of every indexed file missing under `root`, then
/// rebuilds the BM25 blob at `bm25_file` (when anything was removed) and
/// drops stale entries from the hash cache at `cache_path`.
pub async fn prune_missing(
    store: &dyn EmbeddingStore,
    root: &Path,
    bm25_file: &Path,
    cache_path: &Path,
) -> Result<PruneReport> {
    let records = store.get(&WhereFilter::all(), None).await?;
    let indexed: BTreeSet<&str> = records
        .iter()
        .map(|r| r.metadata.file_path.as_str())
        .collect();

    let mut report = PruneReport::default();
    for rel_path in indexed {
        if root.join(rel_path).exists() {
            continue;
        }
        let removed = store
            .delete(&DeleteSelector::Where(WhereFilter::file_path(rel_path)))
            .await?;
        tracing::debug!("Pruned {} ({} chunks)", rel_path, removed);
        report.chunks_removed += removed;
        report.files.push(rel_path.to_string());
    }

    if !report.files.is_empty() {
        rebuild_bm25(store, bm25_file).await?;
    }

    let mut cache = HashCache::load(cache_path);
    let stale: Vec<String> = cache
        .paths()
        .filter(|p| !root.join(p).exists())
        .map(str::to_string)
        .collect();
    for path in &stale {
        cache.remove(path);
    }
    if !stale.is_empty() {
        cache.save(cache_path)?;
    }
    report.cache_entries_removed = stale.len();

    Ok(report)
}

/// CLI entry point for `query prune`.
pub async fn run_prune(config: &Config, index_dir: &Path, root: &Path) -> Result<PruneReport> {
    let index = Index::open(index_dir, config).await?;
    let result = prune_missing(
        index.store(),
        root,
        &index.bm25_path(),
        &index.hash_cache_path(),
    )
    .await;
    index.close().await;
    let report = result?;

    if report.files.is_empty() {
        println!("Nothing to prune: every indexed file still exists");
    } else {
        for path in &report.files {
            println!("  removed {}", path);
        }
        println!(
            "Pruned {} chunks from {} deleted files",
            report.chunks_removed,
            report.files.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bm25::{bm25_path, load_bm25_corpus};
    use crate::hash_cache::hash_cache_path;
    use crate::embedding::HashEmbedder;
    use crate::models::{ChunkMetadata, ChunkRecord};
    use crate::store::memory::InMemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(path: &str, idx: usize) -> ChunkRecord {
        ChunkRecord {
            id: ChunkRecord::make_id(path, idx),
            text: format!("content of {} chunk {}", path, idx),
            metadata: ChunkMetadata {
                file_path: path.to_string(),
                chunk_index: idx,
                ..ChunkMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn test_prune_removes_only_missing_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let index_dir = root.join(".vectordb");
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join("notes/kept.md"), "kept").unwrap();

        let store = InMemoryStore::new(Arc::new(HashEmbedder::new(32)));
        store
            .add(&[
                record("notes/kept.md", 0),
                record("notes/gone.md", 0),
                record("notes/gone.md", 1),
            ])
            .await
            .unwrap();

        let mut cache = HashCache::new();
        cache.set("notes/kept.md", "h1");
        cache.set("notes/gone.md", "h2");
        let bm25_file = bm25_path(&index_dir, "brain");
        let cache_path = hash_cache_path(&index_dir, "brain");
        cache.save(&cache_path).unwrap();

        let report = prune_missing(&store, root, &bm25_file, &cache_path)
            .await
            .unwrap();
        assert_eq!(report.files, vec!["notes/gone.md"]);
        assert_eq!(report.chunks_removed, 2);
        assert_eq!(report.cache_entries_removed, 1);

        let remaining = store.get(&WhereFilter::all(), None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.file_path, "notes/kept.md");

        let corpus = load_bm25_corpus(&bm25_file).unwrap().unwrap();
        assert_eq!(corpus.len(), 1);

        let cache = HashCache::load(&cache_path);
        assert_eq!(cache.get("notes/gone.md"), None);
        assert_eq!(cache.get("notes/kept.md"), Some("h1"));
    }

    #[tokio::test]
    async fn test_prune_with_nothing_missing_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "a").unwrap();
        let store = InMemoryStore::new(Arc::new(HashEmbedder::new(32)));
        store.add(&[record("a.md", 0)]).await.unwrap();

        let index_dir = tmp.path().join(".vectordb");
        let report = prune_missing(
            &store,
            tmp.path(),
            &bm25_path(&index_dir, "brain"),
            &hash_cache_path(&index_dir, "brain"),
        )
        .await
        .unwrap();
        assert_eq!(report, PruneReport::default());
        assert!(!index_dir.exists());
    }
}
