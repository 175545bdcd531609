//! Ingestion pipeline orchestration.
//!
//! Coordinates the full run: discovery → hash diff → extraction → metadata →
//! chunking → title enrichment → storage → BM25 rebuild. Unchanged files are
//! skipped via the hash cache; extraction failures skip the file and leave
//! its cache entry untouched so it is retried next run.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::chunk::{chunk_text, enrich_with_title};
use crate::config::Config;
use crate::discover::{discover_files, DiscoveredFile};
use crate::extract::extract_text;
use crate::bm25::bm25_path;
use crate::hash_cache::{compute_file_hash, hash_cache_path, FileChange, HashCache};
use crate::index::{rebuild_bm25, Index};
use crate::metadata::{extract_metadata, DocumentMetadata};
use crate::models::ChunkRecord;
use crate::store::{DeleteSelector, EmbeddingStore, WhereFilter};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub dry_run: bool,
    pub force: bool,
    pub verbose: bool,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub discovered: usize,
    pub unchanged: usize,
    /// Files whose chunks were (re)written, including zero-chunk files.
    pub processed: usize,
    /// Files that could not be hashed or extracted.
    pub skipped: usize,
    pub chunks_added: usize,
    pub chunks_in_store: usize,
    pub elapsed: Duration,
}

/// A discovered file that needs (re)processing.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub file: DiscoveredFile,
    pub hash: String,
    pub change: FileChange,
}

/// Result of discovery and hash diffing.
#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub discovered: usize,
    pub pending: Vec<PendingFile>,
    pub unchanged: usize,
    /// Files whose content could not be hashed.
    pub unreadable: usize,
    pub cache: HashCache,
}

/// A file after extraction and chunking, ready for storage.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub metadata: DocumentMetadata,
    pub chunks: Vec<String>,
}

impl PreparedFile {
    /// Chunk records with ids `{file_path}::chunk_{i}`.
    pub fn records(&self, ingested_at: &str) -> Vec<ChunkRecord> {
        let count = self.chunks.len();
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord {
                id: ChunkRecord::make_id(&self.metadata.file_path, i),
                text: text.clone(),
                metadata: self
                    .metadata
                    .for_chunk(i, count, text.chars().count(), ingested_at),
            })
            .collect()
    }
}

/// Discovers files under the root and classifies each against the hash
/// cache. Reads only.
pub fn plan_ingest(config: &Config, opts: &IngestOptions) -> Result<IngestPlan> {
    let files = discover_files(&opts.root, &config.discovery, Some(&opts.index_dir))?;
    let cache = HashCache::load(&hash_cache_path(&opts.index_dir, &config.index.collection));

    let mut pending = Vec::new();
    let mut unchanged = 0;
    let mut unreadable = 0;

    for file in &files {
        let hash = match compute_file_hash(&file.path) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", file.rel_path, e);
                unreadable += 1;
                continue;
            }
        };
        let change = cache.classify(&file.rel_path, &hash, opts.force);
        tracing::debug!("{} {}", change, file.rel_path);
        if opts.verbose {
            println!("  {:<9} {}", change.to_string(), file.rel_path);
        }
        match change {
            FileChange::Unchanged => unchanged += 1,
            FileChange::New | FileChange::Changed => pending.push(PendingFile {
                file: file.clone(),
                hash,
                change,
            }),
        }
    }

    Ok(IngestPlan {
        discovered: files.len(),
        pending,
        unchanged,
        unreadable,
        cache,
    })
}

/// Extracts, describes and chunks one file.
pub fn prepare_file(file: &DiscoveredFile, root: &Path, config: &Config) -> Result<PreparedFile> {
    let content = extract_text(&file.path)?;
    let file_size = std::fs::metadata(&file.path)
        .map(|m| m.len())
        .unwrap_or(content.len() as u64);
    let metadata = extract_metadata(&file.path, root, &content, file_size);

    let params = config.chunking.params_for(file.format);
    let chunks = chunk_text(&content, file.format, &params)?;
    let chunks = enrich_with_title(chunks, &metadata.title);

    Ok(PreparedFile { metadata, chunks })
}

/// Runs a full ingestion: plan, then (unless `dry_run`) write chunks, rebuild
/// BM25 and persist the hash cache. Prints a human-readable summary.
pub async fn run_ingest(config: &Config, opts: &IngestOptions) -> Result<IngestReport> {
    let start = Instant::now();
    let plan = plan_ingest(config, opts)?;

    println!("Found {} files", plan.discovered);
    println!(
        "Files to process: {} (unchanged: {})",
        plan.pending.len(),
        plan.unchanged
    );

    if opts.dry_run {
        return Ok(dry_run(config, opts, &plan, start));
    }

    if plan.pending.is_empty() {
        println!("Nothing to update: all files are current");
        return Ok(IngestReport {
            discovered: plan.discovered,
            unchanged: plan.unchanged,
            skipped: plan.unreadable,
            elapsed: start.elapsed(),
            ..IngestReport::default()
        });
    }

    let index = Index::create(&opts.index_dir, config).await?;
    let result = apply_plan(index.store(), &opts.index_dir, plan, config, opts).await;
    index.close().await;

    let mut report = result?;
    report.elapsed = start.elapsed();

    println!();
    println!("Ingestion complete");
    println!("  Files processed:    {}", report.processed);
    println!("  Files skipped:      {}", report.skipped);
    println!("  Total chunks added: {}", report.chunks_added);
    println!("  Total chunks in DB: {}", report.chunks_in_store);
    println!("  Time:               {:.1}s", report.elapsed.as_secs_f64());
    println!("  DB location:        {}", opts.index_dir.display());

    Ok(report)
}

fn dry_run(config: &Config, opts: &IngestOptions, plan: &IngestPlan, start: Instant) -> IngestReport {
    println!();
    println!("=== DRY RUN: no changes made ===");

    let mut report = IngestReport {
        discovered: plan.discovered,
        unchanged: plan.unchanged,
        skipped: plan.unreadable,
        ..IngestReport::default()
    };

    for pending in &plan.pending {
        match prepare_file(&pending.file, &opts.root, config) {
            Ok(prepared) => {
                let meta = &prepared.metadata;
                println!(
                    "  {}: {} chunks, type={}, area={}, title={}",
                    meta.file_path,
                    prepared.chunks.len(),
                    meta.file_type,
                    meta.area,
                    meta.title
                );
                report.processed += 1;
                report.chunks_added += prepared.chunks.len();
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", pending.file.rel_path, e);
                report.skipped += 1;
            }
        }
    }

    println!("Total chunks: {}", report.chunks_added);
    report.elapsed = start.elapsed();
    report
}

/// Writes every pending file into `store`, then rebuilds BM25 and persists
/// the hash cache of the configured collection under `index_dir`.
///
/// Old chunks of a file are deleted before its new chunks are added, and its
/// cache entry is updated only after both succeeded. Store failures abort
/// the run; entries recorded so far are still saved.
pub async fn apply_plan(
    store: &dyn EmbeddingStore,
    index_dir: &Path,
    plan: IngestPlan,
    config: &Config,
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let ingested_at = chrono::Utc::now().to_rfc3339();
    let collection = &config.index.collection;
    let cache_path = hash_cache_path(index_dir, collection);
    let mut cache = plan.cache;
    let total = plan.pending.len();

    let mut report = IngestReport {
        discovered: plan.discovered,
        unchanged: plan.unchanged,
        skipped: plan.unreadable,
        ..IngestReport::default()
    };

    for (i, pending) in plan.pending.iter().enumerate() {
        let rel_path = &pending.file.rel_path;

        let prepared = match prepare_file(&pending.file, &opts.root, config) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", rel_path, e);
                report.skipped += 1;
                continue;
            }
        };

        let records = prepared.records(&ingested_at);
        let stored = store_file(store, rel_path, &records).await;
        if let Err(e) = stored {
            cache.save(&cache_path)?;
            return Err(e);
        }
        cache.set(rel_path, &pending.hash);

        if opts.verbose {
            println!("  [{}/{}] {}: {} chunks", i + 1, total, rel_path, records.len());
        }
        tracing::debug!("Stored {} ({} chunks)", rel_path, records.len());
        report.processed += 1;
        report.chunks_added += records.len();
    }

    rebuild_bm25(store, &bm25_path(index_dir, collection)).await?;
    cache.save(&cache_path)?;
    report.chunks_in_store = store.count().await?;

    Ok(report)
}

async fn store_file(store: &dyn EmbeddingStore, rel_path: &str, records: &[ChunkRecord]) -> Result<()> {
    store
        .delete(&DeleteSelector::Where(WhereFilter::file_path(rel_path)))
        .await
        .with_context(|| format!("Failed to delete old chunks for {}", rel_path))?;
    store
        .add(records)
        .await
        .with_context(|| format!("Failed to store chunks for {}", rel_path))?;
    Ok(())
}
