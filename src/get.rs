//! Metadata-filtered chunk retrieval: by file, by area, by date range.
//!
//! These are plain filtered reads of the embedding store; nothing is ranked.

use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::index::Index;
use crate::models::{ChunkMetadata, ChunkRecord, OutputFormat};
use crate::store::{EmbeddingStore, WhereFilter};

/// JSON shape of one retrieved chunk.
#[derive(Debug, Serialize)]
pub struct ChunkResponse<'a> {
    pub id: &'a str,
    pub metadata: &'a ChunkMetadata,
    pub content: &'a str,
}

fn to_responses(records: &[ChunkRecord]) -> Vec<ChunkResponse<'_>> {
    records
        .iter()
        .map(|r| ChunkResponse {
            id: &r.id,
            metadata: &r.metadata,
            content: &r.text,
        })
        .collect()
}

/// All chunks of one file (exact relative path), in chunk order.
pub async fn get_file(store: &dyn EmbeddingStore, file_path: &str) -> Result<Vec<ChunkRecord>> {
    let mut records = store.get(&WhereFilter::file_path(file_path), None).await?;
    records.sort_by_key(|r| r.metadata.chunk_index);
    Ok(records)
}

/// Up to `limit` chunks whose area equals `area`.
pub async fn get_area(
    store: &dyn EmbeddingStore,
    area: &str,
    limit: usize,
) -> Result<Vec<ChunkRecord>> {
    store.get(&WhereFilter::area(area), Some(limit)).await
}

/// Accepts only zero-padded `YYYY-MM-DD` calendar dates, the form stored in
/// chunk metadata, so that string comparison orders them correctly.
pub fn validate_date(date: &str) -> Result<()> {
    if date.len() != 10 || chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        bail!("Invalid date '{}': expected YYYY-MM-DD", date);
    }
    Ok(())
}

/// Up to `limit` chunks dated within `[start, end]` (inclusive). Undated
/// chunks never match.
pub async fn get_date_range(
    store: &dyn EmbeddingStore,
    start: &str,
    end: &str,
    limit: usize,
) -> Result<Vec<ChunkRecord>> {
    validate_date(start)?;
    validate_date(end)?;
    store
        .get(&WhereFilter::date_range(start, end), Some(limit))
        .await
}

fn print_json(records: &[ChunkRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&to_responses(records))?);
    Ok(())
}

/// CLI entry point for `query file`.
pub async fn run_get_file(
    config: &Config,
    index_dir: &Path,
    file_path: &str,
    format: OutputFormat,
) -> Result<()> {
    let index = Index::open(index_dir, config).await?;
    let result = get_file(index.store(), file_path).await;
    index.close().await;
    let records = result?;

    if format == OutputFormat::Json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No chunks found for: {}", file_path);
        return Ok(());
    }

    println!("File: {}", file_path);
    println!("Chunks: {}", records.len());
    println!("{}", "=".repeat(60));
    for record in &records {
        println!();
        println!(
            "--- Chunk {}/{} ---",
            record.metadata.chunk_index, record.metadata.chunk_count
        );
        println!("{}", record.text);
    }
    Ok(())
}

/// CLI entry point for `query area`.
pub async fn run_get_area(
    config: &Config,
    index_dir: &Path,
    area: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let index = Index::open(index_dir, config).await?;
    let result = get_area(index.store(), area, limit).await;
    index.close().await;
    let records = result?;

    if format == OutputFormat::Json {
        return print_json(&records);
    }

    println!("Area: {}", area);
    println!("Chunks: {}", records.len());
    println!("{}", "=".repeat(60));
    for record in &records {
        let meta = &record.metadata;
        println!();
        println!("--- {} [chunk {}] ---", meta.file_path, meta.chunk_index);
        if !meta.title.is_empty() {
            println!("Title: {}", meta.title);
        }
        println!();
        println!("{}", record.text);
    }
    Ok(())
}

/// CLI entry point for `query date-range`.
pub async fn run_get_date_range(
    config: &Config,
    index_dir: &Path,
    start: &str,
    end: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let index = Index::open(index_dir, config).await?;
    let result = get_date_range(index.store(), start, end, limit).await;
    index.close().await;
    let records = result?;

    if format == OutputFormat::Json {
        return print_json(&records);
    }

    println!("Date range: {} to {}", start, end);
    println!("Chunks: {}", records.len());
    println!("{}", "=".repeat(60));
    for record in &records {
        println!();
        println!(
            "--- {} [{}] ---",
            record.metadata.file_path, record.metadata.date
        );
        println!("{}", record.text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn record(path: &str, idx: usize, count: usize, area: &str, date: &str) -> ChunkRecord {
        ChunkRecord {
            id: ChunkRecord::make_id(path, idx),
            text: format!("{} part {}", path, idx),
            metadata: ChunkMetadata {
                file_path: path.to_string(),
                area: area.to_string(),
                date: date.to_string(),
                chunk_index: idx,
                chunk_count: count,
                ..ChunkMetadata::default()
            },
        }
    }

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new(Arc::new(HashEmbedder::new(32)));
        store
            .add(&[
                record("journal/jan.md", 2, 3, "journal", "2025-01-20"),
                record("journal/jan.md", 0, 3, "journal", "2025-01-20"),
                record("journal/jan.md", 1, 3, "journal", "2025-01-20"),
                record("journal/feb.md", 0, 1, "journal", "2025-02-03"),
                record("areas/health/sleep.md", 0, 1, "areas", ""),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_get_file_in_chunk_order() {
        let s = store().await;
        let records = get_file(&s, "journal/jan.md").await.unwrap();
        let idx: Vec<_> = records.iter().map(|r| r.metadata.chunk_index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
        assert!(get_file(&s, "journal").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_area_respects_limit() {
        let s = store().await;
        assert_eq!(get_area(&s, "journal", 50).await.unwrap().len(), 4);
        assert_eq!(get_area(&s, "journal", 2).await.unwrap().len(), 2);
        assert!(get_area(&s, "missing", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_date_range_inclusive_and_skips_undated() {
        let s = store().await;
        let jan = get_date_range(&s, "2025-01-01", "2025-01-20", 50)
            .await
            .unwrap();
        assert_eq!(jan.len(), 3);
        let all = get_date_range(&s, "2000-01-01", "2099-12-31", 50)
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_date_range_rejects_malformed_dates() {
        let s = store().await;
        assert!(get_date_range(&s, "2025-1-1", "2025-02-01", 10).await.is_err());
        assert!(get_date_range(&s, "2025-01-01", "yesterday", 10).await.is_err());
    }

    #[test]
    fn test_json_shape() {
        let records = vec![record("a.md", 0, 1, "a", "")];
        let json = serde_json::to_value(to_responses(&records)).unwrap();
        assert_eq!(json[0]["id"], "a.md::chunk_0");
        assert_eq!(json[0]["content"], "a.md part 0");
        assert_eq!(json[0]["metadata"]["chunk_count"], 1);
    }
}
