//! Index listing and statistics.
//!
//! `list` aggregates chunks per file; `stats` summarizes the whole
//! collection: chunk and file counts, total content size, chunks per area,
//! and the span of document dates.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::db::DB_FILE;
use crate::index::Index;
use crate::models::{ChunkRecord, OutputFormat};
use crate::store::WhereFilter;

/// Per-file aggregate shown by `list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub title: String,
    pub area: String,
    pub sub_area: String,
    pub date: String,
    pub chunks: usize,
}

/// Groups chunks by file path (sorted). Document-level fields come from the
/// first chunk seen for each file.
pub fn summarize_files(records: &[ChunkRecord]) -> BTreeMap<String, FileSummary> {
    let mut files: BTreeMap<String, FileSummary> = BTreeMap::new();
    for record in records {
        let meta = &record.metadata;
        files
            .entry(meta.file_path.clone())
            .or_insert_with(|| FileSummary {
                title: meta.title.clone(),
                area: meta.area.clone(),
                sub_area: meta.sub_area.clone(),
                date: meta.date.clone(),
                chunks: 0,
            })
            .chunks += 1;
    }
    files
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_files: usize,
    /// Sum of chunk lengths, in characters.
    pub total_content_size: usize,
    pub areas: BTreeMap<String, usize>,
    pub date_range: DateRange,
    #[serde(skip)]
    pub last_ingested_at: Option<String>,
}

pub fn compute_stats(records: &[ChunkRecord]) -> IndexStats {
    let mut stats = IndexStats {
        total_chunks: records.len(),
        ..IndexStats::default()
    };
    let mut files = BTreeSet::new();

    for record in records {
        let meta = &record.metadata;
        let area = if meta.area.is_empty() {
            "unknown"
        } else {
            meta.area.as_str()
        };
        *stats.areas.entry(area.to_string()).or_insert(0) += 1;
        files.insert(meta.file_path.as_str());
        stats.total_content_size += meta.chunk_length;

        if !meta.date.is_empty() {
            let range = &mut stats.date_range;
            if range.earliest.as_deref().is_none_or(|d| meta.date.as_str() < d) {
                range.earliest = Some(meta.date.clone());
            }
            if range.latest.as_deref().is_none_or(|d| meta.date.as_str() > d) {
                range.latest = Some(meta.date.clone());
            }
        }
        if stats
            .last_ingested_at
            .as_deref()
            .is_none_or(|t| meta.ingested_at.as_str() > t)
        {
            stats.last_ingested_at = Some(meta.ingested_at.clone());
        }
    }

    stats.total_files = files.len();
    stats
}

/// CLI entry point for `query list`.
pub async fn run_list(config: &Config, index_dir: &Path, format: OutputFormat) -> Result<()> {
    let index = Index::open(index_dir, config).await?;
    let result = index.store().get(&WhereFilter::all(), None).await;
    index.close().await;
    let files = summarize_files(&result?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    println!("Indexed files: {}", files.len());
    println!("{}", "=".repeat(60));
    for (path, info) in &files {
        println!("  {}", path);
        println!(
            "    Title: {} | Area: {}/{} | Chunks: {} | Date: {}",
            info.title, info.area, info.sub_area, info.chunks, info.date
        );
    }
    Ok(())
}

/// CLI entry point for `query stats`.
pub async fn run_stats(config: &Config, index_dir: &Path, format: OutputFormat) -> Result<()> {
    let index = Index::open(index_dir, config).await?;
    let collection = index.collection().to_string();
    let result = index.store().get(&WhereFilter::all(), None).await;
    index.close().await;
    let stats = compute_stats(&result?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(index_dir.join(DB_FILE))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("=== Vector DB Stats ===");
    println!("Collection: {}", collection);
    println!("Database: {} ({})", index_dir.display(), format_bytes(db_size));
    println!("Total chunks: {}", stats.total_chunks);
    println!("Total files: {}", stats.total_files);
    println!(
        "Total content: {} characters",
        format_thousands(stats.total_content_size)
    );
    if let (Some(earliest), Some(latest)) = (&stats.date_range.earliest, &stats.date_range.latest) {
        println!("Date range: {} to {}", earliest, latest);
    }
    if let Some(ts) = &stats.last_ingested_at {
        println!("Last ingested: {}", format_ts_relative(ts));
    }
    println!();
    println!("Chunks by area:");
    for (area, count) in &stats.areas {
        println!("  {}: {}", area, count);
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// `1234567` → `1,234,567`.
fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format an RFC 3339 timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(rfc3339: &str) -> String {
    let Ok(ts) = chrono::DateTime::parse_from_rfc3339(rfc3339) else {
        return rfc3339.to_string();
    };
    let delta = chrono::Utc::now().timestamp() - ts.timestamp();

    if delta < 0 {
        ts.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn record(path: &str, idx: usize, area: &str, date: &str, len: usize) -> ChunkRecord {
        ChunkRecord {
            id: ChunkRecord::make_id(path, idx),
            text: "x".repeat(len),
            metadata: ChunkMetadata {
                file_path: path.to_string(),
                title: format!("Title of {}", path),
                area: area.to_string(),
                date: date.to_string(),
                chunk_index: idx,
                chunk_length: len,
                ingested_at: format!("2025-03-0{}T00:00:00+00:00", idx + 1),
                ..ChunkMetadata::default()
            },
        }
    }

    fn corpus() -> Vec<ChunkRecord> {
        vec![
            record("finance/budget.md", 0, "finance", "2025-02-01", 100),
            record("finance/budget.md", 1, "finance", "2025-02-01", 80),
            record("health/sleep.md", 0, "health", "2024-11-15", 60),
            record("misc.md", 2, "", "", 10),
        ]
    }

    #[test]
    fn test_summarize_files() {
        let files = summarize_files(&corpus());
        let paths: Vec<_> = files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["finance/budget.md", "health/sleep.md", "misc.md"]);
        assert_eq!(files["finance/budget.md"].chunks, 2);
        assert_eq!(files["health/sleep.md"].title, "Title of health/sleep.md");
    }

    #[test]
    fn test_compute_stats() {
        let stats = compute_stats(&corpus());
        assert_eq!(stats.total_chunks, 4);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_content_size, 250);
        assert_eq!(stats.areas["finance"], 2);
        assert_eq!(stats.areas["unknown"], 1);
        assert_eq!(stats.date_range.earliest.as_deref(), Some("2024-11-15"));
        assert_eq!(stats.date_range.latest.as_deref(), Some("2025-02-01"));
        assert_eq!(
            stats.last_ingested_at.as_deref(),
            Some("2025-03-03T00:00:00+00:00")
        );
    }

    #[test]
    fn test_stats_json_shape() {
        let json = serde_json::to_value(compute_stats(&[])).unwrap();
        assert_eq!(json["total_chunks"], 0);
        assert!(json["date_range"]["earliest"].is_null());
        assert!(json.get("last_ingested_at").is_none());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_ts_relative("not a time"), "not a time");
    }
}
