//! Core data models used throughout repo-search.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the ingestion and retrieval pipeline.

use std::path::Path;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Document formats the pipeline can extract text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Markdown,
    Pdf,
    Docx,
    Xlsx,
}

impl FileFormat {
    /// Every supported format, in discovery order.
    pub const ALL: [FileFormat; 4] = [
        FileFormat::Markdown,
        FileFormat::Pdf,
        FileFormat::Docx,
        FileFormat::Xlsx,
    ];

    /// Detects the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.') {
            "md" => Some(FileFormat::Markdown),
            "pdf" => Some(FileFormat::Pdf),
            "docx" => Some(FileFormat::Docx),
            "xlsx" => Some(FileFormat::Xlsx),
            _ => None,
        }
    }

    /// Extension without the leading dot; also the `file_type` metadata value.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Markdown => "md",
            FileFormat::Pdf => "pdf",
            FileFormat::Docx => "docx",
            FileFormat::Xlsx => "xlsx",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Metadata stored alongside every chunk.
///
/// Empty strings mean "absent" for `sub_area`, `date` and `status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ChunkMetadata {
    /// Path relative to the ingestion root, `/`-separated.
    pub file_path: String,
    pub file_type: String,
    pub area: String,
    pub sub_area: String,
    pub title: String,
    /// `YYYY-MM-DD` or empty.
    pub date: String,
    pub status: String,
    pub file_size: u64,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub chunk_length: usize,
    /// RFC 3339 timestamp of the ingestion run that wrote the chunk.
    pub ingested_at: String,
}

/// A chunk as held by the embedding store and the BM25 corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl ChunkRecord {
    /// Stable chunk identity: `{file_path}::chunk_{index}`.
    pub fn make_id(file_path: &str, chunk_index: usize) -> String {
        format!("{}::chunk_{}", file_path, chunk_index)
    }
}

/// A ranked result returned from the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Similarity (`1 - distance`), BM25 score, or fused RRF score, depending on mode.
    pub score: f64,
    /// Store-reported cosine distance, for hits that came from a vector query.
    /// Reranking boosts `score` only, so this stays the raw value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl SearchHit {
    pub fn from_record(record: ChunkRecord, score: f64) -> Self {
        Self {
            id: record.id,
            text: record.text,
            metadata: record.metadata,
            score,
            distance: None,
        }
    }
}

/// Output rendering for query commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path_is_case_insensitive() {
        assert_eq!(
            FileFormat::from_path(Path::new("notes/Plan.MD")),
            Some(FileFormat::Markdown)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("a/b/report.xlsx")),
            Some(FileFormat::Xlsx)
        );
        assert_eq!(FileFormat::from_path(Path::new("a/b/script.py")), None);
        assert_eq!(FileFormat::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(
            ChunkRecord::make_id("projects/alpha/plan.md", 3),
            "projects/alpha/plan.md::chunk_3"
        );
    }
}
