//! Error types shared across the ingestion and query layers.
//!
//! Per-file problems ([`ExtractError`], [`ChunkError`]) are recovered by the
//! orchestrator; [`IndexError`] covers failures of the persisted index itself
//! and is surfaced to the CLI.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a file into plain text.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file extension is not one of the supported document formats.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Invalid chunking parameters.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    InvalidOverlap { size: usize, overlap: usize },
}

/// Errors from the persisted index (embedding store, BM25 blob).
#[derive(Error, Debug)]
pub enum IndexError {
    /// A query was issued before any ingestion created the index.
    #[error("No index found at {path} (collection `{collection}`). Run ingest first.")]
    IndexNotFound { path: PathBuf, collection: String },

    /// The collection was created with a different embedding model.
    #[error("Embedding model mismatch for collection `{collection}`: index uses `{index_model}`, active is `{active_model}`.")]
    EmbeddingModelMismatch {
        collection: String,
        index_model: String,
        active_model: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("BM25 index I/O error at {path}: {message}")]
    Bm25Io { path: PathBuf, message: String },

    #[error("BM25 index at {path} is unreadable: {message}")]
    Bm25Parse { path: PathBuf, message: String },
}
