//! # repo-search
//!
//! Local document ingestion and hybrid retrieval over a directory tree of
//! markdown, PDF, DOCX and XLSX files.
//!
//! Files are extracted to plain text, described with path- and
//! content-derived metadata, chunked with heading context, and written to a
//! SQLite-backed embedding store. A BM25 keyword index is rebuilt from the
//! stored chunks after every run. Queries run semantic, keyword or hybrid
//! (Reciprocal Rank Fusion) search, or plain metadata-filtered reads.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────┐   ┌──────────────┐
//! │ discover │──▶│ hash diff │──▶│ extract +   │──▶│ SQLite store │
//! │  (walk)  │   │  (cache)  │   │ meta + chunk│   │  + BM25 blob │
//! └──────────┘   └───────────┘   └─────────────┘   └──────┬───────┘
//!                                                         │
//!                           ┌─────────────────────────────┤
//!                           ▼                             ▼
//!                    ┌─────────────┐               ┌────────────┐
//!                    │ search (RRF)│               │ get / list │
//!                    └─────────────┘               │ stats/prune│
//!                                                  └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | File → plain text |
//! | [`metadata`] | Area, title, date, status |
//! | [`chunk`] | Recursive chunking with heading context |
//! | [`hash_cache`] | Per-file content hashes |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Embedding store trait and backends |
//! | [`bm25`] | Keyword index |
//! | [`index`] | On-disk index handle |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Semantic, keyword and hybrid search |
//! | [`get`] | File, area and date-range retrieval |
//! | [`stats`] | Listing and statistics |
//! | [`prune`] | Removal of deleted files |

pub mod bm25;
pub mod chunk;
pub mod config;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod get;
pub mod hash_cache;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod prune;
pub mod search;
pub mod stats;
pub mod store;
