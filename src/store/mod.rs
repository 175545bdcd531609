//! Embedding store abstraction.
//!
//! The [`EmbeddingStore`] trait is the narrow surface the ingestion and
//! query layers need from a vector index: add, delete, filtered get,
//! similarity query, and count. Embedding happens inside the store, so
//! callers only ever hand over text and metadata.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkMetadata, ChunkRecord};

/// Equality and range conditions on chunk metadata. Unset fields match
/// everything; set fields are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereFilter {
    pub file_path: Option<String>,
    pub area: Option<String>,
    pub sub_area: Option<String>,
    /// Inclusive lower bound on `date` (`YYYY-MM-DD`).
    pub date_gte: Option<String>,
    /// Inclusive upper bound on `date` (`YYYY-MM-DD`).
    pub date_lte: Option<String>,
}

impl WhereFilter {
    /// Matches every chunk.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn file_path(path: impl Into<String>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn area(area: impl Into<String>) -> Self {
        Self {
            area: Some(area.into()),
            ..Self::default()
        }
    }

    pub fn date_range(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            date_gte: Some(start.into()),
            date_lte: Some(end.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Evaluates the filter against one chunk's metadata.
    ///
    /// Range bounds compare `YYYY-MM-DD` strings lexically; a chunk with an
    /// empty date never satisfies a range.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        if !eq(&self.file_path, &meta.file_path)
            || !eq(&self.area, &meta.area)
            || !eq(&self.sub_area, &meta.sub_area)
        {
            return false;
        }
        if self.date_gte.is_some() || self.date_lte.is_some() {
            if meta.date.is_empty() {
                return false;
            }
            if let Some(start) = &self.date_gte {
                if meta.date.as_str() < start.as_str() {
                    return false;
                }
            }
            if let Some(end) = &self.date_lte {
                if meta.date.as_str() > end.as_str() {
                    return false;
                }
            }
        }
        true
    }
}

/// What to remove in [`EmbeddingStore::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSelector {
    Ids(Vec<String>),
    Where(WhereFilter),
}

/// One similarity-query hit.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub record: ChunkRecord,
    /// Cosine distance (`1 - cosine similarity`); lower is closer.
    pub distance: f32,
}

/// Abstract vector index over chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](EmbeddingStore::add) | Embed and insert chunks (replacing equal ids) |
/// | [`delete`](EmbeddingStore::delete) | Remove chunks by id or filter |
/// | [`get`](EmbeddingStore::get) | Filtered bulk fetch, no ranking |
/// | [`query`](EmbeddingStore::query) | Nearest chunks to a query text |
/// | [`count`](EmbeddingStore::count) | Number of stored chunks |
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Embeds and stores `records`. An existing chunk with the same id is
    /// replaced.
    async fn add(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Removes matching chunks and returns how many were deleted. Deleting
    /// nothing is not an error.
    async fn delete(&self, selector: &DeleteSelector) -> Result<usize>;

    /// Returns chunks matching `filter`, ordered by file path then chunk
    /// index, truncated to `limit` when given.
    async fn get(&self, filter: &WhereFilter, limit: Option<usize>) -> Result<Vec<ChunkRecord>>;

    /// Returns up to `n_results` chunks matching `filter`, ordered by
    /// ascending distance to `text` (ties by id).
    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: &WhereFilter,
    ) -> Result<Vec<QueryMatch>>;

    async fn count(&self) -> Result<usize>;
}

/// Orders query matches by ascending distance, then id, and keeps `n`.
pub(crate) fn rank_matches(mut matches: Vec<QueryMatch>, n: usize) -> Vec<QueryMatch> {
    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    matches.truncate(n);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str, area: &str, date: &str) -> ChunkMetadata {
        ChunkMetadata {
            file_path: path.to_string(),
            area: area.to_string(),
            date: date.to_string(),
            ..ChunkMetadata::default()
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(WhereFilter::all().is_empty());
        assert!(WhereFilter::all().matches(&meta("a.md", "a", "")));
    }

    #[test]
    fn test_equality_filters() {
        let m = meta("areas/finance/x.md", "areas", "2025-01-01");
        assert!(WhereFilter::area("areas").matches(&m));
        assert!(!WhereFilter::area("projects").matches(&m));
        assert!(WhereFilter::file_path("areas/finance/x.md").matches(&m));
        assert!(!WhereFilter::file_path("areas/finance").matches(&m));
    }

    #[test]
    fn test_date_range_is_inclusive_and_skips_empty_dates() {
        let f = WhereFilter::date_range("2025-01-01", "2025-01-31");
        assert!(f.matches(&meta("a", "a", "2025-01-01")));
        assert!(f.matches(&meta("a", "a", "2025-01-31")));
        assert!(!f.matches(&meta("a", "a", "2025-02-01")));
        assert!(!f.matches(&meta("a", "a", "2024-12-31")));
        assert!(!f.matches(&meta("a", "a", "")));
    }
}
