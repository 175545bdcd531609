//! Path- and content-derived document metadata.
//!
//! `area` and `sub_area` come from the location of the file under the
//! ingestion root; `title`, `date` and `status` come from markdown
//! conventions (`# Title`, `**Date:** 2025-01-31`, `**Status:** active`)
//! with file-name fallbacks.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ChunkMetadata, FileFormat};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid title regex"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(?:Added|Date|Started):\*\*\s*([0-9]{4}-[0-9]{2}-[0-9]{2})")
        .expect("valid date regex")
});
static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Status:\*\*\s*(\w+)").expect("valid status regex"));
static FILENAME_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2})").expect("valid filename regex"));

/// Per-document metadata, shared by every chunk of the document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentMetadata {
    pub file_path: String,
    pub file_type: String,
    pub area: String,
    pub sub_area: String,
    pub title: String,
    pub date: String,
    pub status: String,
    pub file_size: u64,
}

impl DocumentMetadata {
    /// Expands into the metadata stored for one chunk.
    pub fn for_chunk(
        &self,
        chunk_index: usize,
        chunk_count: usize,
        chunk_length: usize,
        ingested_at: &str,
    ) -> ChunkMetadata {
        ChunkMetadata {
            file_path: self.file_path.clone(),
            file_type: self.file_type.clone(),
            area: self.area.clone(),
            sub_area: self.sub_area.clone(),
            title: self.title.clone(),
            date: self.date.clone(),
            status: self.status.clone(),
            file_size: self.file_size,
            chunk_index,
            chunk_count,
            chunk_length,
            ingested_at: ingested_at.to_string(),
        }
    }
}

/// Root-relative path with `/` separators regardless of platform.
pub fn relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derives metadata for `path` (under `root`) from its extracted `content`.
pub fn extract_metadata(
    path: &Path,
    root: &Path,
    content: &str,
    file_size: u64,
) -> DocumentMetadata {
    let file_path = relative_path(path, root);
    let format = FileFormat::from_path(path);

    let parts: Vec<&str> = file_path.split('/').collect();
    let area = parts.first().copied().unwrap_or("unknown").to_string();
    let sub_area = if parts.len() > 2 {
        parts[1].to_string()
    } else {
        String::new()
    };

    let mut title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut date = String::new();
    let mut status = String::new();

    if format == Some(FileFormat::Markdown) {
        if let Some(caps) = TITLE_RE.captures(content) {
            title = caps[1].trim().to_string();
        }
        if let Some(caps) = DATE_RE.captures(content) {
            date = caps[1].to_string();
        }
        if let Some(caps) = STATUS_RE.captures(content) {
            status = caps[1].to_string();
        }
    }

    if date.is_empty() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(caps) = FILENAME_DATE_RE.captures(&file_name) {
            date = caps[1].to_string();
        }
    }

    DocumentMetadata {
        file_path,
        file_type: format
            .map(|f| f.extension().to_string())
            .unwrap_or_default(),
        area,
        sub_area,
        title,
        date,
        status,
        file_size,
    }
}
