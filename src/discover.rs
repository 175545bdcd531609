//! Source file discovery.
//!
//! Walks the ingestion root, pruning configured directory names, skipping
//! configured file names and exclude globs, and keeping only supported
//! document formats. Results are sorted by path for deterministic runs.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::DiscoveryConfig;
use crate::metadata::relative_path;
use crate::models::FileFormat;

/// A document found under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Root-relative, `/`-separated.
    pub rel_path: String,
    pub format: FileFormat,
}

/// Lists supported documents under `root`. `index_dir` is never descended
/// into, even when its name is not in `skip_dirs`.
pub fn discover_files(
    root: &Path,
    config: &DiscoveryConfig,
    index_dir: Option<&Path>,
) -> Result<Vec<DiscoveredFile>> {
    if !root.is_dir() {
        bail!("Root directory does not exist: {}", root.display());
    }

    let exclude_set = build_globset(&config.exclude_globs)?;
    let index_dir = index_dir.and_then(|p| p.canonicalize().ok());

    let keep_entry = |entry: &DirEntry| -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if config.skip_dirs.iter().any(|d| d == name.as_ref()) {
            return false;
        }
        match (&index_dir, entry.path().canonicalize()) {
            (Some(index_dir), Ok(path)) => path != *index_dir,
            _ => true,
        }
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .into_iter()
        .filter_entry(keep_entry);

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(format) = FileFormat::from_path(path) else {
            continue;
        };
        let name = entry.file_name().to_string_lossy();
        if config.skip_files.iter().any(|f| f == name.as_ref()) {
            continue;
        }

        let rel_path = relative_path(path, root);
        if exclude_set.is_match(&rel_path) {
            continue;
        }

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            rel_path,
            format,
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    fn rel_paths(files: &[DiscoveredFile]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[test]
    fn test_supported_formats_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b/report.PDF");
        touch(tmp.path(), "a/notes.md");
        touch(tmp.path(), "a/data.xlsx");
        touch(tmp.path(), "a/script.py");
        touch(tmp.path(), "c/letter.docx");

        let files = discover_files(tmp.path(), &DiscoveryConfig::default(), None).unwrap();
        assert_eq!(
            rel_paths(&files),
            vec!["a/data.xlsx", "a/notes.md", "b/report.PDF", "c/letter.docx"]
        );
        assert_eq!(files[2].format, FileFormat::Pdf);
    }

    #[test]
    fn test_skip_dirs_and_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "keep/plan.md");
        touch(tmp.path(), "keep/README.md");
        touch(tmp.path(), "node_modules/pkg/doc.md");
        touch(tmp.path(), ".vectordb/stray.md");
        touch(tmp.path(), "deep/.git/objects/x.md");

        let files = discover_files(tmp.path(), &DiscoveryConfig::default(), None).unwrap();
        assert_eq!(rel_paths(&files), vec!["keep/plan.md"]);
    }

    #[test]
    fn test_exclude_globs_and_custom_index_dir() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "archive/old.md");
        touch(tmp.path(), "current/new.md");
        touch(tmp.path(), "my-index/leftover.md");

        let config = DiscoveryConfig {
            exclude_globs: vec!["archive/**".to_string()],
            ..DiscoveryConfig::default()
        };
        let index_dir = tmp.path().join("my-index");
        let files = discover_files(tmp.path(), &config, Some(&index_dir)).unwrap();
        assert_eq!(rel_paths(&files), vec!["current/new.md"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(discover_files(&tmp.path().join("nope"), &DiscoveryConfig::default(), None).is_err());
    }
}
