//! Per-file content hashes used to skip unchanged files between runs.
//!
//! Persisted as a pretty-printed JSON object (`relative path -> hex digest`)
//! next to the index, one file per collection. A missing or unreadable cache
//! is treated as empty.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Location of a collection's cache: `<index_dir>/file_hashes.<collection>.json`.
pub fn hash_cache_path(index_dir: &Path, collection: &str) -> PathBuf {
    index_dir.join(format!("file_hashes.{}.json", collection))
}

/// How a discovered file relates to the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    New,
    Changed,
    Unchanged,
}

impl std::fmt::Display for FileChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileChange::New => f.write_str("NEW"),
            FileChange::Changed => f.write_str("CHANGED"),
            FileChange::Unchanged => f.write_str("UNCHANGED"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashCache {
    entries: BTreeMap<String, String>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache, recovering from a missing or corrupt file with an
    /// empty cache.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                tracing::warn!("Failed to read hash cache {}: {}", path.display(), e);
                return Self::new();
            }
        };
        match serde_json::from_str::<BTreeMap<String, String>>(&content) {
            Ok(entries) => Self { entries },
            Err(e) => {
                tracing::warn!(
                    "Hash cache {} is corrupt ({}); treating every file as new",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Writes the cache, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write hash cache: {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, rel_path: &str) -> Option<&str> {
        self.entries.get(rel_path).map(String::as_str)
    }

    pub fn set(&mut self, rel_path: &str, hash: &str) {
        self.entries.insert(rel_path.to_string(), hash.to_string());
    }

    pub fn remove(&mut self, rel_path: &str) -> Option<String> {
        self.entries.remove(rel_path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classifies a file against the cache. With `force`, every file is
    /// reported as new or changed regardless of its hash.
    pub fn classify(&self, rel_path: &str, hash: &str, force: bool) -> FileChange {
        match self.entries.get(rel_path) {
            None => FileChange::New,
            Some(_) if force => FileChange::Changed,
            Some(cached) if cached == hash => FileChange::Unchanged,
            Some(_) => FileChange::Changed,
        }
    }
}

/// SHA-256 hex digest of the full file content.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_cache_is_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = HashCache::load(&hash_cache_path(tmp.path(), "brain"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_cache_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = hash_cache_path(tmp.path(), "brain");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(HashCache::load(&path).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = hash_cache_path(&tmp.path().join("nested"), "brain");
        let mut cache = HashCache::new();
        cache.set("areas/finance/index.md", "abc123");
        cache.save(&path).unwrap();

        let loaded = HashCache::load(&path);
        assert_eq!(loaded, cache);
        assert_eq!(loaded.get("areas/finance/index.md"), Some("abc123"));
    }

    #[test]
    fn test_classify() {
        let mut cache = HashCache::new();
        cache.set("a.md", "h1");
        assert_eq!(cache.classify("a.md", "h1", false), FileChange::Unchanged);
        assert_eq!(cache.classify("a.md", "h2", false), FileChange::Changed);
        assert_eq!(cache.classify("b.md", "h1", false), FileChange::New);
        assert_eq!(cache.classify("a.md", "h1", true), FileChange::Changed);
    }

    #[test]
    fn test_hash_tracks_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.md");
        std::fs::write(&path, "first").unwrap();
        let h1 = compute_file_hash(&path).unwrap();
        assert_eq!(h1, compute_file_hash(&path).unwrap());
        assert_eq!(h1.len(), 64);
        std::fs::write(&path, "second").unwrap();
        assert_ne!(h1, compute_file_hash(&path).unwrap());
    }
}
