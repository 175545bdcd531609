//! TOML configuration.
//!
//! Every section and field has a default, so a missing config file (or an
//! empty one) yields a fully usable [`Config`]. CLI flags are applied on top
//! by the binary.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkParams;
use crate::models::FileFormat;

/// Name of the index directory created under the ingestion root.
pub const DEFAULT_DB_DIR: &str = ".vectordb";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Index directory. Relative to the ingestion root when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "brain".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Directory names pruned anywhere in the tree.
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    /// File names never ingested.
    #[serde(default = "default_skip_files")]
    pub skip_files: Vec<String>,
    /// Extra glob patterns, matched against the root-relative path.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            skip_dirs: default_skip_dirs(),
            skip_files: default_skip_files(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_skip_dirs() -> Vec<String> {
    [
        ".git",
        ".vectordb",
        "node_modules",
        ".venv",
        "__pycache__",
        "bin",
        "obj",
        ".vs",
        ".idea",
        ".claude",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_skip_files() -> Vec<String> {
    vec!["TEMPLATE.md".to_string(), "README.md".to_string()]
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct FormatChunking {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Applies to every format when set.
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Applies to every format when set.
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default = "default_markdown_chunking")]
    pub markdown: FormatChunking,
    #[serde(default = "default_pdf_chunking")]
    pub pdf: FormatChunking,
    #[serde(default = "default_docx_chunking")]
    pub docx: FormatChunking,
    #[serde(default = "default_xlsx_chunking")]
    pub xlsx: FormatChunking,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: None,
            chunk_overlap: None,
            min_chunk_chars: default_min_chunk_chars(),
            markdown: default_markdown_chunking(),
            pdf: default_pdf_chunking(),
            docx: default_docx_chunking(),
            xlsx: default_xlsx_chunking(),
        }
    }
}

fn default_min_chunk_chars() -> usize {
    50
}
fn default_markdown_chunking() -> FormatChunking {
    FormatChunking {
        chunk_size: 1500,
        chunk_overlap: 200,
    }
}
fn default_pdf_chunking() -> FormatChunking {
    FormatChunking {
        chunk_size: 1000,
        chunk_overlap: 200,
    }
}
fn default_docx_chunking() -> FormatChunking {
    FormatChunking {
        chunk_size: 1500,
        chunk_overlap: 200,
    }
}
fn default_xlsx_chunking() -> FormatChunking {
    FormatChunking {
        chunk_size: 2000,
        chunk_overlap: 200,
    }
}

impl ChunkingConfig {
    /// Effective chunking parameters for a format: explicit overrides win,
    /// each independently of the other.
    pub fn params_for(&self, format: FileFormat) -> ChunkParams {
        let defaults = match format {
            FileFormat::Markdown => self.markdown,
            FileFormat::Pdf => self.pdf,
            FileFormat::Docx => self.docx,
            FileFormat::Xlsx => self.xlsx,
        };
        ChunkParams {
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_overlap: self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            min_chunk_chars: self.min_chunk_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
    /// Limit for bulk `area` / `date-range` retrieval.
    #[serde(default = "default_bulk_top_k")]
    pub bulk_top_k: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Title/area boosting of search results. Off unless enabled here or
    /// with `--rerank`.
    #[serde(default)]
    pub rerank: bool,
    /// Keep only the best chunk per file when reranking.
    #[serde(default)]
    pub dedup_files: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_top_k: default_search_top_k(),
            bulk_top_k: default_bulk_top_k(),
            rrf_k: default_rrf_k(),
            rerank: false,
            dedup_files: false,
        }
    }
}

fn default_search_top_k() -> usize {
    10
}
fn default_bulk_top_k() -> usize {
    50
}
fn default_rrf_k() -> f64 {
    60.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Load configuration from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };
    validate(&config)?;
    Ok(config)
}

/// Checks cross-field constraints. Called again by the binary after CLI
/// overrides are applied.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    for format in FileFormat::ALL {
        let params = config.chunking.params_for(format);
        if params.chunk_size == 0 {
            anyhow::bail!("chunking: chunk_size for {} must be > 0", format);
        }
        if params.chunk_overlap >= params.chunk_size {
            anyhow::bail!(
                "chunking: chunk_overlap ({}) must be smaller than chunk_size ({}) for {}",
                params.chunk_overlap,
                params.chunk_size,
                format
            );
        }
    }

    // Validate retrieval
    if config.retrieval.search_top_k == 0 || config.retrieval.bulk_top_k == 0 {
        anyhow::bail!("retrieval top-k values must be >= 1");
    }
    if config.retrieval.rrf_k <= 0.0 {
        anyhow::bail!("retrieval.rrf_k must be > 0");
    }

    let collection = &config.index.collection;
    if collection.is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }
    // The name is embedded in the BM25 and hash cache file names.
    if !collection
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!(
            "index.collection '{}' may only contain letters, digits, '-' and '_'",
            collection
        );
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.index.collection, "brain");
        assert_eq!(config.embedding.provider, "hash");
        assert!(config.discovery.skip_dirs.contains(&".git".to_string()));
        assert!(config.discovery.skip_files.contains(&"README.md".to_string()));
        validate(&config).unwrap();
    }

    #[test]
    fn test_per_format_defaults() {
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.params_for(FileFormat::Markdown).chunk_size, 1500);
        assert_eq!(chunking.params_for(FileFormat::Pdf).chunk_size, 1000);
        assert_eq!(chunking.params_for(FileFormat::Docx).chunk_size, 1500);
        assert_eq!(chunking.params_for(FileFormat::Xlsx).chunk_size, 2000);
        assert_eq!(chunking.params_for(FileFormat::Xlsx).chunk_overlap, 200);
    }

    #[test]
    fn test_overrides_apply_independently() {
        let chunking = ChunkingConfig {
            chunk_size: Some(800),
            ..ChunkingConfig::default()
        };
        let params = chunking.params_for(FileFormat::Xlsx);
        assert_eq!(params.chunk_size, 800);
        assert_eq!(params.chunk_overlap, 200);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 100
            chunk_overlap = 100
            "#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_network_provider_requires_model_and_dims() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "openai"
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_collection_name_must_be_file_safe() {
        let mut config = Config::default();
        config.index.collection = "team-notes_2".to_string();
        validate(&config).unwrap();

        for bad in ["", "../escape", "a b", "x.y"] {
            config.index.collection = bad.to_string();
            assert!(validate(&config).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_rerank_is_opt_in() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.retrieval.rerank);
        assert!(!config.retrieval.dedup_files);

        let config: Config = toml::from_str(
            r#"
            [retrieval]
            rerank = true
            dedup_files = true
            "#,
        )
        .unwrap();
        assert!(config.retrieval.rerank);
        assert!(config.retrieval.dedup_files);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "magic"
            "#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
