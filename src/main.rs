//! # repo-search CLI
//!
//! ## Usage
//!
//! ```bash
//! repo-search [--config search.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-search ingest [root]` | Index new and changed files under `root` |
//! | `repo-search query search "<text>"` | Semantic, keyword or hybrid search |
//! | `repo-search query file <path>` | All chunks of one file |
//! | `repo-search query area <name>` | Chunks of one area |
//! | `repo-search query date-range <start> <end>` | Chunks dated in a range |
//! | `repo-search query list` | Indexed files |
//! | `repo-search query stats` | Index statistics |
//! | `repo-search query prune [root]` | Drop chunks of deleted files |
//!
//! ## Examples
//!
//! ```bash
//! # Index the current directory into ./.vectordb
//! repo-search ingest . --verbose
//!
//! # Hybrid search restricted to one area
//! repo-search query search "quarterly revenue" --mode hybrid --area finance
//!
//! # Semantic search over notes dated in January 2025
//! repo-search query search "standup" --since 2025-01-01 --until 2025-01-31
//!
//! # Machine-readable output
//! repo-search query --format json stats
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repo_search::config::{self, Config};
use repo_search::error::IndexError;
use repo_search::index::resolve_index_dir;
use repo_search::ingest::{self, IngestOptions};
use repo_search::models::OutputFormat;
use repo_search::search::{self, SearchMode, SearchRequest};
use repo_search::{get, prune, stats};

/// repo-search: local document ingestion and hybrid retrieval.
#[derive(Parser)]
#[command(
    name = "repo-search",
    about = "Index a directory of markdown, PDF, DOCX and XLSX files and search it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new and changed files under a root directory.
    ///
    /// Unchanged files are skipped using content hashes. The BM25 keyword
    /// index is rebuilt at the end of every run that wrote anything.
    Ingest {
        /// Directory to index.
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Index directory (default: `<root>/.vectordb`).
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Collection name inside the index.
        #[arg(long)]
        collection: Option<String>,

        /// Show what would be indexed without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Reprocess every file regardless of the hash cache.
        #[arg(long)]
        force: bool,

        /// List per-file status and chunk counts.
        #[arg(long, short)]
        verbose: bool,

        /// Chunk size in characters, for every format.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Chunk overlap in characters, for every format.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Query an existing index.
    Query {
        /// Index directory (default: `./.vectordb`).
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Collection name inside the index.
        #[arg(long)]
        collection: Option<String>,

        /// Output format.
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[command(subcommand)]
        action: QueryAction,
    },
}

#[derive(Subcommand)]
enum QueryAction {
    /// Similarity, keyword or hybrid search.
    Search {
        /// Search text.
        query: String,

        /// Number of results (default: `retrieval.search_top_k`).
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Only chunks from this area.
        #[arg(long)]
        area: Option<String>,

        /// Only chunks from this sub-area.
        #[arg(long)]
        sub_area: Option<String>,

        /// Only chunks dated on or after this day (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only chunks dated on or before this day (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Retrieval mode.
        #[arg(long, value_enum, default_value_t = SearchMode::Semantic)]
        mode: SearchMode,

        /// Boost hits whose title or area matches query terms
        /// (also `retrieval.rerank`).
        #[arg(long)]
        rerank: bool,

        /// With reranking, keep only the best chunk per file
        /// (also `retrieval.dedup_files`).
        #[arg(long)]
        dedup: bool,
    },

    /// All chunks of one file, by path relative to the indexed root.
    File {
        file_path: String,
    },

    /// Chunks of one area.
    Area {
        area_name: String,

        /// Maximum chunks (default: `retrieval.bulk_top_k`).
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// Chunks whose document date lies in `[start, end]` (YYYY-MM-DD).
    DateRange {
        start_date: String,
        end_date: String,

        /// Maximum chunks (default: `retrieval.bulk_top_k`).
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// List indexed files.
    List,

    /// Show index statistics.
    Stats,

    /// Remove chunks of files that no longer exist under the root.
    Prune {
        /// Root the index was built from.
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "repo_search=debug"
    } else {
        "repo_search=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Commands::Ingest { verbose: true, .. });
    init_tracing(verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // IndexNotFound already carries its own hint.
            if let Some(err @ IndexError::IndexNotFound { .. }) = err.downcast_ref::<IndexError>() {
                eprintln!("Error: {}", err);
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            root,
            db_path,
            collection,
            dry_run,
            force,
            verbose,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(collection) = collection {
                cfg.index.collection = collection;
            }
            if chunk_size.is_some() {
                cfg.chunking.chunk_size = chunk_size;
            }
            if chunk_overlap.is_some() {
                cfg.chunking.chunk_overlap = chunk_overlap;
            }
            config::validate(&cfg)?;

            let root = root
                .canonicalize()
                .with_context(|| format!("Root directory does not exist: {}", root.display()))?;
            let index_dir = resolve_index_dir(db_path.as_deref(), &cfg, &root);
            let opts = IngestOptions {
                root,
                index_dir,
                dry_run,
                force,
                verbose,
            };
            ingest::run_ingest(&cfg, &opts).await?;
        }
        Commands::Query {
            db_path,
            collection,
            format,
            action,
        } => {
            if let Some(collection) = collection {
                cfg.index.collection = collection;
            }
            config::validate(&cfg)?;

            let cwd = std::env::current_dir()?;
            let index_dir = resolve_index_dir(db_path.as_deref(), &cfg, &cwd);
            run_query(&cfg, &index_dir, format, action).await?;
        }
    }
    Ok(())
}

async fn run_query(
    cfg: &Config,
    index_dir: &Path,
    format: OutputFormat,
    action: QueryAction,
) -> Result<()> {
    match action {
        QueryAction::Search {
            query,
            top_k,
            area,
            sub_area,
            since,
            until,
            mode,
            rerank,
            dedup,
        } => {
            let request = SearchRequest {
                query,
                top_k: top_k.unwrap_or(cfg.retrieval.search_top_k),
                area,
                sub_area,
                date_from: since,
                date_to: until,
                mode,
                rerank: cfg.retrieval.rerank || rerank,
            };
            let mut cfg = cfg.clone();
            cfg.retrieval.dedup_files |= dedup;
            search::run_search(&cfg, index_dir, &request, format).await?;
        }
        QueryAction::File { file_path } => {
            get::run_get_file(cfg, index_dir, &file_path, format).await?;
        }
        QueryAction::Area { area_name, top_k } => {
            let limit = top_k.unwrap_or(cfg.retrieval.bulk_top_k);
            get::run_get_area(cfg, index_dir, &area_name, limit, format).await?;
        }
        QueryAction::DateRange {
            start_date,
            end_date,
            top_k,
        } => {
            let limit = top_k.unwrap_or(cfg.retrieval.bulk_top_k);
            get::run_get_date_range(cfg, index_dir, &start_date, &end_date, limit, format).await?;
        }
        QueryAction::List => {
            stats::run_list(cfg, index_dir, format).await?;
        }
        QueryAction::Stats => {
            stats::run_stats(cfg, index_dir, format).await?;
        }
        QueryAction::Prune { root } => {
            prune::run_prune(cfg, index_dir, &root).await?;
        }
    }
    Ok(())
}
