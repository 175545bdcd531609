//! Semantic, keyword and hybrid search.
//!
//! - **Semantic** ranks chunks by cosine similarity between the query
//!   embedding and the stored vectors.
//! - **Keyword** ranks chunks by BM25 over the persisted corpus.
//! - **Hybrid** fuses both lists with Reciprocal Rank Fusion:
//!
//! ```text
//! rrf(d) = Σ 1 / (k + rank_i(d))      k = 60, ranks 1-based
//! ```
//!
//! Fused ties are broken by best vector rank, then best keyword rank, then
//! chunk id, so identical inputs always produce identical output.
//!
//! Reranking with small title/area boosts, and deduplication to one chunk
//! per file, are opt-in. Both leave the store's cosine distance untouched.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::bm25::Bm25Corpus;
use crate::config::{Config, RetrievalConfig};
use crate::get::validate_date;
use crate::index::Index;
use crate::models::{ChunkMetadata, OutputFormat, SearchHit};
use crate::store::{EmbeddingStore, WhereFilter};

/// Boost per query term found among the title's words.
const TITLE_TERM_BOOST: f64 = 0.05;
/// Boost when the chunk's area is itself a query term.
const AREA_BOOST: f64 = 0.02;
/// Characters of chunk text shown per result in text output.
const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SearchMode {
    #[default]
    Semantic,
    Keyword,
    Hybrid,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Semantic => f.write_str("semantic"),
            SearchMode::Keyword => f.write_str("keyword"),
            SearchMode::Hybrid => f.write_str("hybrid"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub area: Option<String>,
    pub sub_area: Option<String>,
    /// Inclusive lower bound on the document date (YYYY-MM-DD).
    pub date_from: Option<String>,
    /// Inclusive upper bound on the document date (YYYY-MM-DD).
    pub date_to: Option<String>,
    pub mode: SearchMode,
    pub rerank: bool,
}

impl SearchRequest {
    pub fn filter(&self) -> WhereFilter {
        WhereFilter {
            area: self.area.clone(),
            sub_area: self.sub_area.clone(),
            date_gte: self.date_from.clone(),
            date_lte: self.date_to.clone(),
            ..WhereFilter::default()
        }
    }

    /// Rejects a zero `top_k` and malformed or inverted date bounds.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("--top-k must be >= 1");
        }
        for date in [&self.date_from, &self.date_to].into_iter().flatten() {
            validate_date(date)?;
        }
        if let (Some(from), Some(to)) = (&self.date_from, &self.date_to) {
            if from > to {
                bail!("--since {} is after --until {}", from, to);
            }
        }
        Ok(())
    }
}

/// Nearest chunks by embedding; `score` is `1 - cosine distance` and
/// `distance` carries the store's value.
pub async fn semantic_search(
    store: &dyn EmbeddingStore,
    query: &str,
    top_k: usize,
    filter: &WhereFilter,
) -> Result<Vec<SearchHit>> {
    let matches = store.query(query, top_k, filter).await?;
    Ok(matches
        .into_iter()
        .map(|m| {
            let distance = m.distance as f64;
            SearchHit {
                distance: Some(distance),
                ..SearchHit::from_record(m.record, 1.0 - distance)
            }
        })
        .collect())
}

/// BM25 hits with positive scores. Without a corpus there are no hits.
pub fn keyword_search(
    corpus: Option<&Bm25Corpus>,
    query: &str,
    top_k: usize,
    filter: &WhereFilter,
) -> Vec<SearchHit> {
    match corpus {
        Some(corpus) => corpus.search(query, top_k, filter),
        None => Vec::new(),
    }
}

/// Semantic and keyword candidates (`2 * top_k` each) fused with RRF.
pub async fn hybrid_search(
    store: &dyn EmbeddingStore,
    corpus: Option<&Bm25Corpus>,
    query: &str,
    top_k: usize,
    filter: &WhereFilter,
    rrf_k: f64,
) -> Result<Vec<SearchHit>> {
    let candidates = top_k * 2;
    let n_vector = candidates.min(store.count().await?);
    let vector_hits = if n_vector > 0 {
        semantic_search(store, query, n_vector, filter).await?
    } else {
        Vec::new()
    };
    let keyword_hits = keyword_search(corpus, query, candidates, filter);

    Ok(rrf_fuse(&vector_hits, &keyword_hits, rrf_k, top_k))
}

/// Reciprocal Rank Fusion of two ranked lists.
///
/// Each list contributes `1 / (k + rank)` (1-based) per chunk. The fused hit
/// keeps the vector list's text and metadata when present, else the keyword
/// list's. Ties: best vector rank, then best keyword rank, then id.
pub fn rrf_fuse(
    vector_hits: &[SearchHit],
    keyword_hits: &[SearchHit],
    k: f64,
    top_k: usize,
) -> Vec<SearchHit> {
    struct Fused<'a> {
        score: f64,
        vector_rank: usize,
        keyword_rank: usize,
        hit: &'a SearchHit,
    }

    let mut fused: HashMap<&str, Fused> = HashMap::new();

    for (i, hit) in vector_hits.iter().enumerate() {
        let rank = i + 1;
        let entry = fused.entry(hit.id.as_str()).or_insert(Fused {
            score: 0.0,
            vector_rank: usize::MAX,
            keyword_rank: usize::MAX,
            hit,
        });
        entry.score += 1.0 / (k + rank as f64);
        entry.vector_rank = entry.vector_rank.min(rank);
    }

    for (i, hit) in keyword_hits.iter().enumerate() {
        let rank = i + 1;
        let entry = fused.entry(hit.id.as_str()).or_insert(Fused {
            score: 0.0,
            vector_rank: usize::MAX,
            keyword_rank: usize::MAX,
            hit,
        });
        entry.score += 1.0 / (k + rank as f64);
        entry.keyword_rank = entry.keyword_rank.min(rank);
    }

    let mut ranked: Vec<Fused> = fused.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.vector_rank.cmp(&b.vector_rank))
            .then(a.keyword_rank.cmp(&b.keyword_rank))
            .then_with(|| a.hit.id.cmp(&b.hit.id))
    });
    ranked.truncate(top_k);

    ranked
        .into_iter()
        .map(|f| SearchHit {
            score: f.score,
            ..f.hit.clone()
        })
        .collect()
}

/// Boosts hits whose title words or area match query terms, re-sorts by
/// score (stable), and optionally keeps only the best hit per file.
pub fn rerank(hits: Vec<SearchHit>, query: &str, dedup_files: bool) -> Vec<SearchHit> {
    let terms: HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut boosted: Vec<SearchHit> = hits
        .into_iter()
        .map(|mut hit| {
            let title = hit.metadata.title.to_lowercase();
            let title_words: HashSet<&str> = title.split_whitespace().collect();
            let overlap = title_words
                .iter()
                .filter(|w| terms.contains(**w))
                .count();
            let mut boost = overlap as f64 * TITLE_TERM_BOOST;
            if terms.contains(&hit.metadata.area.to_lowercase()) {
                boost += AREA_BOOST;
            }
            hit.score += boost;
            hit
        })
        .collect();

    boosted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if dedup_files {
        let mut seen = HashSet::new();
        boosted.retain(|hit| seen.insert(hit.metadata.file_path.clone()));
    }
    boosted
}

/// Runs a search request against an index's store and BM25 corpus.
pub async fn search(
    store: &dyn EmbeddingStore,
    corpus: Option<&Bm25Corpus>,
    request: &SearchRequest,
    retrieval: &RetrievalConfig,
) -> Result<Vec<SearchHit>> {
    if request.query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let filter = request.filter();

    let hits = match request.mode {
        SearchMode::Semantic => semantic_search(store, &request.query, request.top_k, &filter).await?,
        SearchMode::Keyword => keyword_search(corpus, &request.query, request.top_k, &filter),
        SearchMode::Hybrid => {
            hybrid_search(
                store,
                corpus,
                &request.query,
                request.top_k,
                &filter,
                retrieval.rrf_k,
            )
            .await?
        }
    };

    if request.rerank {
        Ok(rerank(hits, &request.query, retrieval.dedup_files))
    } else {
        Ok(hits)
    }
}

/// JSON shape of one search result.
#[derive(Debug, Serialize)]
pub struct JsonHit<'a> {
    pub id: &'a str,
    /// Cosine distance as reported by the store; semantic mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// BM25 or RRF score; keyword and hybrid modes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub metadata: &'a ChunkMetadata,
    pub content: &'a str,
}

pub fn to_json_hits(hits: &[SearchHit], mode: SearchMode) -> Vec<JsonHit<'_>> {
    hits.iter()
        .map(|h| JsonHit {
            id: &h.id,
            distance: if mode == SearchMode::Semantic {
                h.distance
            } else {
                None
            },
            score: (mode != SearchMode::Semantic).then_some(h.score),
            metadata: &h.metadata,
            content: &h.text,
        })
        .collect()
}

/// Truncates to `PREVIEW_CHARS` characters, marking the cut with `...`.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// CLI entry point for `query search`.
pub async fn run_search(
    config: &Config,
    index_dir: &Path,
    request: &SearchRequest,
    format: OutputFormat,
) -> Result<()> {
    request.validate()?;

    let index = Index::open(index_dir, config).await?;
    let corpus = match request.mode {
        SearchMode::Semantic => None,
        SearchMode::Keyword | SearchMode::Hybrid => index.load_bm25()?,
    };
    let result = search(index.store(), corpus.as_ref(), request, &config.retrieval).await;
    index.close().await;
    let hits = result?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&to_json_hits(&hits, request.mode))?
            );
        }
        OutputFormat::Text => print_text(request, &hits),
    }
    Ok(())
}

fn print_text(request: &SearchRequest, hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    match request.mode {
        SearchMode::Semantic => println!("Query: {}", request.query),
        mode => println!("Query: {} ({} mode)", request.query, mode),
    }
    let filter = request.filter();
    if !filter.is_empty() {
        println!(
            "Filter: area={} sub_area={} date={}..{}",
            filter.area.as_deref().unwrap_or("*"),
            filter.sub_area.as_deref().unwrap_or("*"),
            filter.date_gte.as_deref().unwrap_or(""),
            filter.date_lte.as_deref().unwrap_or("")
        );
    }
    println!("Results: {}", hits.len());
    println!("{}", "=".repeat(60));

    for (i, hit) in hits.iter().enumerate() {
        let label = match request.mode {
            SearchMode::Semantic => format!("similarity: {:.3}", hit.score),
            SearchMode::Keyword => format!("BM25 score: {:.3}", hit.score),
            SearchMode::Hybrid => format!("RRF score: {:.4}", hit.score),
        };
        let meta = &hit.metadata;
        println!();
        println!("--- Result {} [{}] ---", i + 1, label);
        println!("File: {}", meta.file_path);
        println!("Title: {}", meta.title);
        println!("Area: {}/{}", meta.area, meta.sub_area);
        if !meta.date.is_empty() {
            println!("Date: {}", meta.date);
        }
        println!("Chunk: {}/{}", meta.chunk_index, meta.chunk_count);
        println!();
        println!("{}", preview(&hit.text));
    }

    // Best score per file, in order of first appearance.
    let mut files: Vec<(&str, f64)> = Vec::new();
    for hit in hits {
        if !files.iter().any(|(p, _)| *p == hit.metadata.file_path) {
            files.push((&hit.metadata.file_path, hit.score));
        }
    }
    println!();
    println!("{}", "=".repeat(60));
    println!();
    println!("Files referenced (by best match):");
    for (path, score) in files {
        println!("  {:.3}  {}", score, path);
    }
}
