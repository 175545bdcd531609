//! Fitted BM25 corpus.
//!
//! Holds the scorer statistics next to parallel `ids` / `documents` /
//! `metadatas` arrays so keyword hits can be returned without a round trip
//! to the embedding store.

use std::collections::HashMap;

use bincode::{Decode, Encode};

use super::scorer::{idf_table, term_score, Bm25Params};
use super::tokenizer::tokenize;
use crate::models::{ChunkMetadata, ChunkRecord, SearchHit};
use crate::store::WhereFilter;

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Bm25Corpus {
    params: Bm25Params,
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
    /// Per-document term frequencies, parallel to `ids`.
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Corpus {
    /// Fits the scorer over `records`, keeping their order.
    pub fn build(records: &[ChunkRecord]) -> Self {
        Self::build_with(records, Bm25Params::default())
    }

    pub fn build_with(records: &[ChunkRecord], params: Bm25Params) -> Self {
        let mut term_freqs = Vec::with_capacity(records.len());
        let mut doc_lens = Vec::with_capacity(records.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_tokens = 0usize;

        for record in records {
            let tokens = tokenize(&record.text);
            total_tokens += tokens.len();
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let avg_doc_len = if records.is_empty() {
            0.0
        } else {
            total_tokens as f64 / records.len() as f64
        };
        let idf = idf_table(&doc_freqs, records.len(), &params);

        Self {
            params,
            ids: records.iter().map(|r| r.id.clone()).collect(),
            documents: records.iter().map(|r| r.text.clone()).collect(),
            metadatas: records.iter().map(|r| r.metadata.clone()).collect(),
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    /// BM25 score of every document for `query`, parallel to the corpus.
    /// Repeated query terms contribute once per occurrence.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let terms = tokenize(query);
        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(freqs, &doc_len)| {
                terms
                    .iter()
                    .map(|term| {
                        let tf = freqs.get(term).copied().unwrap_or(0);
                        if tf == 0 {
                            return 0.0;
                        }
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        term_score(tf, doc_len, self.avg_doc_len, idf, &self.params)
                    })
                    .sum()
            })
            .collect()
    }

    /// Top `top_k` documents matching `filter` by descending score.
    /// Documents scoring zero or less are excluded; ties keep corpus order.
    pub fn search(&self, query: &str, top_k: usize, filter: &WhereFilter) -> Vec<SearchHit> {
        let scores = self.scores(query);
        let mut ranked: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(i, score)| *score > 0.0 && filter.matches(&self.metadatas[*i]))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(i, score)| SearchHit {
                id: self.ids[i].clone(),
                text: self.documents[i].clone(),
                metadata: self.metadatas[i].clone(),
                score,
                distance: None,
            })
            .collect()
    }
}
