//! Okapi BM25 scoring.
//!
//! ```text
//! score(D, Q) = Σ IDF(q) * f(q, D) * (k1 + 1) / (f(q, D) + k1 * (1 - b + b * |D| / avgdl))
//! IDF(q)      = ln((N - n(q) + 0.5) / (n(q) + 0.5))
//! ```
//!
//! Terms present in more than half the corpus have a negative raw IDF; those
//! are floored to `epsilon * mean(IDF)` so common words still count a little.

use std::collections::HashMap;

use bincode::{Decode, Encode};

/// BM25 scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f64,
    /// Document length normalization (0 = none, 1 = full).
    pub b: f64,
    /// Fraction of the mean IDF used as the floor for negative IDFs.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Computes the IDF of every term from its document frequency.
pub fn idf_table(
    doc_freqs: &HashMap<String, usize>,
    num_docs: usize,
    params: &Bm25Params,
) -> HashMap<String, f64> {
    let n = num_docs as f64;
    let mut idf = HashMap::with_capacity(doc_freqs.len());
    let mut idf_sum = 0.0;
    let mut negative = Vec::new();

    for (term, &df) in doc_freqs {
        let df = df as f64;
        let value = ((n - df + 0.5) / (df + 0.5)).ln();
        idf_sum += value;
        if value < 0.0 {
            negative.push(term.clone());
        }
        idf.insert(term.clone(), value);
    }

    if !idf.is_empty() {
        let floor = params.epsilon * idf_sum / idf.len() as f64;
        for term in negative {
            idf.insert(term, floor);
        }
    }
    idf
}

/// Score contribution of one query term occurring `term_freq` times in a
/// document of `doc_len` tokens.
#[inline]
pub fn term_score(
    term_freq: u32,
    doc_len: usize,
    avg_doc_len: f64,
    idf: f64,
    params: &Bm25Params,
) -> f64 {
    let tf = term_freq as f64;
    let norm = if avg_doc_len > 0.0 {
        doc_len as f64 / avg_doc_len
    } else {
        1.0
    };
    idf * (tf * (params.k1 + 1.0)) / (tf + params.k1 * (1.0 - params.b + params.b * norm))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freqs(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs.iter().map(|(t, n)| (t.to_string(), *n)).collect()
    }

    #[test]
    fn test_rare_terms_score_higher() {
        let idf = idf_table(&freqs(&[("rare", 1), ("common", 3)]), 4, &Bm25Params::default());
        assert!(idf["rare"] > idf["common"]);
    }

    #[test]
    fn test_negative_idf_is_floored() {
        let params = Bm25Params::default();
        // "everywhere" occurs in 3 of 3 documents: raw idf is ln(0.5/3.5) < 0.
        let idf = idf_table(&freqs(&[("everywhere", 3), ("once", 1)]), 3, &params);
        let raw_once = (2.5f64 / 1.5).ln();
        let raw_everywhere = (0.5f64 / 3.5).ln();
        let expected = params.epsilon * (raw_once + raw_everywhere) / 2.0;
        assert!((idf["everywhere"] - expected).abs() < 1e-12);
        assert!((idf["once"] - raw_once).abs() < 1e-12);
    }

    #[test]
    fn test_term_score_saturates() {
        let p = Bm25Params::default();
        let one = term_score(1, 10, 10.0, 1.0, &p);
        let five = term_score(5, 10, 10.0, 1.0, &p);
        let fifty = term_score(50, 10, 10.0, 1.0, &p);
        assert!(one < five && five < fifty);
        assert!(fifty < p.k1 + 1.0);
    }

    #[test]
    fn test_longer_documents_score_lower() {
        let p = Bm25Params::default();
        assert!(term_score(2, 5, 10.0, 1.0, &p) > term_score(2, 20, 10.0, 1.0, &p));
    }
}
