//! BM25 keyword index for hybrid search.
//!
//! The corpus is fitted from every chunk in the embedding store at the end of
//! each ingestion run and persisted as a single blob next to the database.
//! Queries load it once and score all documents in memory.
//!
//! ## Key Components
//!
//! - [`tokenizer`]: lowercase whitespace tokenization
//! - [`scorer`]: Okapi BM25 (k1=1.5, b=0.75, epsilon=0.25)
//! - [`index`]: fitted corpus with parallel ids / documents / metadatas
//! - [`storage`]: bincode serialization

pub mod index;
pub mod scorer;
pub mod storage;
pub mod tokenizer;

pub use index::Bm25Corpus;
pub use scorer::Bm25Params;
pub use storage::{bm25_path, load_bm25_corpus, save_bm25_corpus};
pub use tokenizer::tokenize;
