//! BM25 corpus serialization.
//!
//! The blob is a bincode (v2, standard config) `u32` format version followed
//! by the encoded [`Bm25Corpus`]. A blob with another version is ignored
//! and rebuilt on the next ingestion run.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::config;

use super::index::Bm25Corpus;
use crate::error::IndexError;

/// Current blob format version.
pub const BM25_FORMAT_VERSION: u32 = 1;

/// Location of a collection's corpus: `<index_dir>/bm25_index.<collection>.bin`.
pub fn bm25_path(index_dir: &Path, collection: &str) -> PathBuf {
    index_dir.join(format!("bm25_index.{}.bin", collection))
}

/// Writes `corpus` to `path`, replacing any previous blob.
pub fn save_bm25_corpus(corpus: &Bm25Corpus, path: &Path) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| IndexError::Bm25Io {
            path: parent.to_path_buf(),
            message: format!("Failed to create index directory: {}", e),
        })?;
    }

    let path = path.to_path_buf();
    let tmp_path = path.with_extension("bin.tmp");
    let file = fs::File::create(&tmp_path).map_err(|e| IndexError::Bm25Io {
        path: tmp_path.clone(),
        message: format!("Failed to create BM25 index file: {}", e),
    })?;
    let mut writer = BufWriter::new(file);

    let encode_err = |e: bincode::error::EncodeError| IndexError::Bm25Io {
        path: tmp_path.clone(),
        message: format!("Failed to serialize BM25 index: {}", e),
    };
    bincode::encode_into_std_write(BM25_FORMAT_VERSION, &mut writer, config::standard())
        .map_err(encode_err)?;
    bincode::encode_into_std_write(corpus, &mut writer, config::standard()).map_err(encode_err)?;
    writer.flush().map_err(|e| IndexError::Bm25Io {
        path: tmp_path.clone(),
        message: format!("Failed to write BM25 index: {}", e),
    })?;
    drop(writer);

    fs::rename(&tmp_path, &path).map_err(|e| IndexError::Bm25Io {
        path: path.clone(),
        message: format!("Failed to replace BM25 index: {}", e),
    })?;

    tracing::debug!(
        "Saved BM25 index to {}: {} docs, {} terms",
        path.display(),
        corpus.len(),
        corpus.vocabulary_size()
    );
    Ok(())
}

/// Loads the corpus, or `None` when no blob exists or its version differs.
///
/// # Errors
///
/// Returns an error if the blob exists but cannot be read or decoded.
pub fn load_bm25_corpus(path: &Path) -> Result<Option<Bm25Corpus>, IndexError> {
    let path = path.to_path_buf();
    if !path.exists() {
        tracing::debug!("No BM25 index found at {}", path.display());
        return Ok(None);
    }

    let file = fs::File::open(&path).map_err(|e| IndexError::Bm25Io {
        path: path.clone(),
        message: format!("Failed to open BM25 index: {}", e),
    })?;
    let mut reader = BufReader::new(file);

    let version: u32 = bincode::decode_from_std_read(&mut reader, config::standard()).map_err(
        |e| IndexError::Bm25Parse {
            path: path.clone(),
            message: format!("Failed to read BM25 index version: {}", e),
        },
    )?;
    if version != BM25_FORMAT_VERSION {
        tracing::warn!(
            "BM25 index version mismatch: found {}, expected {}. Run ingest to rebuild it.",
            version,
            BM25_FORMAT_VERSION
        );
        return Ok(None);
    }

    let corpus: Bm25Corpus = bincode::decode_from_std_read(&mut reader, config::standard())
        .map_err(|e| IndexError::Bm25Parse {
            path: path.clone(),
            message: format!("Failed to deserialize BM25 index: {}", e),
        })?;

    tracing::debug!(
        "Loaded BM25 index from {}: {} docs, {} terms",
        path.display(),
        corpus.len(),
        corpus.vocabulary_size()
    );
    Ok(Some(corpus))
}
