//! Recursive character chunker with markdown heading context.
//!
//! Text is split on the coarsest separator present (headings, fences and
//! rules for markdown; paragraphs, lines, sentences for other formats),
//! pieces below `chunk_size` are merged greedily, and oversized pieces are
//! split again with the remaining, finer separators. Consecutive chunks share
//! up to `chunk_overlap` characters of trailing context.
//!
//! Lengths are measured in characters, not bytes.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

pub use crate::error::ChunkError;
use crate::models::FileFormat;

/// Number of leading characters used to locate a chunk in its source text.
const LOCATE_PREFIX_CHARS: usize = 80;

/// Effective chunking parameters for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks whose trimmed length is below this are dropped.
    pub min_chunk_chars: usize,
}

impl ChunkParams {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkError::InvalidOverlap {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Attach {
    /// Separator starts the following piece.
    Start,
    /// Separator ends the preceding piece.
    End,
}

struct Separator {
    /// `None` splits into single characters.
    regex: Option<Regex>,
    attach: Attach,
}

impl Separator {
    fn pattern(pattern: &str, attach: Attach) -> Self {
        Self {
            regex: Some(Regex::new(pattern).expect("valid separator pattern")),
            attach,
        }
    }

    fn chars() -> Self {
        Self {
            regex: None,
            attach: Attach::Start,
        }
    }

    fn occurs_in(&self, text: &str) -> bool {
        self.regex.as_ref().map_or(true, |re| re.is_match(text))
    }
}

static MARKDOWN_SEPARATORS: LazyLock<Vec<Separator>> = LazyLock::new(|| {
    vec![
        Separator::pattern(r"\n#{1,6} ", Attach::Start),
        Separator::pattern(r"```\n", Attach::Start),
        Separator::pattern(r"\n\*\*\*+\n", Attach::Start),
        Separator::pattern(r"\n---+\n", Attach::Start),
        Separator::pattern(r"\n___+\n", Attach::Start),
        Separator::pattern(r"\n\n", Attach::Start),
        Separator::pattern(r"\n", Attach::Start),
        Separator::pattern(r" ", Attach::Start),
        Separator::chars(),
    ]
});

static TEXT_SEPARATORS: LazyLock<Vec<Separator>> = LazyLock::new(|| {
    vec![
        Separator::pattern(r"\n\n", Attach::Start),
        Separator::pattern(r"\n", Attach::Start),
        Separator::pattern(r"\. ", Attach::End),
        Separator::pattern(r" ", Attach::Start),
        Separator::chars(),
    ]
});

/// Splits extracted `content` into chunk texts for a document of `format`.
///
/// Markdown chunks are prefixed with their heading chain (`[H1 > H2 > H3]`)
/// unless they begin with a top-level heading themselves. Chunks shorter than
/// `min_chunk_chars` after trimming are discarded.
pub fn chunk_text(
    content: &str,
    format: FileFormat,
    params: &ChunkParams,
) -> Result<Vec<String>, ChunkError> {
    params.validate()?;

    let chunks = match format {
        FileFormat::Markdown => {
            let raw = split_text(content, &MARKDOWN_SEPARATORS, params);
            with_heading_context(content, raw)
        }
        _ => split_text(content, &TEXT_SEPARATORS, params),
    };

    Ok(chunks
        .into_iter()
        .filter(|c| char_len(c.trim()) >= params.min_chunk_chars)
        .collect())
}

/// Prepends `[title]\n\n` to every chunk that does not already mention the
/// title near its start.
pub fn enrich_with_title(chunks: Vec<String>, title: &str) -> Vec<String> {
    if title.is_empty() {
        return chunks;
    }
    let window = char_len(title) + 50;
    chunks
        .into_iter()
        .map(|chunk| {
            let head: String = chunk.chars().take(window).collect();
            if head.contains(title) {
                chunk
            } else {
                format!("[{}]\n\n{}", title, chunk)
            }
        })
        .collect()
}

/// Heading chain (`H1 > H2 > H3`) in effect at byte offset `position`.
pub fn heading_chain(content: &str, position: usize) -> String {
    let mut levels: [Option<&str>; 3] = [None, None, None];
    for line in content[..position].split('\n') {
        let stripped = line.trim();
        if let Some(h) = stripped.strip_prefix("### ") {
            levels[2] = Some(h.trim());
        } else if let Some(h) = stripped.strip_prefix("## ") {
            levels[1] = Some(h.trim());
            levels[2] = None;
        } else if let Some(h) = stripped.strip_prefix("# ") {
            levels[0] = Some(h.trim());
            levels[1] = None;
            levels[2] = None;
        }
    }
    levels.iter().flatten().copied().collect::<Vec<_>>().join(" > ")
}

fn with_heading_context(content: &str, chunks: Vec<String>) -> Vec<String> {
    let mut cursor = 0usize;
    chunks
        .into_iter()
        .map(|chunk| {
            let key: String = chunk.chars().take(LOCATE_PREFIX_CHARS).collect();
            let key = key.trim();
            // Chunks come out in document order, so search forward first.
            let found = content[cursor..]
                .find(key)
                .map(|p| p + cursor)
                .or_else(|| content.find(key));
            match found {
                Some(pos) if pos > 0 => {
                    cursor = pos;
                    let chain = heading_chain(content, pos);
                    if !chain.is_empty() && !chunk.trim_start().starts_with("# ") {
                        format!("[{}]\n\n{}", chain, chunk)
                    } else {
                        chunk
                    }
                }
                _ => chunk,
            }
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_text(text: &str, separators: &[Separator], params: &ChunkParams) -> Vec<String> {
    let mut out = Vec::new();
    split_recursive(text, separators, params, &mut out);
    out
}

fn split_recursive(text: &str, separators: &[Separator], params: &ChunkParams, out: &mut Vec<String>) {
    let Some(position) = separators.iter().position(|s| s.occurs_in(text)) else {
        out.push(text.to_string());
        return;
    };
    let separator = &separators[position];
    let finer: &[Separator] = if separator.regex.is_some() {
        &separators[position + 1..]
    } else {
        &[]
    };

    let mut good: Vec<&str> = Vec::new();
    for piece in split_keeping(text, separator) {
        if char_len(piece) < params.chunk_size {
            good.push(piece);
            continue;
        }
        if !good.is_empty() {
            out.extend(merge_splits(&good, params));
            good.clear();
        }
        if finer.is_empty() {
            out.push(piece.to_string());
        } else {
            split_recursive(piece, finer, params, out);
        }
    }
    if !good.is_empty() {
        out.extend(merge_splits(&good, params));
    }
}

/// Splits on every match of the separator, keeping the separator text
/// attached to one side. Empty pieces are dropped.
fn split_keeping<'a>(text: &'a str, separator: &Separator) -> Vec<&'a str> {
    let Some(re) = &separator.regex else {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    };
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for m in re.find_iter(text) {
        let cut = match separator.attach {
            Attach::Start => m.start(),
            Attach::End => m.end(),
        };
        if cut > start {
            pieces.push(&text[start..cut]);
            start = cut;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Greedily packs pieces into chunks of at most `chunk_size` characters,
/// keeping up to `chunk_overlap` characters of tail as the head of the next.
fn merge_splits(splits: &[&str], params: &ChunkParams) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for &piece in splits {
        let len = char_len(piece);
        if total + len > params.chunk_size && !current.is_empty() {
            if let Some(doc) = join_docs(&current) {
                docs.push(doc);
            }
            while total > params.chunk_overlap
                || (total + len > params.chunk_size && total > 0)
            {
                match current.pop_front() {
                    Some((_, l)) => total -= l,
                    None => break,
                }
            }
        }
        current.push_back((piece, len));
        total += len;
    }
    if let Some(doc) = join_docs(&current) {
        docs.push(doc);
    }
    docs
}

fn join_docs(pieces: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
