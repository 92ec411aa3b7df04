//! Boundary-aware text chunker.
//!
//! Splits document text into bounded slices that can be embedded and
//! retrieved independently. Sizes are measured in characters: the default
//! of 1000 characters approximates 250 tokens.
//!
//! # Algorithm
//!
//! 1. If the text fits in one chunk it is returned unchanged.
//! 2. Otherwise the text is cut into atomic pieces: paragraphs (`\n\n`),
//!    then sentences for paragraphs that are too long, then hard character
//!    splits for sentences that are still too long. Separators stay
//!    attached to the piece they end, so no character is dropped.
//! 3. Pieces are packed greedily into chunks that never exceed the budget.
//! 4. With a non-zero overlap, every chunk after the first is prefixed with
//!    the tail of the previous chunk's own text, and the packing budget
//!    shrinks by the overlap so prefixed chunks still fit.
//!
//! Concatenating the chunks (minus any overlap prefix) reproduces the input.
//!
//! # Example
//!
//! ```rust
//! use context_recall_core::chunk::{chunk_document, ChunkOptions};
//! use context_recall_core::models::Metadata;
//!
//! let chunks = chunk_document("post-1", "Short post.", &Metadata::new(), &ChunkOptions::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "post-1");
//! ```

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{keys, ContentChunk, Metadata};

/// Default chunk size in characters (~250 tokens).
pub const DEFAULT_CHUNK_CHARS: usize = 1000;

/// Largest overlap the chunker accepts.
pub const MAX_OVERLAP_CHARS: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_CHARS,
            overlap_chars: 0,
        }
    }
}

impl ChunkOptions {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            overlap_chars: overlap_chars.min(MAX_OVERLAP_CHARS),
        }
    }

    /// Budget for a chunk's own text, leaving room for the overlap prefix.
    fn packing_budget(&self) -> usize {
        let max = self.max_chars.max(1);
        if self.overlap_chars >= max {
            1
        } else {
            max - self.overlap_chars
        }
    }
}

/// Split `text` into ordered slices of at most `opts.max_chars` characters.
///
/// Text that already fits is returned as a single, byte-identical slice.
pub fn split_text(text: &str, opts: &ChunkOptions) -> Vec<String> {
    let max_chars = opts.max_chars.max(1);
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let budget = opts.packing_budget();
    let cores = pack(atomize(text, budget), budget);

    if opts.overlap_chars == 0 {
        return cores;
    }

    let mut out = Vec::with_capacity(cores.len());
    for (i, core) in cores.iter().enumerate() {
        if i == 0 {
            out.push(core.clone());
            continue;
        }
        let prefix = tail_chars(&cores[i - 1], opts.overlap_chars);
        out.push(format!("{}{}", prefix, core));
    }
    out
}

/// Chunk a document into [`ContentChunk`]s with deterministic ids.
///
/// Every chunk inherits `base_metadata` and gains `parent_id`,
/// `chunk_index`, `total_chunks`, and a SHA-256 `content_hash`.
pub fn chunk_document(
    parent_id: &str,
    text: &str,
    base_metadata: &Metadata,
    opts: &ChunkOptions,
) -> Vec<ContentChunk> {
    let pieces = split_text(text, opts);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            let mut metadata = base_metadata.clone();
            metadata.insert(keys::PARENT_ID.into(), Value::from(parent_id));
            metadata.insert(keys::CHUNK_INDEX.into(), Value::from(index as u64));
            metadata.insert(keys::TOTAL_CHUNKS.into(), Value::from(total as u64));
            metadata.insert(keys::CONTENT_HASH.into(), Value::from(content_hash(&piece)));

            ContentChunk {
                id: chunk_id(parent_id, index, total),
                text: piece,
                chunk_index: index,
                total_chunks: total,
                metadata,
                embedding: None,
            }
        })
        .collect()
}

/// Stable chunk id. Single-chunk documents keep the parent id.
pub fn chunk_id(parent_id: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        parent_id.to_string()
    } else {
        format!("{}_chunk_{}", parent_id, index)
    }
}

/// SHA-256 of the chunk text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut text into pieces no longer than `budget`, preferring paragraph,
/// then sentence, then character boundaries.
fn atomize(text: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    for para in text.split_inclusive("\n\n") {
        if char_len(para) <= budget {
            pieces.push(para);
            continue;
        }
        for sentence in split_sentences(para) {
            if char_len(sentence) <= budget {
                pieces.push(sentence);
            } else {
                pieces.extend(hard_split(sentence, budget));
            }
        }
    }
    pieces
}

/// Split after `.`, `!`, `?` followed by whitespace, and after newlines.
/// Trailing whitespace stays with the sentence it follows.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '\n') {
            continue;
        }
        let mut end = i + c.len_utf8();
        let mut absorbed = false;
        while let Some(&(j, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            end = j + next.len_utf8();
            absorbed = true;
            chars.next();
        }
        if c == '\n' || absorbed || end == text.len() {
            pieces.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Split at character boundaries into slices of at most `budget` chars.
fn hard_split(text: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == budget {
            pieces.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn pack(pieces: Vec<&str>, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let len = char_len(piece);
        if current_len + len > budget && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(piece);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn tail_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if len <= n {
        return s;
    }
    let skip = len - n;
    match s.char_indices().nth(skip) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(max: usize) -> ChunkOptions {
        ChunkOptions::new(max, 0)
    }

    #[test]
    fn test_short_text_returned_unchanged() {
        let text = "  Hello, world!\n\n  trailing space ";
        let chunks = split_text(text, &ChunkOptions::default());
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_single_chunk_keeps_parent_id() {
        let chunks = chunk_document("doc-1", "tiny", &Metadata::new(), &opts(100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "doc-1");
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn test_concatenation_reconstructs_text() {
        let text = (0..40)
            .map(|i| format!("Paragraph {} has a sentence. And another one! Right?", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, &opts(120));
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
        for c in &chunks {
            assert!(c.chars().count() <= 120, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_text(&text, &opts(100));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n\n", "a".repeat(60)));
        assert_eq!(chunks[1], "b".repeat(60));
    }

    #[test]
    fn test_falls_back_to_sentences() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = split_text(text, &opts(25));
        assert_eq!(chunks[0], "First sentence here. ");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_decimal_point_is_not_a_sentence_boundary() {
        let pieces = split_sentences("Pi is 3.14 roughly. Yes.");
        assert_eq!(pieces, vec!["Pi is 3.14 roughly. ", "Yes."]);
    }

    #[test]
    fn test_hard_split_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, &opts(100));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_multibyte_chars_counted_as_chars() {
        let text = "┌".repeat(30);
        let chunks = split_text(&text, &opts(10));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn test_overlap_prefix_and_reconstruction() {
        let text = (0..20)
            .map(|i| format!("Sentence number {:02} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let o = ChunkOptions::new(100, 20);
        let chunks = split_text(&text, &o);
        assert!(chunks.len() > 1);

        let mut rebuilt = chunks[0].clone();
        for pair in chunks.windows(2) {
            let prev_core_tail: String = {
                let prev = &pair[0];
                let n = prev.chars().count();
                prev.chars().skip(n.saturating_sub(20)).collect()
            };
            assert!(pair[1].starts_with(&prev_core_tail));
            rebuilt.push_str(&pair[1].chars().skip(20).collect::<String>());
        }
        assert_eq!(rebuilt, text);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let text = "Alpha paragraph.\n\n".repeat(30);
        let a = chunk_document("doc", &text, &Metadata::new(), &opts(50));
        let b = chunk_document("doc", &text, &Metadata::new(), &opts(50));
        let ids_a: Vec<_> = a.iter().map(|c| c.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a[0], "doc_chunk_0");
        assert!(a.iter().all(|c| c.total_chunks == a.len()));
    }

    #[test]
    fn test_metadata_stamped() {
        let mut base = Metadata::new();
        base.insert("app_id".into(), Value::from("app"));
        let text = "word ".repeat(100);
        let chunks = chunk_document("p", &text, &base, &opts(100));
        let c = &chunks[1];
        assert_eq!(c.metadata["app_id"], "app");
        assert_eq!(c.metadata[keys::PARENT_ID], "p");
        assert_eq!(c.metadata[keys::CHUNK_INDEX], 1);
        assert_eq!(c.metadata[keys::CONTENT_HASH], content_hash(&c.text));
    }
}
