//! Deterministic chunking of source text.
//!
//! [`chunk_text`] walks a document and cuts it into contiguous spans. The
//! spans cover the input exactly, so concatenating every [`Chunk::text`]
//! gives back the original document. A saved job relies on the same input
//! always producing the same spans, which is why the function has no
//! configuration besides the size limit.
//!
//! Cuts are placed, in order of preference:
//!
//! 1. after a sentence terminator (`.`, `!` or `?`) and the whitespace that
//!    follows it, when that lies past the middle of the window;
//! 2. on the last word boundary inside the window;
//! 3. on the last grapheme boundary inside the window, for tokens longer
//!    than the whole window.
//!
//! ```
//! use lingproc::chunk_text;
//!
//! let chunks = chunk_text("One two three. Four five six seven.", 20).unwrap();
//! assert_eq!(chunks[0].text, "One two three. ");
//! assert_eq!(chunks[1].text, "Four five six seven.");
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Reasons a document cannot be chunked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("text contains nothing to speak")]
    EmptyText,
    #[error("chunk size must be at least one character")]
    InvalidSize,
}

/// A contiguous span of the source document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the chunk in the document, starting at zero.
    pub index: usize,
    /// Byte offset of the first byte of the span.
    pub start: usize,
    /// Byte offset one past the last byte of the span.
    pub end: usize,
    /// The span itself, surrounding whitespace included.
    pub text: String,
}

impl Chunk {
    /// Byte range covered by this chunk.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Text to hand to the synthesizer, without surrounding whitespace.
    pub fn speech_text(&self) -> &str {
        self.text.trim()
    }

    /// Number of characters in [`Chunk::speech_text`].
    pub fn char_len(&self) -> usize {
        self.speech_text().chars().count()
    }
}

/// Split `text` into chunks whose speech text holds at most `max_chars`
/// characters.
///
/// The only way a chunk exceeds the limit is a single grapheme cluster
/// longer than `max_chars` characters, which is never split.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<Chunk>, ChunkError> {
    if max_chars == 0 {
        return Err(ChunkError::InvalidSize);
    }
    if text.trim().is_empty() {
        return Err(ChunkError::EmptyText);
    }

    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        // text[pos..] always holds something speakable here
        let content = pos + leading_whitespace(&text[pos..]);
        let mut end = split_point(text, content, max_chars);
        if text[end..].trim().is_empty() {
            end = text.len();
        }
        chunks.push(Chunk {
            index: chunks.len(),
            start: pos,
            end,
            text: text[pos..end].to_string(),
        });
        pos = end;
    }
    debug!(chunks = chunks.len(), max_chars, "chunked text");
    Ok(chunks)
}

/// Byte spans of `chunks`, in order.
pub fn boundaries(chunks: &[Chunk]) -> Vec<(usize, usize)> {
    chunks.iter().map(|c| (c.start, c.end)).collect()
}

/// Stable hex digest of `text`, used to detect a changed source document.
pub fn fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn leading_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Absolute byte offset where the chunk starting at `content` ends.
fn split_point(text: &str, content: usize, max_chars: usize) -> usize {
    let rest = &text[content..];
    let window = window_len(rest, max_chars);
    if window == rest.len() {
        return text.len();
    }
    let slice = &rest[..window];
    if let Some(cut) = sentence_break(slice, max_chars / 2) {
        return content + cut;
    }
    if rest[window..].starts_with(char::is_whitespace) {
        return content + window;
    }
    if let Some(cut) = word_break(slice) {
        return content + cut;
    }
    content + window
}

/// Length in bytes of the longest run of whole graphemes holding at most
/// `max_chars` characters. Always covers at least one grapheme.
fn window_len(rest: &str, max_chars: usize) -> usize {
    let mut chars = 0;
    let mut len = 0;
    for g in rest.graphemes(true) {
        let n = g.chars().count();
        if len > 0 && chars + n > max_chars {
            break;
        }
        chars += n;
        len += g.len();
    }
    len
}

/// Offset just past the whitespace following the last sentence terminator
/// that sits at or beyond character `min_chars`.
fn sentence_break(slice: &str, min_chars: usize) -> Option<usize> {
    let mut cut = None;
    let mut chars = slice.char_indices().enumerate().peekable();
    while let Some((n, (_, c))) = chars.next() {
        if !matches!(c, '.' | '!' | '?') || n < min_chars {
            continue;
        }
        if let Some(&(_, (i, next))) = chars.peek() {
            if next.is_whitespace() {
                cut = Some(i + next.len_utf8());
            }
        }
    }
    cut
}

/// Offset just past the last whitespace character in `slice`.
fn word_break(slice: &str) -> Option<usize> {
    slice
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .last()
        .map(|(i, c)| i + c.len_utf8())
}
