//! Token-bounded text chunking with a header/body split.
//!
//! Chunks are exact, non-overlapping slices of their source region: joining
//! the content chunks of a document in index order yields its body
//! byte-for-byte, and likewise for header chunks. Separator whitespace stays
//! attached to the end of the unit it follows.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkKind, ChunkingConfig, Document};

/// Approximate bytes per token used by [`estimate_tokens`].
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the number of tokens in a text.
/// Uses a simple heuristic: ~4 bytes per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// A chunk before it is bound to a document index and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: ChunkKind,
    pub text: String,
    pub token_count: usize,
}

/// Splits documents into ordered chunks no larger than `max_tokens`.
#[derive(Debug, Clone)]
pub struct TextChunker {
    max_tokens: usize,
}

impl TextChunker {
    /// Create a new text chunker with the given configuration.
    pub fn new(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Self::with_max_tokens(config.max_tokens as usize)
    }

    pub fn with_max_tokens(max_tokens: usize) -> Result<Self, ChunkError> {
        if max_tokens == 0 {
            return Err(ChunkError::ZeroBudget);
        }
        Ok(Self { max_tokens })
    }

    /// Create a chunker with default settings.
    pub fn with_defaults() -> Self {
        Self {
            max_tokens: ChunkingConfig::default().max_tokens as usize,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Split a document into header segments followed by content segments.
    pub fn split(&self, document: &Document) -> Vec<Segment> {
        let header = document
            .header_text()
            .map(|h| self.split_text(h))
            .unwrap_or_default();
        let body = if document.body.trim().is_empty() {
            Vec::new()
        } else {
            self.split_text(&document.body)
        };

        let segments: Vec<Segment> = header
            .into_iter()
            .map(|text| (ChunkKind::Header, text))
            .chain(body.into_iter().map(|text| (ChunkKind::Content, text)))
            .map(|(kind, text)| Segment {
                kind,
                token_count: estimate_tokens(text),
                text: text.to_string(),
            })
            .collect();

        debug!(
            document_id = %document.id,
            segments = segments.len(),
            max_tokens = self.max_tokens,
            "split document"
        );

        segments
    }

    /// Chunk a document, stamping every chunk with `created_at`.
    pub fn chunk(&self, document: &Document, created_at: DateTime<Utc>) -> Vec<Chunk> {
        self.split(document)
            .into_iter()
            .enumerate()
            .map(|(idx, segment)| {
                Chunk::new(
                    &document.id,
                    segment.kind,
                    idx as u32,
                    segment.text,
                    segment.token_count as u32,
                    created_at,
                )
                .with_source(&document.title, document.url.clone())
            })
            .collect()
    }

    /// Greedily pack natural units into slices within the token budget.
    fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        let mut start = 0;
        let mut end = 0;

        for unit in self.units(text) {
            let unit_end = end + unit.len();
            if end > start && estimate_tokens(&text[start..unit_end]) > self.max_tokens {
                pieces.push(&text[start..end]);
                start = end;
            }
            end = unit_end;
        }

        if end > start {
            pieces.push(&text[start..end]);
        }

        pieces
    }

    /// Contiguous units, each within budget: paragraphs, then sentences,
    /// then word-boundary (or character) cuts.
    fn units<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut units = Vec::new();

        for paragraph in split_paragraphs(text) {
            if self.fits(paragraph) {
                units.push(paragraph);
                continue;
            }
            for sentence in split_sentences(paragraph) {
                if self.fits(sentence) {
                    units.push(sentence);
                } else {
                    units.extend(self.hard_split(sentence));
                }
            }
        }

        units
    }

    fn fits(&self, text: &str) -> bool {
        estimate_tokens(text) <= self.max_tokens
    }

    /// Cut an oversized unit, preferring the last whitespace inside the budget.
    fn hard_split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let budget = self.max_tokens * CHARS_PER_TOKEN;
        let mut pieces = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            if self.fits(rest) {
                pieces.push(rest);
                break;
            }

            let mut cut = pos + budget;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }

            let window = &text[pos..cut];
            let split_at = match window.rfind(char::is_whitespace) {
                Some(idx) if idx > 0 => {
                    let ws_len = window[idx..].chars().next().map_or(1, char::len_utf8);
                    pos + idx + ws_len
                }
                _ => cut,
            };

            pieces.push(&text[pos..split_at]);
            pos = split_at;
        }

        pieces
    }
}

/// Split after every blank-line run; the run stays with the preceding paragraph.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\n' {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        let mut newlines = 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            if bytes[j] == b'\n' {
                newlines += 1;
            }
            j += 1;
        }

        if newlines >= 2 {
            pieces.push(&text[start..j]);
            start = j;
        }
        i = j;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Split after sentence terminators that are followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        let mut end = i + c.len_utf8();
        let mut saw_space = false;
        while let Some(&(j, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            saw_space = true;
            end = j + next.len_utf8();
            chars.next();
        }

        if saw_space {
            pieces.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}
