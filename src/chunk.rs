//! Recursive sliding-window text chunker.
//!
//! Splits text into chunks of at most `chunk_chars` characters, with
//! consecutive chunks sharing up to `overlap_chars` characters so that
//! context spanning a boundary survives retrieval. Splitting prefers
//! paragraph breaks, then line breaks, then spaces, and only cuts inside
//! a word when a single word is longer than a chunk.
//!
//! Lengths are counted in `char`s, never bytes, so cuts always land on
//! UTF-8 boundaries.

use uuid::Uuid;

use crate::models::{Chunk, ChunkMetadata};

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Chunk sizing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    /// `overlap_chars` is clamped below `chunk_chars`.
    pub fn new(chunk_chars: usize, overlap_chars: usize) -> Self {
        let chunk_chars = chunk_chars.max(1);
        Self {
            chunk_chars,
            overlap_chars: overlap_chars.min(chunk_chars - 1),
        }
    }

    /// Split `text` into trimmed, non-empty pieces.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    /// Split every unit's text and wrap the pieces as [`Chunk`]s sharing
    /// the document's metadata. Indices are contiguous from 0 across all
    /// units of the document.
    pub fn chunk_units<'a, I>(&self, units: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = (&'a str, ChunkMetadata)>,
    {
        let mut chunks = Vec::new();
        for (text, metadata) in units {
            for piece in self.split(text) {
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    chunk_index: chunks.len() as i64,
                    text: piece,
                    metadata: metadata.clone(),
                });
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches
        let (pos, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(pos + 1..).unwrap_or(&[]);

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut out = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.chunk_chars {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                out.extend(self.merge(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !good.is_empty() {
            out.extend(self.merge(&good, separator));
        }
        out
    }

    /// Greedily pack `splits` into windows, carrying the tail of each
    /// window (up to the overlap) into the next.
    fn merge(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            let joined_len = |total: usize, current_empty: bool| {
                total + len + if current_empty { 0 } else { sep_len }
            };

            if joined_len(total, current.is_empty()) > self.chunk_chars {
                if !current.is_empty() {
                    push_trimmed(&mut docs, &join(&current, separator));

                    while total > self.overlap_chars
                        || (total > 0 && joined_len(total, current.is_empty()) > self.chunk_chars)
                    {
                        let Some(front) = current.pop_front() else {
                            break;
                        };
                        total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                    }
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        push_trimmed(&mut docs, &join(&current, separator));
        docs
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(parts: &std::collections::VecDeque<&str>, separator: &str) -> String {
    parts.iter().copied().collect::<Vec<_>>().join(separator)
}

fn push_trimmed(docs: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}
