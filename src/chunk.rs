//! Recursive, overlapping text splitter.
//!
//! Splits extracted document text into windows of at most `chunk_size`
//! characters, with roughly `chunk_overlap` characters shared between
//! consecutive windows. Natural boundaries are preferred: paragraphs first,
//! then lines, sentences and words, and only as a last resort a hard cut
//! between characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text (`""` always matches).
//! 2. Split on it, keeping the separator at the end of the preceding piece.
//! 3. Pieces shorter than `chunk_size` are merged greedily into a window;
//!    when the next piece would overflow the window, the window is emitted
//!    and then shrunk from the front until at most `chunk_overlap`
//!    characters remain.
//! 4. Pieces that are too long on their own are split recursively with the
//!    remaining separators.
//! 5. Emitted chunks are trimmed; empty chunks are dropped.
//!
//! The output is a pure function of the input and the two sizes.
//!
//! ```rust
//! use topic_rag::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(900, 150);
//! let chunks = splitter.split("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use std::collections::VecDeque;

/// Boundaries tried in order of preference.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(900, 150)
    }
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`; `chunk_size` is at
    /// least 1.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered chunks. Whitespace-only input yields none.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if remaining.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    /// Greedily pack pieces into windows, carrying an overlap tail forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &join(&window));
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        if !window.is_empty() {
            push_trimmed(&mut chunks, &join(&window));
        }
        chunks
    }
}

/// Split on `separator`, attaching it to the end of each preceding piece.
/// The empty separator splits between characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    text.split_inclusive(separator)
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn join(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(piece, _)| *piece).collect()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = TextSplitter::default().split("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(TextSplitter::default().split("").is_empty());
        assert!(TextSplitter::default().split("  \n\n \t").is_empty());
    }

    #[test]
    fn no_chunk_exceeds_size() {
        let text = sentences(200);
        let splitter = TextSplitter::new(120, 30);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 120, "chunk too long: {}", char_len(chunk));
        }
    }

    #[test]
    fn unbroken_token_is_hard_cut() {
        let text = "x".repeat(250);
        let chunks = TextSplitter::new(100, 10).split(&text);
        assert!(chunks.iter().all(|c| char_len(c) <= 100));
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = sentences(60);
        let chunks = TextSplitter::new(200, 60).split(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .split_whitespace()
                .last()
                .unwrap()
                .to_string();
            assert!(
                pair[1].contains(&tail),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let para_a = "alpha ".repeat(20);
        let para_b = "beta ".repeat(20);
        let text = format!("{}\n\n{}", para_a.trim(), para_b.trim());
        let chunks = TextSplitter::new(130, 20).split(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("alpha") && !chunks[0].contains("beta"));
        assert!(chunks[1].starts_with("beta") && !chunks[1].contains("alpha"));
    }

    #[test]
    fn deterministic() {
        let text = format!("{}\n\n{}\n{}", sentences(40), sentences(15), "word ".repeat(300));
        let splitter = TextSplitter::new(900, 150);
        assert_eq!(splitter.split(&text), splitter.split(&text));
    }

    #[test]
    fn multibyte_text_respects_char_limit() {
        let text = "héllo wörld ünïcode ".repeat(80);
        let chunks = TextSplitter::new(50, 10).split(&text);
        assert!(chunks.iter().all(|c| char_len(c) <= 50));
    }

    #[test]
    fn overlap_is_clamped_below_size() {
        let splitter = TextSplitter::new(10, 50);
        assert_eq!(splitter.chunk_overlap(), 9);
        assert_eq!(TextSplitter::new(0, 0).chunk_size(), 1);
    }
}
