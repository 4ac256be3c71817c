//! Token-window chunker.
//!
//! Slides a fixed-size, overlapping window over a page's token sequence.
//! Window geometry is validated up front so bad settings are rejected
//! before any data is processed.

use crate::error::{RagError, Result};

/// One token window within a page.
///
/// `start..end` is the half-open token offset range within the page's
/// token sequence; `tokens` is the slice covered by that range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWindow {
    pub start: usize,
    pub end: usize,
    pub tokens: Vec<String>,
}

impl ChunkWindow {
    /// Retrieval text for the window: the space-joined token slice.
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Slide a `window`-sized window with `overlap` shared tokens over `tokens`.
///
/// The first window is `[0, window)`; each subsequent window starts at
/// `previous_end - overlap`. A window is shorter than `window` only when it
/// reaches the end of the sequence, and production stops immediately after
/// the window that reaches the end. Consecutive windows cover every token
/// exactly once net of overlap.
///
/// # Errors
///
/// Returns [`RagError::Configuration`] if `window == 0` or
/// `overlap >= window`.
pub fn chunk_tokens(tokens: &[String], window: usize, overlap: usize) -> Result<Vec<ChunkWindow>> {
    if window == 0 {
        return Err(RagError::Configuration(
            "chunk window size must be positive".to_string(),
        ));
    }
    if overlap >= window {
        return Err(RagError::Configuration(format!(
            "chunk overlap ({overlap}) must be smaller than window size ({window})"
        )));
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < tokens.len() {
        let end = (start + window).min(tokens.len());
        windows.push(ChunkWindow {
            start,
            end,
            tokens: tokens[start..end].to_vec(),
        });
        if end == tokens.len() {
            break;
        }
        start = end - overlap;
    }

    Ok(windows)
}
