//! Page segmentation of raw document content.
//!
//! Form-feed markers are authoritative: when the content contains any,
//! pages are exactly the marker-delimited sections and the character cap
//! is not applied. Without markers, paragraphs are bucketed greedily so
//! that no page exceeds the cap, except that a single paragraph longer
//! than the cap becomes its own oversized page rather than being split
//! mid-paragraph.

use crate::text::normalize;

/// Explicit page delimiter (form feed), as emitted by PDF-to-text tools.
pub const PAGE_BREAK: char = '\u{0c}';

/// Default page size cap in characters for paragraph bucketing.
pub const DEFAULT_MAX_PAGE_CHARS: usize = 1800;

/// Split raw content into ordered, non-empty page texts.
///
/// Each page is normalized; blank pages are dropped. Content that is
/// nothing but whitespace yields no pages.
pub fn split_pages(content: &str, max_chars: usize) -> Vec<String> {
    if content.contains(PAGE_BREAK) {
        return content
            .split(PAGE_BREAK)
            .map(normalize)
            .filter(|page| !page.is_empty())
            .collect();
    }

    let normalized = normalize(content);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut pages = Vec::new();
    let mut bucket: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for paragraph in normalized.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let para_chars = paragraph.chars().count();

        // Each appended paragraph costs its length plus 2 for the
        // rejoined separator; a paragraph that reopens a bucket after a
        // close costs its bare length.
        if current_len + para_chars + 2 > max_chars && !bucket.is_empty() {
            pages.push(bucket.join("\n\n"));
            bucket = vec![paragraph];
            current_len = para_chars;
        } else {
            bucket.push(paragraph);
            current_len += para_chars + 2;
        }
    }
    if !bucket.is_empty() {
        pages.push(bucket.join("\n\n"));
    }

    pages
}
