//! Boundary-aware page chunker.
//!
//! Splits a document's pages into overlapping [`Chunk`]s sized near a
//! target length, preferring paragraph, then sentence, then word
//! boundaries. All sizes and positions are measured in characters.
//!
//! # Algorithm
//!
//! 1. Append each non-blank page to a buffer (pages joined by `\n\n`) and
//!    record its page number.
//! 2. While the buffer holds at least `target_size` characters, find a
//!    break point with [`find_break_point`] and emit the trimmed text
//!    before it as a chunk.
//! 3. Keep the text from `break_point - overlap` onward as the new buffer.
//!    The page list collapses to the last page seen, so carried-over
//!    overlap text is attributed to that page only.
//! 4. After the last page, emit whatever non-blank text remains.
//!
//! # Example
//!
//! ```rust
//! use folio_core::chunk::chunk_pages;
//! use folio_core::models::Page;
//!
//! let pages = vec![Page::new(1, "Hello world."), Page::new(2, "Second page.")];
//! let chunks = chunk_pages(7, &pages, 2000, 300);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].page_numbers, vec![1, 2]);
//! ```

use crate::models::{Chunk, DocumentId, Page};

/// Separator inserted between consecutive pages in the buffer.
const PAGE_SEPARATOR: &str = "\n\n";

/// A paragraph or sentence break only counts if it falls past this
/// fraction of the target size.
const BREAK_MIN_FRACTION: f64 = 0.7;

const PARAGRAPH_BREAK: &str = "\n\n";
const SENTENCE_TERMINATORS: [&str; 3] = [". ", "! ", "? "];

/// Split pages into overlapping chunks of roughly `target_size` characters.
///
/// Returns chunks with contiguous indices starting at 0. Every chunk except
/// possibly the last is at most `target_size` characters long. No pages, or
/// only blank pages, yield an empty vector.
///
/// # Guarantees
///
/// - `page_numbers` is never empty.
/// - The buffer advances on every cut, even when `overlap >= break_point`
///   (that cut simply carries no overlap).
pub fn chunk_pages(
    document_id: DocumentId,
    pages: &[Page],
    target_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let target_size = target_size.max(1);

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_pages: Vec<u32> = Vec::new();
    let mut chunk_index: u32 = 0;

    for page in pages {
        let text = page.text.trim();
        if text.is_empty() {
            continue;
        }

        if !buffer.is_empty() {
            buffer.push_str(PAGE_SEPARATOR);
        }
        buffer.push_str(text);
        buffer_pages.push(page.page_number);

        while buffer.chars().count() >= target_size {
            let break_point = find_break_point(&buffer, target_size);
            let cut = byte_offset(&buffer, break_point);

            let piece = buffer[..cut].trim();
            if !piece.is_empty() {
                chunks.push(make_chunk(document_id, chunk_index, &buffer_pages, piece));
                chunk_index += 1;
            }

            let mut next_start = break_point.saturating_sub(overlap);
            if next_start == 0 {
                next_start = break_point;
            }
            buffer = buffer[byte_offset(&buffer, next_start)..].to_string();

            if let Some(&last) = buffer_pages.last() {
                buffer_pages = vec![last];
            }
        }
    }

    let rest = buffer.trim();
    if !rest.is_empty() {
        chunks.push(make_chunk(document_id, chunk_index, &buffer_pages, rest));
    }

    tracing::debug!(
        document_id,
        chunks = chunks.len(),
        "chunked document pages"
    );
    chunks
}

/// Find a natural cut position (in characters) at or before `target_size`.
///
/// Preference order:
/// 1. the last paragraph break (`\n\n`), if it starts past 70% of the target;
/// 2. the furthest sentence end (`. `, `! `, `? `, position after the space),
///    if it lies past 70% of the target;
/// 3. the last space after position 0;
/// 4. exactly `target_size` (mid-word cut).
///
/// Text no longer than `target_size` breaks at its end.
pub fn find_break_point(text: &str, target_size: usize) -> usize {
    let total = text.chars().count();
    if total <= target_size {
        return total;
    }

    let window = &text[..byte_offset(text, target_size)];
    let min_pos = target_size as f64 * BREAK_MIN_FRACTION;

    if let Some(pos) = window.rfind(PARAGRAPH_BREAK) {
        let pos = char_position(window, pos);
        if pos as f64 > min_pos {
            return pos;
        }
    }

    let sentence_end = SENTENCE_TERMINATORS
        .iter()
        .filter_map(|t| {
            window
                .rfind(t)
                .map(|pos| char_position(window, pos) + t.chars().count())
        })
        .max();
    if let Some(end) = sentence_end {
        if end as f64 > min_pos {
            return end;
        }
    }

    if let Some(pos) = window.rfind(' ') {
        let pos = char_position(window, pos);
        if pos > 0 {
            return pos;
        }
    }

    target_size
}

/// Byte offset of the `char_index`-th character (or `s.len()` past the end).
fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Character position of a byte offset that lies on a char boundary.
fn char_position(s: &str, byte_index: usize) -> usize {
    s[..byte_index].chars().count()
}

fn make_chunk(document_id: DocumentId, index: u32, pages: &[u32], text: &str) -> Chunk {
    Chunk {
        document_id,
        chunk_index: index,
        page_numbers: pages.to_vec(),
        text: text.to_string(),
        char_length: text.chars().count(),
    }
}
