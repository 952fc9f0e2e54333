//! Overlapping, boundary-aware chunking of cleaned page text.
//!
//! Pages are concatenated and cut into windows of roughly `window` chars.
//! Both cut points prefer a sentence terminator, then the nearest word break
//! within the lookahead; consecutive chunks share `overlap` chars. A chunk
//! that would leave a table tag unclosed restarts the next chunk at the
//! table's opening tag instead of the plain overlap position.
//!
//! All offsets are char offsets over the concatenated text, never bytes.

use thiserror::Error;

use crate::model::PageText;

const SENTENCE_ENDINGS: [char; 3] = ['.', '!', '?'];
const WORD_BREAKS: [char; 12] = [',', ';', ':', ' ', '(', ')', '[', ']', '{', '}', '\t', '\n'];
const TABLE_OPEN: &str = "<table";
const TABLE_CLOSE: &str = "</table";

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("invalid chunking limits: {reason}")]
    InvalidLimits { reason: String },
}

/// Chunking parameters. Defaults match the production pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingLimits {
    /// Target chunk size in chars.
    pub window: usize,
    /// Chars shared between consecutive chunks.
    pub overlap: usize,
    /// How far past the window a sentence terminator is searched for.
    pub sentence_lookahead: usize,
}

impl Default for ChunkingLimits {
    fn default() -> Self {
        Self {
            window: 1024,
            overlap: 50,
            sentence_lookahead: 100,
        }
    }
}

impl ChunkingLimits {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.window == 0 {
            return Err(ChunkError::InvalidLimits {
                reason: "window must be positive".to_string(),
            });
        }
        if self.overlap >= self.window {
            return Err(ChunkError::InvalidLimits {
                reason: format!(
                    "overlap {} must be smaller than window {}",
                    self.overlap, self.window
                ),
            });
        }
        Ok(())
    }
}

/// One chunk of the concatenated page text, tagged with the page it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Page the chunk's first char falls on.
    pub page_index: usize,
    /// Char count of `text`.
    pub len: usize,
}

/// Split concatenated page texts into overlapping chunks.
pub fn chunk_pages(pages: &[PageText], limits: &ChunkingLimits) -> Result<Vec<Chunk>, ChunkError> {
    limits.validate()?;
    debug_assert!(pages.iter().enumerate().all(|(i, p)| p.index == i));

    let all_text: Vec<char> = pages.iter().flat_map(|p| p.text.chars()).collect();
    let page_offsets = cumulative_offsets(pages);

    let window = limits.window;
    let overlap = limits.overlap;
    let lookahead = limits.sentence_lookahead;

    let length = all_text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut end = length;

    while start + overlap < length {
        let mut last_word: isize = -1;
        end = start + window;

        if end > length {
            end = length;
        } else {
            while end < length
                && end - start - window < lookahead
                && !is_sentence_ending(all_text[end])
            {
                if is_word_break(all_text[end]) {
                    last_word = end as isize;
                }
                end += 1;
            }
            if end < length && !is_sentence_ending(all_text[end]) && last_word > 0 {
                end = last_word as usize;
            }
        }
        // Include the terminator itself.
        if end < length {
            end += 1;
        }

        last_word = -1;
        let back_limit = end as isize - window as isize - 2 * lookahead as isize;
        while start > 0 && start as isize > back_limit && !is_sentence_ending(all_text[start]) {
            if is_word_break(all_text[start]) {
                last_word = start as isize;
            }
            start -= 1;
        }
        if !is_sentence_ending(all_text[start]) && last_word > 0 {
            start = last_word as usize;
        }
        if start > 0 {
            start += 1;
        }

        debug_assert!(start < end);
        chunks.push(make_chunk(&all_text, &page_offsets, start, end));

        // A table opened near the end of the chunk and never closed: restart
        // the next chunk at the opening tag so the table stays whole.
        let section = &all_text[start..end];
        let last_open = rfind_chars(section, TABLE_OPEN);
        let last_close = rfind_chars(section, TABLE_CLOSE);
        start = match last_open {
            Some(open)
                if open > 2 * lookahead && last_close.map_or(true, |close| open > close) =>
            {
                (end - overlap).min(start + open)
            }
            _ => end - overlap,
        };
    }

    if start + overlap < end {
        chunks.push(make_chunk(&all_text, &page_offsets, start, end));
    }

    Ok(chunks)
}

fn make_chunk(all_text: &[char], page_offsets: &[usize], start: usize, end: usize) -> Chunk {
    let text: String = all_text[start..end].iter().collect();
    Chunk {
        page_index: find_page(page_offsets, start),
        len: end - start,
        text,
    }
}

fn cumulative_offsets(pages: &[PageText]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(pages.len());
    let mut total = 0usize;
    for page in pages {
        offsets.push(total);
        total += page.len;
    }
    offsets
}

/// Page whose half-open char range contains `offset`; char offsets past the
/// last page start map to the last page.
fn find_page(page_offsets: &[usize], offset: usize) -> usize {
    for i in 0..page_offsets.len().saturating_sub(1) {
        if offset >= page_offsets[i] && offset < page_offsets[i + 1] {
            return i;
        }
    }
    page_offsets.len().saturating_sub(1)
}

fn is_sentence_ending(c: char) -> bool {
    SENTENCE_ENDINGS.contains(&c)
}

fn is_word_break(c: char) -> bool {
    WORD_BREAKS.contains(&c)
}

/// Last char index where `needle` begins within `hay`.
fn rfind_chars(hay: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len())
        .rev()
        .find(|&i| hay[i..i + needle.len()] == needle[..])
}
