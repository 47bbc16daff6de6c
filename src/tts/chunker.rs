//! Splits text into bounded-size chunks for per-chunk synthesis.
//!
//! Chunk boundaries prefer paragraph breaks; a paragraph that alone exceeds
//! the budget is split at sentence boundaries, then at whitespace. Words are
//! never split.

use regex::Regex;

/// A bounded-size slice of source text submitted independently for synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk text; paragraphs inside a chunk stay separated by `\n\n`.
    pub text: String,
    /// Byte offset of the chunk's first character in the input text.
    pub start_offset: usize,
}

/// Split `text` into chunks of at most `max_chunk_chars` characters
/// (Unicode scalar values, not bytes).
///
/// Guarantees, in priority order:
/// 1. no chunk splits inside a word;
/// 2. boundaries fall on paragraph breaks whenever the paragraph fits the
///    remaining budget, then on sentence ends, then on whitespace;
/// 3. no chunk exceeds `max_chunk_chars` — except that a single word longer
///    than the limit is emitted whole as its own over-sized chunk. The limit
///    is advisory at the word level.
///
/// Empty or whitespace-only input yields an empty list; callers treat that as
/// "no audio to produce", not an error.
pub fn chunk_text(text: &str, max_chunk_chars: usize) -> Vec<Chunk> {
    let paragraphs = split_paragraphs(text);
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let separator_chars = "\n\n".len();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut current_start = 0usize;

    let mut flush = |current: &mut String, current_start: usize, chunks: &mut Vec<Chunk>| {
        if !current.is_empty() {
            chunks.push(Chunk {
                text: std::mem::take(current),
                start_offset: current_start,
            });
        }
    };

    for (offset, paragraph) in paragraphs {
        let paragraph_chars = paragraph.chars().count();
        if paragraph_chars > max_chunk_chars {
            // Oversized paragraph: finalize the open chunk, then split the
            // paragraph on its own.
            flush(&mut current, current_start, &mut chunks);
            current_chars = 0;
            split_oversized_paragraph(paragraph, offset, max_chunk_chars, &mut chunks);
            continue;
        }

        if current.is_empty() {
            current_start = offset;
            current.push_str(paragraph);
            current_chars = paragraph_chars;
        } else if current_chars + separator_chars + paragraph_chars > max_chunk_chars {
            flush(&mut current, current_start, &mut chunks);
            current_start = offset;
            current.push_str(paragraph);
            current_chars = paragraph_chars;
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_chars += separator_chars + paragraph_chars;
        }
    }

    flush(&mut current, current_start, &mut chunks);

    log::debug!(
        "chunker: {} chars -> {} chunks (max {})",
        text.len(),
        chunks.len(),
        max_chunk_chars
    );

    chunks
}

/// Non-empty paragraphs with their byte offsets; boundaries are runs of two
/// or more newlines.
fn split_paragraphs(text: &str) -> Vec<(usize, &str)> {
    let re = Regex::new(r"\n{2,}").unwrap();
    let mut out = Vec::new();
    let mut pos = 0usize;

    for boundary in re.find_iter(text) {
        push_trimmed(text, pos, boundary.start(), &mut out);
        pos = boundary.end();
    }
    push_trimmed(text, pos, text.len(), &mut out);

    out
}

fn push_trimmed<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<(usize, &'a str)>) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    out.push((start + lead, trimmed));
}

/// Split one paragraph that exceeds the budget: pack whole sentences, and
/// split any still-oversized sentence at whitespace.
fn split_oversized_paragraph(
    paragraph: &str,
    paragraph_offset: usize,
    max_chunk_chars: usize,
    chunks: &mut Vec<Chunk>,
) {
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut current_start = paragraph_offset;
    let mut cursor = 0usize; // byte position within `paragraph`

    let mut flush = |current: &mut String, current_start: usize, chunks: &mut Vec<Chunk>| {
        let trimmed = current.trim_end();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                text: trimmed.to_string(),
                start_offset: current_start,
            });
        }
        current.clear();
    };

    for sentence in paragraph.split_inclusive(&['.', '!', '?'][..]) {
        let raw_start = paragraph_offset + cursor;
        cursor += sentence.len();

        // Leading whitespace belongs to the previous sentence; drop it when a
        // sentence opens a chunk so offsets land on the first word.
        let lead = sentence.len() - sentence.trim_start().len();
        let trimmed = sentence.trim_start();
        let trimmed_start = raw_start + lead;
        if trimmed.is_empty() {
            continue;
        }
        let trimmed_chars = trimmed.chars().count();

        if trimmed_chars > max_chunk_chars {
            flush(&mut current, current_start, chunks);
            current_chars = 0;
            split_at_whitespace(trimmed, trimmed_start, max_chunk_chars, chunks);
            continue;
        }

        let sentence_chars = sentence.chars().count();
        if current.is_empty() {
            current_start = trimmed_start;
            current.push_str(trimmed);
            current_chars = trimmed_chars;
        } else if current_chars + sentence_chars > max_chunk_chars {
            flush(&mut current, current_start, chunks);
            current_start = trimmed_start;
            current.push_str(trimmed);
            current_chars = trimmed_chars;
        } else {
            current.push_str(sentence);
            current_chars += sentence_chars;
        }
    }

    flush(&mut current, current_start, chunks);
}

/// Last resort: pack whitespace-separated words. A single word longer than
/// the budget becomes its own over-sized chunk rather than being split.
fn split_at_whitespace(
    sentence: &str,
    sentence_offset: usize,
    max_chunk_chars: usize,
    chunks: &mut Vec<Chunk>,
) {
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut current_start = sentence_offset;
    let mut cursor = 0usize;

    for word in sentence.split_whitespace() {
        // Locate the word to keep offsets exact
        let found = sentence[cursor..]
            .find(word)
            .map(|i| cursor + i)
            .unwrap_or(cursor);
        let word_start = sentence_offset + found;
        cursor = found + word.len();
        let word_chars = word.chars().count();

        if current.is_empty() {
            current_start = word_start;
            current.push_str(word);
            current_chars = word_chars;
        } else if current_chars + 1 + word_chars > max_chunk_chars {
            chunks.push(Chunk {
                text: std::mem::take(&mut current),
                start_offset: current_start,
            });
            current_start = word_start;
            current.push_str(word);
            current_chars = word_chars;
        } else {
            current.push(' ');
            current.push_str(word);
            current_chars += 1 + word_chars;
        }

        if current_chars > max_chunk_chars {
            // A lone word over the budget: emit it whole (soft limit).
            log::warn!(
                "chunker: word of {} chars exceeds chunk budget {}, emitting whole",
                current_chars,
                max_chunk_chars
            );
            chunks.push(Chunk {
                text: std::mem::take(&mut current),
                start_offset: current_start,
            });
            current_chars = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            text: current,
            start_offset: current_start,
        });
    }
}
