//! SSML generation with one named mark per word.
//!
//! Each word is preceded by `<mark name="..."/>` whose name is the literal
//! word text with XML entities escaped; decoding the name back must return
//! the original word exactly, since the name is what gets highlighted. Every
//! paragraph is terminated by a sentinel mark plus a timed break so the
//! backend emits a timepoint for the boundary.

use crate::timepoint::PARAGRAPH_BREAK;
use regex::Regex;

/// Pause inserted at each paragraph boundary.
pub const PARAGRAPH_BREAK_MS: u64 = 750;

/// A mark the backend is expected to echo back, in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedMark {
    /// Escaped word text, exactly as sent in the `name` attribute.
    Word(String),
    ParagraphBreak,
}

/// Markup for one chunk plus the ordered marks it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMarkup {
    pub ssml: String,
    pub expected: Vec<ExpectedMark>,
}

impl ChunkMarkup {
    /// Number of words (non-sentinel marks) in the chunk.
    pub fn word_count(&self) -> usize {
        self.expected
            .iter()
            .filter(|m| matches!(m, ExpectedMark::Word(_)))
            .count()
    }
}

/// Escape a word for use both as a mark name and in SSML text content.
pub fn escape_mark_name(word: &str) -> String {
    word.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Reverse [`escape_mark_name`] exactly.
pub fn decode_mark_name(name: &str) -> String {
    name.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Build SSML for one chunk of plain text.
///
/// Word order in `expected` equals word order in the chunk; no token is
/// dropped, including single-character and punctuation-only ones. A sentinel
/// mark follows every paragraph, the last one included, so paragraph grouping
/// sees a terminator even at chunk boundaries.
pub fn build_markup(chunk_text: &str) -> ChunkMarkup {
    let re_paragraph = Regex::new(r"\n{2,}").unwrap();

    let mut ssml = String::from("<speak>");
    let mut expected = Vec::new();

    for paragraph in re_paragraph.split(chunk_text) {
        if paragraph.trim().is_empty() {
            continue;
        }

        ssml.push_str("<p>");
        let mut first = true;
        for word in paragraph.split_whitespace() {
            let escaped = escape_mark_name(word);
            if !first {
                ssml.push(' ');
            }
            ssml.push_str(&format!("<mark name=\"{}\"/>{}", escaped, escaped));
            expected.push(ExpectedMark::Word(escaped));
            first = false;
        }
        ssml.push_str(&format!(
            "</p><mark name=\"{}\"/><break time=\"{}ms\"/>",
            PARAGRAPH_BREAK, PARAGRAPH_BREAK_MS
        ));
        expected.push(ExpectedMark::ParagraphBreak);
    }

    ssml.push_str("</speak>");

    ChunkMarkup { ssml, expected }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(markup: &ChunkMarkup) -> Vec<String> {
        markup
            .expected
            .iter()
            .filter_map(|m| match m {
                ExpectedMark::Word(w) => Some(decode_mark_name(w)),
                ExpectedMark::ParagraphBreak => None,
            })
            .collect()
    }

    #[test]
    fn mark_order_equals_word_order() {
        let markup = build_markup("Alpha beta gamma");
        assert_eq!(words(&markup), vec!["Alpha", "beta", "gamma"]);
        assert_eq!(
            markup.expected.last(),
            Some(&ExpectedMark::ParagraphBreak)
        );
    }

    #[test]
    fn sentinel_per_paragraph() {
        let markup = build_markup("One two.\n\nThree four.");
        let sentinels = markup
            .expected
            .iter()
            .filter(|m| matches!(m, ExpectedMark::ParagraphBreak))
            .count();
        assert_eq!(sentinels, 2);
        assert_eq!(markup.word_count(), 4);
    }

    #[test]
    fn escape_decode_round_trip() {
        for word in ["AT&T", "<tag>", "say \"hi\"", "it's", "a&b<c>\"d'"] {
            let escaped = escape_mark_name(word);
            assert!(!escaped.contains('<'));
            assert!(!escaped.contains('"'));
            assert_eq!(decode_mark_name(&escaped), word, "round trip for {word:?}");
        }
    }

    #[test]
    fn punctuation_only_tokens_keep_their_marks() {
        let markup = build_markup("wait - ok");
        assert_eq!(words(&markup), vec!["wait", "-", "ok"]);
    }

    #[test]
    fn ssml_shape() {
        let markup = build_markup("Hi there");
        assert!(markup.ssml.starts_with("<speak><p>"));
        assert!(markup.ssml.contains("<mark name=\"Hi\"/>Hi"));
        assert!(markup
            .ssml
            .contains("</p><mark name=\"PARAGRAPH_BREAK\"/><break time=\"750ms\"/>"));
        assert!(markup.ssml.ends_with("</speak>"));
    }

    #[test]
    fn empty_chunk_produces_no_marks() {
        let markup = build_markup("   \n\n ");
        assert!(markup.expected.is_empty());
        assert_eq!(markup.ssml, "<speak></speak>");
    }
}
