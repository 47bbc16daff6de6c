//! Markdown / markup cleanup ahead of speech synthesis.
//!
//! Strips formatting that should not be read aloud while preserving paragraph
//! structure: each paragraph (separated by two or more newlines) is cleaned
//! independently, then the survivors are re-joined with `\n\n`.

use regex::Regex;

/// Remove Markdown formatting and other non-speech elements from `text`.
///
/// Single newlines inside a paragraph become spaces; runs of whitespace
/// collapse to one space; empty paragraphs are dropped.
pub fn sanitize_text_for_speech(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let re_paragraph = Regex::new(r"\n{2,}").unwrap();
    let re_code_block = Regex::new(r"(?s)```.*?```").unwrap();
    let re_inline_code = Regex::new(r"`([^`]+)`").unwrap();
    let re_header = Regex::new(r"(?m)^#+\s*").unwrap();
    let re_emphasis = Regex::new(r"[*_~]{1,3}([^*_~]+)[*_~]{1,3}").unwrap();
    let re_link = Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap();
    let re_image = Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap();
    let re_blockquote = Regex::new(r"(?m)^>\s*").unwrap();
    let re_html_tag = Regex::new(r"<[^>]+>").unwrap();
    let re_footnote = Regex::new(r"\[\^?[0-9]+\]").unwrap();
    let re_hr = Regex::new(r"(?m)^[-*_]{3,}\s*$").unwrap();
    let re_whitespace = Regex::new(r"\s+").unwrap();

    let mut sanitized_paragraphs: Vec<String> = Vec::new();

    for paragraph in re_paragraph.split(text) {
        if paragraph.trim().is_empty() {
            continue;
        }

        let clean = re_code_block.replace_all(paragraph, "");
        // Images before links: the image pattern is a superset
        let clean = re_image.replace_all(&clean, "");
        let clean = re_link.replace_all(&clean, "$1");
        let clean = re_inline_code.replace_all(&clean, "$1");
        let clean = re_header.replace_all(&clean, "");
        let clean = re_emphasis.replace_all(&clean, "$1");
        let clean = re_blockquote.replace_all(&clean, "");
        let clean = re_html_tag.replace_all(&clean, "");
        let clean = re_footnote.replace_all(&clean, "");
        let clean = re_hr.replace_all(&clean, "");

        let clean = clean.replace('\n', " ");
        let clean = re_whitespace.replace_all(&clean, " ");
        let clean = clean.trim();

        if !clean.is_empty() {
            sanitized_paragraphs.push(clean.to_string());
        }
    }

    let result = sanitized_paragraphs.join("\n\n");
    log::debug!(
        "sanitizer: {} chars in, {} chars / {} paragraphs out",
        text.len(),
        result.len(),
        sanitized_paragraphs.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_formatting() {
        let input = "# Heading\n\nSome **bold** and *italic* text with `code`.";
        assert_eq!(
            sanitize_text_for_speech(input),
            "Heading\n\nSome bold and italic text with code."
        );
    }

    #[test]
    fn keeps_link_text_drops_url() {
        let input = "See [the docs](https://example.com) for more.";
        assert_eq!(
            sanitize_text_for_speech(input),
            "See the docs for more."
        );
    }

    #[test]
    fn drops_images_and_code_blocks() {
        let input = "Before ![alt](img.png) after\n\n```\nlet x = 1;\n```\n\nEnd.";
        assert_eq!(sanitize_text_for_speech(input), "Before after\n\nEnd.");
    }

    #[test]
    fn preserves_paragraph_structure() {
        let input = "First paragraph\nwith a wrapped line.\n\n\nSecond paragraph.";
        assert_eq!(
            sanitize_text_for_speech(input),
            "First paragraph with a wrapped line.\n\nSecond paragraph."
        );
    }

    #[test]
    fn drops_blockquotes_footnotes_and_rules() {
        let input = "> quoted line\n\nClaim[^1] stands.\n\n---\n\nDone.";
        assert_eq!(
            sanitize_text_for_speech(input),
            "quoted line\n\nClaim stands.\n\nDone."
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_text_for_speech(""), "");
        assert_eq!(sanitize_text_for_speech("\n\n  \n\n"), "");
    }
}
