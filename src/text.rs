//! Free-text measurements for comments and descriptions.

use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Descriptions are cut to this many characters in summaries.
pub const DESCRIPTION_MAX_CHARS: usize = 240;

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[/_-]+").expect("separator pattern is valid"))
}

fn html_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"))
}

/// Counts words whose first code point is a letter, after collapsing runs of
/// `/`, `-` and `_` into a single space.
pub fn word_count(text: &str) -> usize {
    let text = separator_re().replace_all(text, " ");
    text.split_word_bounds()
        .filter(|segment| segment.chars().next().map_or(false, char::is_alphabetic))
        .count()
}

/// Drops HTML comments (PR templates) and truncates on a char boundary.
pub fn clean_description(body: &str) -> String {
    let body = html_comment_re().replace_all(body, "");
    let body = body.trim();
    match body.char_indices().nth(DESCRIPTION_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
