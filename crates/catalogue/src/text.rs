//! Text normalization helpers shared by field setters and lookups.

use regex::Regex;
use std::sync::OnceLock;

fn inline_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Whitespace except newlines: runs collapse to one space, newlines
    // survive (annotations are multi-line).
    RE.get_or_init(|| Regex::new(r"[^\S\r\n]+").expect("static pattern"))
}

fn any_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w ]").expect("static pattern"))
}

/// Canonical stored form of user-entered text: trimmed, with internal
/// runs of non-newline whitespace collapsed to single spaces.
pub(crate) fn normalize(text: &str) -> String {
    inline_whitespace().replace_all(text.trim(), " ").into_owned()
}

/// Fuzzy comparison form: lowercased, punctuation stripped, whitespace
/// collapsed. Used for suggestion prefix matching where "L'Engle" and
/// "lengle" should meet.
pub(crate) fn simplify(text: &str) -> String {
    let collapsed = any_whitespace().replace_all(text, " ");
    non_word().replace_all(&collapsed, "").trim().to_lowercase()
}
