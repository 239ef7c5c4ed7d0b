//! Sanitization of untrusted text and path fields.
//!
//! Everything that crosses the hook boundary (agent actions, corrected
//! actions, file paths, task strings) passes through here before it is
//! stored or matched against. Sanitization is idempotent:
//! `sanitize_text(sanitize_text(x)) == sanitize_text(x)`.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length retained for any sanitized text field.
const MAX_TEXT_LEN: usize = 4096;

/// Maximum length retained for any sanitized path field.
const MAX_PATH_LEN: usize = 1024;

// Matches HTML/XML tags: <b>, </p>, <script ...>
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("invalid regex"));

// Matches fenced code block markers, keeping the body
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z0-9_+-]*").expect("invalid regex"));

// Collapses runs of whitespace (including newlines) to a single space
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex"));

/// Sanitize a free-text field.
///
/// Strips HTML/XML tags, code fence markers, ASCII control characters and
/// zero-width/BOM characters, collapses whitespace, trims, and truncates
/// to a bounded length. Returns an empty string when nothing survives.
pub fn sanitize_text(input: &str) -> String {
    // Character filters run before markup stripping, so removing a
    // control character can never expose a fresh tag to a second pass
    let visible: String = input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .filter(|c| !matches!(c, '\u{200b}'..='\u{200f}' | '\u{feff}' | '\u{2028}' | '\u{2029}'))
        .collect();

    let no_tags = TAG_RE.replace_all(&visible, " ");
    let no_fences = FENCE_RE.replace_all(&no_tags, " ");

    let collapsed = WS_RE.replace_all(&no_fences, " ");
    truncate_on_char_boundary(collapsed.trim(), MAX_TEXT_LEN)
}

/// Sanitize a path field.
///
/// Removes traversal components (`..`), control characters, and null
/// bytes; normalizes backslashes to forward slashes; collapses duplicate
/// separators. The result is suitable for storage and comparison, not for
/// filesystem access.
pub fn sanitize_path(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();

    let mut parts: Vec<&str> = Vec::new();
    for part in cleaned.split('/') {
        let part = part.trim();
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        parts.push(part);
    }

    let joined = if cleaned.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    };

    truncate_on_char_boundary(&joined, MAX_PATH_LEN)
}

/// Whether a text field is non-empty after sanitization.
pub fn is_meaningful(input: &str) -> bool {
    !sanitize_text(input).is_empty()
}

fn truncate_on_char_boundary(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].trim_end().to_string()
}
