//! Short-form rendering of behaviors.

use crate::graph::types::Behavior;

/// Default length cap for generated summaries, in characters.
pub const DEFAULT_SUMMARY_LEN: usize = 120;

/// Produce the Summary-tier text for a behavior.
///
/// Prefers an authored `content.summary`; otherwise takes the first
/// sentence of the canonical text, truncated at a word boundary under the
/// cap; falls back to the name when nothing else survives.
pub fn summarize(behavior: &Behavior, max_len: usize) -> String {
    if let Some(summary) = behavior.content.summary.as_deref() {
        if !summary.is_empty() {
            return truncate_words(summary, max_len);
        }
    }

    let canonical = behavior.content.canonical.trim();
    if !canonical.is_empty() {
        return truncate_words(first_sentence(canonical), max_len);
    }

    behavior.name.clone()
}

fn first_sentence(text: &str) -> &str {
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            // Don't split file extensions or dotted names
            let rest = &text[i + c.len_utf8()..];
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\n') {
                return &text[..i + c.len_utf8()];
            }
        }
    }
    text
}

fn truncate_words(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut cut = 0;
    for (i, c) in text.char_indices() {
        if i + c.len_utf8() > max_len {
            break;
        }
        if c.is_whitespace() {
            cut = i;
        }
    }
    if cut == 0 {
        // No word boundary under the cap; fall back to a char boundary
        let mut end = max_len;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        return format!("{}…", &text[..end]);
    }
    format!("{}…", text[..cut].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::BehaviorKind;

    #[test]
    fn test_authored_summary_preferred() {
        let b = Behavior::new(BehaviorKind::Directive, "n", "a long canonical explanation")
            .with_summary("short form");
        assert_eq!(summarize(&b, DEFAULT_SUMMARY_LEN), "short form");
    }

    #[test]
    fn test_first_sentence_of_canonical() {
        let b = Behavior::new(
            BehaviorKind::Directive,
            "n",
            "Use pathlib for paths. The os.path module is legacy.",
        );
        assert_eq!(summarize(&b, DEFAULT_SUMMARY_LEN), "Use pathlib for paths.");
    }

    #[test]
    fn test_dotted_name_not_split() {
        let b = Behavior::new(BehaviorKind::Directive, "n", "Use pathlib.Path everywhere");
        assert_eq!(summarize(&b, DEFAULT_SUMMARY_LEN), "Use pathlib.Path everywhere");
    }

    #[test]
    fn test_truncates_at_word_boundary() {
        let b = Behavior::new(
            BehaviorKind::Directive,
            "n",
            "one two three four five six seven",
        );
        let out = summarize(&b, 12);
        assert_eq!(out, "one two…");
    }

    #[test]
    fn test_falls_back_to_name() {
        let mut b = Behavior::new(BehaviorKind::Directive, "the-name", "content");
        b.content.canonical = String::new();
        assert_eq!(summarize(&b, DEFAULT_SUMMARY_LEN), "the-name");
    }
}
