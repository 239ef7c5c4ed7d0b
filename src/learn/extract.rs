//! Candidate extraction: turning a correction into a behavior.

use crate::graph::types::{Behavior, BehaviorKind, Provenance};
use crate::learn::types::Correction;
use crate::tags::extract_tags;
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

// Prohibitions read as hard constraints
static CONSTRAINT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(never|do not|don'?t|must not|avoid|no longer|stop)\b")
        .expect("invalid regex")
});

// Multi-step phrasing reads as a procedure
static PROCEDURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(first|then|after(wards)?|before\s+\w+ing|followed by|step\s+\d|finally)\b")
        .expect("invalid regex")
});

// Soft wording reads as a preference
static PREFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(prefer(red|ably)?|favor|ideally|when possible|rather than)\b")
        .expect("invalid regex")
});

/// Infer the behavior kind from corrected-action phrasing.
///
/// Prohibition beats procedure beats preference; anything else is a
/// plain directive.
pub fn infer_kind(text: &str) -> BehaviorKind {
    if CONSTRAINT_PATTERN.is_match(text) {
        BehaviorKind::Constraint
    } else if PROCEDURE_PATTERN.is_match(text) {
        BehaviorKind::Procedure
    } else if PREFERENCE_PATTERN.is_match(text) {
        BehaviorKind::Preference
    } else {
        BehaviorKind::Directive
    }
}

/// Derive a short kebab-case name from canonical text.
pub fn derive_name(canonical: &str) -> String {
    let words: Vec<String> = canonical
        .split_whitespace()
        .take(5)
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        "unnamed-behavior".to_string()
    } else {
        words.join("-")
    }
}

/// Initial confidence for an extracted candidate.
///
/// Starts conservative and rises with the stability of the context the
/// correction carried: a known language and an explicit task both make
/// the predicate more trustworthy.
fn initial_confidence(correction: &Correction) -> f64 {
    let mut confidence: f64 = 0.7;
    if correction.context_snapshot.file_language.is_some() {
        confidence += 0.1;
    }
    if correction.context_snapshot.task.is_some() {
        confidence += 0.05;
    }
    confidence.min(0.95)
}

/// Extract a candidate behavior from a sanitized correction.
///
/// The canonical content is the corrected action; `when` takes only the
/// stable non-empty snapshot fields (`language`, `task`, `file_ext`).
pub fn extract_candidate(correction: &Correction) -> Behavior {
    let canonical = correction.corrected_action.clone();
    let kind = infer_kind(&canonical);
    let tags = extract_tags(&canonical);

    let mut behavior = Behavior::new(kind, derive_name(&canonical), &canonical)
        .with_confidence(initial_confidence(correction));
    behavior.content.tags = tags;
    behavior.provenance = Provenance {
        source_type: "correction".to_string(),
        correction_id: Some(correction.id.clone()),
        created_at: Utc::now(),
        approved_by: None,
    };

    let snapshot = &correction.context_snapshot;
    if let Some(language) = snapshot.file_language.as_deref().filter(|s| !s.is_empty()) {
        behavior.when.insert("language".to_string(), language.to_string());
    }
    if let Some(task) = snapshot.task.as_deref().filter(|s| !s.is_empty()) {
        behavior.when.insert("task".to_string(), task.to_string());
    }
    if let Some(ext) = snapshot.file_ext.as_deref().filter(|s| !s.is_empty()) {
        behavior.when.insert("file_ext".to_string(), ext.to_string());
    }

    behavior
}
