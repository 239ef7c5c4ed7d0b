//! Scope classification for learned behaviors.
//!
//! A behavior about a specific path belongs to the project that owns the
//! path; a behavior phrased in general language/task terms belongs to the
//! user's global store. A caller-supplied override always wins.

use crate::graph::types::{Behavior, Scope};
use crate::learn::types::Correction;
use regex::Regex;
use std::sync::LazyLock;

// Path-shaped tokens: at least one separator between word-ish segments
static PATH_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\w.-]+/[\w./-]+").expect("invalid regex")
});

// Wording that anchors guidance to one repository
static PROJECT_PHRASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(this (repo|repository|project|codebase)|our (repo|codebase|project))\b")
        .expect("invalid regex")
});

/// The `when` keys considered portable across projects.
const GENERAL_WHEN_KEYS: [&str; 3] = ["language", "task", "file_ext"];

/// Classify where a candidate behavior should live.
pub fn classify_scope(
    candidate: &Behavior,
    correction: &Correction,
    override_scope: Option<Scope>,
) -> Scope {
    if let Some(scope) = override_scope {
        return scope;
    }

    let text = &candidate.content.canonical;
    if PATH_TOKEN_PATTERN.is_match(text) || PROJECT_PHRASE_PATTERN.is_match(text) {
        return Scope::Local;
    }
    if candidate
        .when
        .values()
        .any(|v| PATH_TOKEN_PATTERN.is_match(v))
    {
        return Scope::Local;
    }

    // A correction pinned to a branch happened somewhere specific
    if correction.context_snapshot.branch.is_some() {
        return Scope::Local;
    }

    let general_predicate = candidate
        .when
        .keys()
        .all(|k| GENERAL_WHEN_KEYS.contains(&k.as_str()));
    if general_predicate {
        return Scope::Global;
    }

    // Predicate carries non-portable keys: keep it in the project
    Scope::Local
}
