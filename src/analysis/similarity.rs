//! Lexical similarity and specificity between behaviors.
//!
//! The score is a weighted average of three sub-scores in [0,1]:
//! `when`-predicate overlap, canonical-content Jaccard, and tag Jaccard.
//! Components that are absent on both sides drop out and the score is
//! normalized by the weights that remain, so the measure stays
//! commutative and bounded.

use crate::graph::types::{Behavior, WhenPredicate};
use crate::tags::tokenize;
use std::collections::BTreeSet;

const WHEN_WEIGHT: f64 = 0.4;
const CONTENT_WEIGHT: f64 = 0.6;
const TAG_WEIGHT: f64 = 0.2;

/// Breakdown of a similarity computation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityScore {
    pub score: f64,
    pub when_overlap: f64,
    pub content_jaccard: f64,
    /// Present only when both behaviors carry tags.
    pub tag_jaccard: Option<f64>,
}

/// Compute similarity between two behaviors.
pub fn similarity(a: &Behavior, b: &Behavior) -> SimilarityScore {
    let when_overlap = when_overlap(&a.when, &b.when);
    let content_jaccard = jaccard(
        &tokenize(&a.content.canonical).collect::<BTreeSet<_>>(),
        &tokenize(&b.content.canonical).collect::<BTreeSet<_>>(),
    );
    let tag_jaccard = if !a.content.tags.is_empty() && !b.content.tags.is_empty() {
        Some(jaccard(&a.content.tags, &b.content.tags))
    } else {
        None
    };

    let mut weighted = WHEN_WEIGHT * when_overlap + CONTENT_WEIGHT * content_jaccard;
    let mut total_weight = WHEN_WEIGHT + CONTENT_WEIGHT;
    if let Some(tags) = tag_jaccard {
        weighted += TAG_WEIGHT * tags;
        total_weight += TAG_WEIGHT;
    }

    SimilarityScore {
        score: (weighted / total_weight).clamp(0.0, 1.0),
        when_overlap,
        content_jaccard,
        tag_jaccard,
    }
}

/// Number of tags two behaviors share.
pub fn shared_tag_count(a: &Behavior, b: &Behavior) -> usize {
    a.content.tags.intersection(&b.content.tags).count()
}

/// Overlap of two `when` predicates: `2·matches / (|A| + |B|)`.
///
/// Both empty means both behaviors are unconditional and fully agree
/// (1.0); exactly one empty means one is unconditional and the other is
/// not (0.0).
pub fn when_overlap(a: &WhenPredicate, b: &WhenPredicate) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matches = a
        .iter()
        .filter(|(key, value)| b.get(*key) == Some(*value))
        .count();
    2.0 * matches as f64 / (a.len() + b.len()) as f64
}

/// Whether `a`'s predicate is strictly more specific than `b`'s:
/// `b`'s key/value pairs are a proper subset of `a`'s.
pub fn is_more_specific(a: &WhenPredicate, b: &WhenPredicate) -> bool {
    if a.len() <= b.len() {
        return false;
    }
    b.iter().all(|(key, value)| a.get(key) == Some(value))
}

fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

/// Merge `loser` into `surviving`, returning the updated survivor.
///
/// The survivor keeps its canonical content unless the loser's source has
/// higher confidence (ties broken by longer content). Predicates union
/// with the survivor winning on conflicting keys; confidence, priority,
/// and tags take the maximum/union. The caller is responsible for the
/// store-level bookkeeping (curation state, edges, redirection).
pub fn merged_behavior(surviving: &Behavior, loser: &Behavior) -> Behavior {
    let mut merged = surviving.clone();

    for (key, value) in &loser.when {
        merged
            .when
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    merged.confidence = surviving.confidence.max(loser.confidence);
    merged.priority = surviving.priority.max(loser.priority);
    merged
        .content
        .tags
        .extend(loser.content.tags.iter().cloned());

    let loser_wins = loser.confidence > surviving.confidence
        || (loser.confidence == surviving.confidence
            && loser.content.canonical.len() > surviving.content.canonical.len());
    if loser_wins {
        merged.content.canonical = loser.content.canonical.clone();
        if loser.content.summary.is_some() {
            merged.content.summary = loser.content.summary.clone();
        }
    }

    let merged_from = merged
        .metadata
        .entry("merged_from".to_string())
        .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    if let serde_json::Value::Array(list) = merged_from {
        list.push(serde_json::Value::String(loser.id.clone()));
    }

    merged.stats.updated_at = chrono::Utc::now();
    merged
}
