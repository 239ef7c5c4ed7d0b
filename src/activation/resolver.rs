//! Conflict resolution over the matched set.
//!
//! After predicate evaluation, `overrides` and `conflicts` relations
//! narrow the matched set: overridden behaviors are demoted (still
//! reported, marked with who overrode them), conflicting pairs keep only
//! the stronger member.

use crate::graph::types::Behavior;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A behavior demoted because a more specific match overrides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverriddenEntry {
    pub behavior: Behavior,
    pub overridden_by: String,
}

/// A behavior dropped because it lost a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedEntry {
    pub behavior: Behavior,
    pub excluded_by: String,
}

/// The matched set partitioned by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedActivation {
    pub active: Vec<Behavior>,
    pub overridden: Vec<OverriddenEntry>,
    pub excluded: Vec<ExcludedEntry>,
}

/// Rank two behaviors for conflict resolution: confidence descending,
/// then priority descending, then id ascending.
fn conflict_order(a: &Behavior, b: &Behavior) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.id.cmp(&b.id))
}

/// Partition the matched set into Active, Overridden, and Excluded.
///
/// `overrides` and `conflicts` are read from the behaviors' mirror sets;
/// only pairs where both sides matched participate. Overriding does not
/// imply conflict: an overridden behavior is demoted, not excluded.
pub fn resolve(matched: Vec<Behavior>) -> ResolvedActivation {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Active,
        Overridden,
        Excluded,
    }

    let ids: Vec<String> = matched.iter().map(|b| b.id.clone()).collect();
    let index: BTreeMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut state = vec![State::Active; matched.len()];
    let mut demoted_by: Vec<Option<String>> = vec![None; matched.len()];

    // Overrides pass: B demotes whenever some matched A overrides it.
    for (i, behavior) in matched.iter().enumerate() {
        for target in &behavior.overrides {
            if let Some(&j) = index.get(target.as_str()) {
                if j != i && state[j] == State::Active {
                    state[j] = State::Overridden;
                    demoted_by[j] = Some(matched[i].id.clone());
                }
            }
        }
    }

    // Conflicts pass: for each matched pair, keep the stronger member.
    for i in 0..matched.len() {
        for target in matched[i].conflicts.clone() {
            let Some(&j) = index.get(target.as_str()) else {
                continue;
            };
            if j == i {
                continue;
            }
            let (winner, loser) = match conflict_order(&matched[i], &matched[j]) {
                Ordering::Less | Ordering::Equal => (i, j),
                Ordering::Greater => (j, i),
            };
            if state[loser] == State::Active {
                state[loser] = State::Excluded;
                demoted_by[loser] = Some(matched[winner].id.clone());
            }
        }
    }

    let mut resolved = ResolvedActivation::default();
    for (i, behavior) in matched.into_iter().enumerate() {
        match state[i] {
            State::Active => resolved.active.push(behavior),
            State::Overridden => resolved.overridden.push(OverriddenEntry {
                behavior,
                overridden_by: demoted_by[i].clone().unwrap_or_default(),
            }),
            State::Excluded => resolved.excluded.push(ExcludedEntry {
                behavior,
                excluded_by: demoted_by[i].clone().unwrap_or_default(),
            }),
        }
    }
    resolved
}
