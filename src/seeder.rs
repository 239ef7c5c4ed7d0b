//! Seeding of built-in meta-behaviors.
//!
//! A fresh global store gets a small set of behaviors about using learned
//! behaviors. Ids are fixed, so re-seeding is a no-op and user edits to a
//! seeded behavior are never overwritten.

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::graph::types::{Behavior, BehaviorKind};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of a seeding pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

fn seed_behaviors() -> Vec<Behavior> {
    vec![
        Behavior::new(
            BehaviorKind::Directive,
            "follow-learned-corrections",
            "When a learned behavior applies to the current context, follow it \
             unless the user explicitly asks otherwise.",
        )
        .with_id("floop-seed-follow-corrections")
        .with_confidence(0.95)
        .with_priority(5)
        .with_source_type("seed"),
        Behavior::new(
            BehaviorKind::Preference,
            "prefer-project-conventions",
            "Prefer the project's established conventions over general best \
             practices when the two disagree.",
        )
        .with_id("floop-seed-project-conventions")
        .with_confidence(0.9)
        .with_priority(3)
        .with_source_type("seed"),
        Behavior::new(
            BehaviorKind::Directive,
            "surface-uncertainty",
            "When unsure whether a learned behavior still applies, say so \
             instead of silently ignoring it.",
        )
        .with_id("floop-seed-surface-uncertainty")
        .with_confidence(0.9)
        .with_priority(2)
        .with_source_type("seed"),
    ]
}

/// Install the meta-behaviors into a store. Existing ids are skipped.
pub fn seed(store: &dyn GraphStore) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for behavior in seed_behaviors() {
        if store.get_node(&behavior.id)?.is_some() {
            report.skipped.push(behavior.id);
            continue;
        }
        store.add_node(&behavior)?;
        report.installed.push(behavior.id);
    }

    if !report.installed.is_empty() {
        info!(count = report.installed.len(), "meta-behaviors seeded");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::MemoryGraphStore;

    #[test]
    fn test_seed_installs_once() {
        let store = MemoryGraphStore::new();

        let first = seed(&store).unwrap();
        assert_eq!(first.installed.len(), 3);
        assert!(first.skipped.is_empty());

        let second = seed(&store).unwrap();
        assert!(second.installed.is_empty());
        assert_eq!(second.skipped.len(), 3);
        assert_eq!(store.count_nodes().unwrap(), 3);
    }

    #[test]
    fn test_seed_preserves_user_edits() {
        let store = MemoryGraphStore::new();
        seed(&store).unwrap();

        let mut edited = store
            .get_node("floop-seed-follow-corrections")
            .unwrap()
            .unwrap();
        edited.confidence = 0.1;
        store.update_node(&edited).unwrap();

        seed(&store).unwrap();
        let after = store
            .get_node("floop-seed-follow-corrections")
            .unwrap()
            .unwrap();
        assert_eq!(after.confidence, 0.1);
    }

    #[test]
    fn test_seeds_are_unconditional_and_active() {
        let store = MemoryGraphStore::new();
        seed(&store).unwrap();

        for scoped in store.query_nodes(&Default::default()).unwrap() {
            assert!(scoped.kind.is_active());
            assert!(scoped.when.is_empty());
            assert_eq!(scoped.provenance.source_type, "seed");
        }
    }
}
