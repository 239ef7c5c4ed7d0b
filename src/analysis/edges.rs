//! Derivation of `similar-to` and `overrides` edges.
//!
//! An all-pairs scan over active behaviors:
//!
//! - `overrides(A → B)` whenever A's predicate is a proper superset of
//!   B's.
//! - `similar-to(A ↔ B)` when the lexical score falls in the configured
//!   band, or when the two behaviors share enough tags (tag co-occurrence
//!   is a conceptual signal the score alone can miss).
//!
//! Existing edges are left untouched; `clear` wipes previously derived
//! edges first. PageRank is recomputed after a non-dry run.

use crate::analysis::pagerank::{recompute_and_store, PageRankParams};
use crate::analysis::similarity::{is_more_specific, shared_tag_count, similarity};
use crate::cancel::CancellationFlag;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::graph::types::{Behavior, BehaviorQuery, Edge, EdgeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Options for an edge-derivation run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EdgeDeriveOptions {
    /// Remove all `similar-to` and `overrides` edges before deriving.
    pub clear: bool,
    /// Report without writing.
    pub dry_run: bool,
}

/// Outcome of an edge-derivation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeDerivationReport {
    /// Newly derived `overrides` pairs (source, target).
    pub overrides_added: Vec<(String, String)>,
    /// Newly derived `similar-to` pairs (source, target, weight).
    pub similar_added: Vec<(String, String, f64)>,
    pub edges_cleared: u64,
    pub pairs_scanned: u64,
}

/// Run the all-pairs derivation over one scope's store.
pub fn derive_edges(
    store: &dyn GraphStore,
    config: &EngineConfig,
    options: EdgeDeriveOptions,
    cancel: &CancellationFlag,
) -> Result<EdgeDerivationReport> {
    let mut report = EdgeDerivationReport::default();

    if options.clear && !options.dry_run {
        report.edges_cleared = clear_derived_edges(store)?;
    }

    let behaviors: Vec<Behavior> = store
        .query_nodes(&BehaviorQuery::new().active_only())?;

    let existing: HashSet<(String, String, EdgeKind)> = store
        .all_edges()?
        .into_iter()
        .map(|e| (e.source, e.target, e.kind))
        .collect();

    for i in 0..behaviors.len() {
        cancel.check()?;
        for j in (i + 1)..behaviors.len() {
            let a = &behaviors[i];
            let b = &behaviors[j];
            report.pairs_scanned += 1;

            derive_overrides(store, a, b, &existing, options.dry_run, &mut report)?;
            derive_overrides(store, b, a, &existing, options.dry_run, &mut report)?;
            derive_similar(store, a, b, config, &existing, options.dry_run, &mut report)?;
        }
    }

    if !options.dry_run {
        recompute_and_store(
            store,
            PageRankParams {
                damping: config.pagerank_damping,
                epsilon: config.pagerank_epsilon,
                max_iterations: config.pagerank_max_iterations,
            },
        )?;
    }

    info!(
        pairs = report.pairs_scanned,
        overrides = report.overrides_added.len(),
        similar = report.similar_added.len(),
        dry_run = options.dry_run,
        "edge derivation finished"
    );
    Ok(report)
}

fn derive_overrides(
    store: &dyn GraphStore,
    a: &Behavior,
    b: &Behavior,
    existing: &HashSet<(String, String, EdgeKind)>,
    dry_run: bool,
    report: &mut EdgeDerivationReport,
) -> Result<()> {
    if !is_more_specific(&a.when, &b.when) {
        return Ok(());
    }
    if existing.contains(&(a.id.clone(), b.id.clone(), EdgeKind::Overrides)) {
        return Ok(());
    }

    debug!(source = %a.id, target = %b.id, "derived overrides edge");
    if !dry_run {
        store.add_edge(&Edge::new(&a.id, &b.id, EdgeKind::Overrides))?;

        // Keep the node's mirror set in step with the edge. Re-fetch so
        // earlier insertions in this scan are not lost.
        if let Some(mut updated) = store.get_node(&a.id)? {
            if updated.overrides.insert(b.id.clone()) {
                store.update_node(&updated)?;
            }
        }
    }
    report.overrides_added.push((a.id.clone(), b.id.clone()));
    Ok(())
}

fn derive_similar(
    store: &dyn GraphStore,
    a: &Behavior,
    b: &Behavior,
    config: &EngineConfig,
    existing: &HashSet<(String, String, EdgeKind)>,
    dry_run: bool,
    report: &mut EdgeDerivationReport,
) -> Result<()> {
    // Overriding pairs are specificity-related, not similar
    if is_more_specific(&a.when, &b.when) || is_more_specific(&b.when, &a.when) {
        return Ok(());
    }

    let score = similarity(a, b).score;
    let in_band = score >= config.similar_floor && score < config.similar_ceiling;
    let tag_linked = shared_tag_count(a, b) >= config.shared_tag_link_count;
    if !in_band && !tag_linked {
        return Ok(());
    }

    let weight = if in_band {
        score
    } else {
        score.max(config.similar_floor)
    };

    for (source, target) in [(a, b), (b, a)] {
        if existing.contains(&(source.id.clone(), target.id.clone(), EdgeKind::SimilarTo)) {
            continue;
        }
        if !dry_run {
            store.add_edge(
                &Edge::new(&source.id, &target.id, EdgeKind::SimilarTo).with_weight(weight),
            )?;
        }
        report
            .similar_added
            .push((source.id.clone(), target.id.clone(), weight));
    }
    Ok(())
}

/// Remove every previously derived edge kind from the store.
fn clear_derived_edges(store: &dyn GraphStore) -> Result<u64> {
    let mut cleared = 0;
    for edge in store.all_edges()? {
        if matches!(edge.kind, EdgeKind::SimilarTo | EdgeKind::Overrides) {
            if store.remove_edge(&edge.source, &edge.target, edge.kind)? {
                cleared += 1;
            }
        }
    }
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::MemoryGraphStore;
    use crate::graph::types::BehaviorKind;

    fn store_with(behaviors: &[Behavior]) -> MemoryGraphStore {
        let store = MemoryGraphStore::new();
        for b in behaviors {
            store.add_node(b).unwrap();
        }
        store
    }

    fn directive(id: &str, canonical: &str) -> Behavior {
        Behavior::new(BehaviorKind::Directive, id, canonical).with_id(id)
    }

    #[test]
    fn test_specificity_derives_overrides() {
        let general = directive("general", "prefer table driven tests").with_when("language", "go");
        let specific = directive("specific", "use table driven subtests")
            .with_when("language", "go")
            .with_when("task", "testing");
        let store = store_with(&[general, specific]);

        let report = derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions::default(),
            &CancellationFlag::new(),
        )
        .unwrap();

        assert_eq!(
            report.overrides_added,
            vec![("specific".to_string(), "general".to_string())]
        );
        // No similar-to between a specificity-related pair
        assert!(report.similar_added.is_empty());

        // Mirror set updated on the node
        let specific = store.get_node("specific").unwrap().unwrap();
        assert!(specific.overrides.contains("general"));
    }

    #[test]
    fn test_shared_tags_derive_similar() {
        let a = directive("a", "checkout a linked copy for reviews")
            .with_tag("git")
            .with_tag("worktree");
        let b = directive("b", "never delete trees that hold local changes")
            .with_tag("git")
            .with_tag("worktree");
        let store = store_with(&[a, b]);

        let report = derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions::default(),
            &CancellationFlag::new(),
        )
        .unwrap();

        // Both directions
        assert_eq!(report.similar_added.len(), 2);
        let edges = store.get_edges("a", crate::graph::types::Direction::Out, None).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].weight >= 0.5);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let a = directive("a", "run cargo fmt before committing").with_tag("git").with_tag("formatting");
        let b = directive("b", "format the diff before any commit").with_tag("git").with_tag("formatting");
        let store = store_with(&[a, b]);

        let report = derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions {
                dry_run: true,
                ..Default::default()
            },
            &CancellationFlag::new(),
        )
        .unwrap();

        assert!(!report.similar_added.is_empty());
        assert_eq!(store.count_edges().unwrap(), 0);
    }

    #[test]
    fn test_existing_edges_not_duplicated() {
        let a = directive("a", "pin dependency versions").with_tag("build").with_tag("config");
        let b = directive("b", "lock dependency versions in ci").with_tag("build").with_tag("config");
        let store = store_with(&[a, b]);

        let options = EdgeDeriveOptions::default();
        let first = derive_edges(&store, &EngineConfig::default(), options, &CancellationFlag::new()).unwrap();
        let second = derive_edges(&store, &EngineConfig::default(), options, &CancellationFlag::new()).unwrap();

        assert!(!first.similar_added.is_empty());
        assert!(second.similar_added.is_empty());
    }

    #[test]
    fn test_clear_removes_derived_kinds() {
        let a = directive("a", "shared tag one").with_tag("git").with_tag("testing");
        let b = directive("b", "shared tag two").with_tag("git").with_tag("testing");
        let store = store_with(&[a, b]);

        derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions::default(),
            &CancellationFlag::new(),
        )
        .unwrap();
        assert!(store.count_edges().unwrap() > 0);

        let report = derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions {
                clear: true,
                ..Default::default()
            },
            &CancellationFlag::new(),
        )
        .unwrap();
        assert!(report.edges_cleared > 0);
    }

    #[test]
    fn test_cancellation_stops_scan() {
        let a = directive("a", "one");
        let b = directive("b", "two");
        let store = store_with(&[a, b]);

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result = derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions::default(),
            &cancel,
        );
        assert!(matches!(result, Err(crate::error::Error::Cancelled)));
    }

    #[test]
    fn test_curation_states_excluded() {
        use crate::graph::types::CurationRecord;
        let mut forgotten = directive("f", "forgotten content").with_tag("git").with_tag("testing");
        forgotten.kind = BehaviorKind::Forgotten;
        forgotten
            .set_curation_record(&CurationRecord::Forgotten {
                original_kind: BehaviorKind::Directive,
                reason: None,
                at: chrono::Utc::now(),
                actor: None,
            })
            .unwrap();
        let active = directive("x", "active content").with_tag("git").with_tag("testing");
        let store = store_with(&[forgotten, active]);

        let report = derive_edges(
            &store,
            &EngineConfig::default(),
            EdgeDeriveOptions::default(),
            &CancellationFlag::new(),
        )
        .unwrap();
        assert!(report.similar_added.is_empty());
        assert_eq!(report.pairs_scanned, 0);
    }
}
