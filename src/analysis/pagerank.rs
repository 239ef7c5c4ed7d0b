//! Weighted PageRank over the behavior graph.
//!
//! Used to size nodes in the visualizer and as one factor in relevance
//! ranking. Outgoing edge weights are normalized per source; dangling
//! mass is redistributed uniformly so the scores stay a distribution.

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::graph::types::PAGERANK_METADATA_KEY;
use std::collections::HashMap;

/// Parameters for a PageRank run.
#[derive(Debug, Clone, Copy)]
pub struct PageRankParams {
    pub damping: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl Default for PageRankParams {
    fn default() -> Self {
        Self {
            damping: 0.85,
            epsilon: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Compute weighted PageRank for a set of nodes and edges.
///
/// `edges` are `(source, target, weight)` triples; endpoints not present
/// in `node_ids` are ignored. Returns a score per node summing to 1.0
/// (for a non-empty graph).
pub fn pagerank(
    node_ids: &[String],
    edges: &[(String, String, f64)],
    params: PageRankParams,
) -> HashMap<String, f64> {
    let n = node_ids.len();
    if n == 0 {
        return HashMap::new();
    }

    let index: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    // Per-source normalized out-edges
    let mut out_edges: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut out_weight: Vec<f64> = vec![0.0; n];
    for (source, target, weight) in edges {
        if let (Some(&s), Some(&t)) = (index.get(source.as_str()), index.get(target.as_str())) {
            if *weight > 0.0 && s != t {
                out_edges[s].push((t, *weight));
                out_weight[s] += *weight;
            }
        }
    }

    let uniform = 1.0 / n as f64;
    let mut rank = vec![uniform; n];

    for _ in 0..params.max_iterations {
        let mut next = vec![(1.0 - params.damping) * uniform; n];

        let mut dangling_mass = 0.0;
        for s in 0..n {
            if out_weight[s] == 0.0 {
                dangling_mass += rank[s];
                continue;
            }
            for &(t, w) in &out_edges[s] {
                next[t] += params.damping * rank[s] * w / out_weight[s];
            }
        }

        // Dangling nodes spread their rank uniformly
        let dangling_share = params.damping * dangling_mass * uniform;
        for value in next.iter_mut() {
            *value += dangling_share;
        }

        let max_delta = rank
            .iter()
            .zip(next.iter())
            .map(|(old, new)| (old - new).abs())
            .fold(0.0_f64, f64::max);

        rank = next;
        if max_delta < params.epsilon {
            break;
        }
    }

    node_ids
        .iter()
        .zip(rank.into_iter())
        .map(|(id, score)| (id.clone(), score))
        .collect()
}

/// Recompute PageRank over a store and persist the scores into node
/// metadata under the `pagerank` key.
pub fn recompute_and_store(store: &dyn GraphStore, params: PageRankParams) -> Result<HashMap<String, f64>> {
    let behaviors = store.query_nodes(&Default::default())?;
    let node_ids: Vec<String> = behaviors.iter().map(|b| b.id.clone()).collect();
    let edges: Vec<(String, String, f64)> = store
        .all_edges()?
        .into_iter()
        .map(|e| (e.source, e.target, e.weight))
        .collect();

    let scores = pagerank(&node_ids, &edges, params);

    for mut behavior in behaviors {
        let Some(score) = scores.get(&behavior.id) else {
            continue;
        };
        let rounded = serde_json::json!(score);
        if behavior.metadata.get(PAGERANK_METADATA_KEY) != Some(&rounded) {
            behavior
                .metadata
                .insert(PAGERANK_METADATA_KEY.to_string(), rounded);
            store.update_node(&behavior)?;
        }
    }

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::MemoryGraphStore;
    use crate::graph::types::{Behavior, BehaviorKind, Edge, EdgeKind};

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_graph() {
        assert!(pagerank(&[], &[], PageRankParams::default()).is_empty());
    }

    #[test]
    fn test_isolated_nodes_share_rank() {
        let scores = pagerank(&ids(&["a", "b"]), &[], PageRankParams::default());
        assert!((scores["a"] - 0.5).abs() < 1e-6);
        assert!((scores["b"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sink_accumulates_rank() {
        // a -> c, b -> c: c should outrank its sources
        let edges = vec![
            ("a".to_string(), "c".to_string(), 1.0),
            ("b".to_string(), "c".to_string(), 1.0),
        ];
        let scores = pagerank(&ids(&["a", "b", "c"]), &edges, PageRankParams::default());
        assert!(scores["c"] > scores["a"]);
        assert!(scores["c"] > scores["b"]);
    }

    #[test]
    fn test_scores_sum_to_one() {
        let edges = vec![
            ("a".to_string(), "b".to_string(), 0.5),
            ("b".to_string(), "c".to_string(), 0.9),
            ("c".to_string(), "a".to_string(), 0.3),
        ];
        let scores = pagerank(&ids(&["a", "b", "c"]), &edges, PageRankParams::default());
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_weight_biases_flow() {
        // a splits: heavy edge to b, light edge to c
        let edges = vec![
            ("a".to_string(), "b".to_string(), 0.9),
            ("a".to_string(), "c".to_string(), 0.1),
        ];
        let scores = pagerank(&ids(&["a", "b", "c"]), &edges, PageRankParams::default());
        assert!(scores["b"] > scores["c"]);
    }

    #[test]
    fn test_unknown_endpoints_ignored() {
        let edges = vec![("a".to_string(), "ghost".to_string(), 1.0)];
        let scores = pagerank(&ids(&["a", "b"]), &edges, PageRankParams::default());
        assert!((scores["a"] - scores["b"]).abs() < 1e-9);
    }

    #[test]
    fn test_recompute_persists_scores() {
        let store = MemoryGraphStore::new();
        let a = Behavior::new(BehaviorKind::Directive, "a", "content a").with_id("a");
        let b = Behavior::new(BehaviorKind::Directive, "b", "content b").with_id("b");
        store.add_node(&a).unwrap();
        store.add_node(&b).unwrap();
        store
            .add_edge(&Edge::new("a", "b", EdgeKind::SimilarTo).with_weight(0.8))
            .unwrap();

        recompute_and_store(&store, PageRankParams::default()).unwrap();

        let stored = store.get_node("b").unwrap().unwrap();
        assert!(stored.pagerank().unwrap() > 0.0);
    }
}
