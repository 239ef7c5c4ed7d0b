//! Spreading activation over the behavior graph.
//!
//! Directly matching behaviors seed the process; activation then spreads
//! outward across `similar-to`, `requires`, `overrides`, and
//! `learned-from` edges with per-depth decay, surfacing behaviors that
//! are only indirectly relevant to the current context.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::graph::types::{Behavior, Direction, Edge};
use crate::graph::unified::UnifiedStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Anything spreading activation can pull outgoing edges from.
pub trait EdgeSource {
    fn outgoing(&self, id: &str) -> Result<Vec<Edge>>;
}

impl<T: GraphStore + ?Sized> EdgeSource for T {
    fn outgoing(&self, id: &str) -> Result<Vec<Edge>> {
        self.get_edges(id, Direction::Out, None)
    }
}

impl EdgeSource for UnifiedStore {
    fn outgoing(&self, id: &str) -> Result<Vec<Edge>> {
        self.get_edges(id, Direction::Out, None)
    }
}

/// One entry of a spreading-activation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadResult {
    pub behavior_id: String,
    /// Accumulated activation in [0, 1].
    pub activation: f64,
    /// Depth at which the node was first reached (0 for seeds).
    pub path_len: usize,
    pub seeded: bool,
}

/// Initial activation for a seed behavior.
///
/// Confidence scaled by the priority factor and boosted by the node's
/// persisted PageRank, clamped into [0, 1].
pub fn seed_activation(behavior: &Behavior) -> f64 {
    let boost = 1.0 + behavior.pagerank().unwrap_or(0.0);
    (behavior.confidence * behavior.priority_factor() * boost).clamp(0.0, 1.0)
}

/// Run spreading activation from a set of seed behaviors.
///
/// Each node is expanded at most once; its activation accumulates from
/// every contribution but never drops below what it was already
/// assigned. Results under `min_activation` are dropped; the rest sort
/// by activation descending with id as a deterministic tiebreak.
pub fn spread<S: EdgeSource + ?Sized>(
    source: &S,
    seeds: &[Behavior],
    config: &EngineConfig,
) -> Result<Vec<SpreadResult>> {
    let mut activation: HashMap<String, f64> = HashMap::new();
    let mut path_len: HashMap<String, usize> = HashMap::new();
    let seed_ids: HashSet<String> = seeds.iter().map(|b| b.id.clone()).collect();

    for seed in seeds {
        let value = seed_activation(seed);
        let entry = activation.entry(seed.id.clone()).or_insert(0.0);
        *entry = entry.max(value);
        path_len.insert(seed.id.clone(), 0);
    }

    let mut frontier: Vec<String> = seeds.iter().map(|b| b.id.clone()).collect();
    let mut expanded: HashSet<String> = HashSet::new();

    for depth in 1..=config.spread_depth {
        if frontier.is_empty() {
            break;
        }
        let decay = config.spread_decay.powi(depth as i32);
        let mut next_frontier: Vec<String> = Vec::new();

        for node in frontier {
            if !expanded.insert(node.clone()) {
                continue;
            }
            let source_activation = activation.get(&node).copied().unwrap_or(0.0);
            if source_activation <= 0.0 {
                continue;
            }

            for edge in source.outgoing(&node)? {
                if !edge.kind.propagates_activation() {
                    continue;
                }
                let delta = source_activation * edge.weight * decay;
                if delta <= 0.0 {
                    continue;
                }

                let entry = activation.entry(edge.target.clone()).or_insert(0.0);
                *entry = (*entry + delta).min(1.0);

                if !path_len.contains_key(&edge.target) {
                    path_len.insert(edge.target.clone(), depth);
                    next_frontier.push(edge.target.clone());
                }
            }
        }

        frontier = next_frontier;
    }

    let mut results: Vec<SpreadResult> = activation
        .into_iter()
        .filter(|(_, value)| *value >= config.min_activation)
        .map(|(id, value)| SpreadResult {
            seeded: seed_ids.contains(&id),
            path_len: path_len.get(&id).copied().unwrap_or(0),
            behavior_id: id,
            activation: value,
        })
        .collect();

    results.sort_by(|a, b| {
        b.activation
            .partial_cmp(&a.activation)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.behavior_id.cmp(&b.behavior_id))
    });
    Ok(results)
}
