//! Graph validation sweep.
//!
//! Validation never fails hard on bad data: every problem becomes a typed
//! finding in the report and the sweep keeps going.

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::graph::types::{Behavior, EdgeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum ValidationFinding {
    /// A relation set names an id with no node.
    DanglingReference {
        behavior_id: String,
        field: String,
        target: String,
    },
    /// A relation set names the behavior itself.
    SelfReference { behavior_id: String, field: String },
    /// A cycle through `requires` or `overrides`.
    Cycle { relation: String, path: Vec<String> },
    /// An edge whose weight is outside (0, 1].
    BadEdgeWeight {
        source: String,
        target: String,
        kind: EdgeKind,
        weight: f64,
    },
    /// An edge endpoint with no node.
    OrphanEdge {
        source: String,
        target: String,
        kind: EdgeKind,
        missing: String,
    },
    /// A curation-state behavior without its transition record.
    MissingCurationRecord { behavior_id: String },
}

/// Result of a validation sweep over one store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<ValidationFinding>,
    pub nodes_checked: u64,
    pub edges_checked: u64,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Run the validation sweep over a store.
pub fn validate_store(store: &dyn GraphStore) -> Result<ValidationReport> {
    let behaviors = store.query_nodes(&Default::default())?;
    let edges = store.all_edges()?;

    let ids: BTreeSet<&str> = behaviors.iter().map(|b| b.id.as_str()).collect();
    let mut report = ValidationReport {
        nodes_checked: behaviors.len() as u64,
        edges_checked: edges.len() as u64,
        ..ValidationReport::default()
    };

    for behavior in &behaviors {
        check_relation_sets(behavior, &ids, &mut report);

        if behavior.kind.is_curation_state() && behavior.curation_record().is_none() {
            report.findings.push(ValidationFinding::MissingCurationRecord {
                behavior_id: behavior.id.clone(),
            });
        }
    }

    for edge in &edges {
        if !(edge.weight > 0.0 && edge.weight <= 1.0) {
            report.findings.push(ValidationFinding::BadEdgeWeight {
                source: edge.source.clone(),
                target: edge.target.clone(),
                kind: edge.kind,
                weight: edge.weight,
            });
        }
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                report.findings.push(ValidationFinding::OrphanEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    kind: edge.kind,
                    missing: endpoint.clone(),
                });
            }
        }
    }

    for (relation, project) in [
        ("requires", (|b: &Behavior| &b.requires) as fn(&Behavior) -> &BTreeSet<String>),
        ("overrides", |b: &Behavior| &b.overrides),
    ] {
        for cycle in find_cycles(&behaviors, project) {
            report.findings.push(ValidationFinding::Cycle {
                relation: relation.to_string(),
                path: cycle,
            });
        }
    }

    Ok(report)
}

fn check_relation_sets(
    behavior: &Behavior,
    ids: &BTreeSet<&str>,
    report: &mut ValidationReport,
) {
    let sets = [
        ("requires", &behavior.requires),
        ("overrides", &behavior.overrides),
        ("conflicts", &behavior.conflicts),
    ];
    for (field, set) in sets {
        for target in set {
            if target == &behavior.id {
                report.findings.push(ValidationFinding::SelfReference {
                    behavior_id: behavior.id.clone(),
                    field: field.to_string(),
                });
            } else if !ids.contains(target.as_str()) {
                report.findings.push(ValidationFinding::DanglingReference {
                    behavior_id: behavior.id.clone(),
                    field: field.to_string(),
                    target: target.clone(),
                });
            }
        }
    }
}

/// Find elementary cycles over one relation with iterative DFS.
///
/// Each cycle is reported once, anchored at its lexicographically
/// smallest member.
fn find_cycles(
    behaviors: &[Behavior],
    project: fn(&Behavior) -> &BTreeSet<String>,
) -> Vec<Vec<String>> {
    let adjacency: BTreeMap<&str, Vec<&str>> = behaviors
        .iter()
        .map(|b| {
            (
                b.id.as_str(),
                project(b).iter().map(String::as_str).collect::<Vec<_>>(),
            )
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&str, Color> =
        adjacency.keys().map(|id| (*id, Color::White)).collect();
    let mut cycles: BTreeSet<Vec<String>> = BTreeSet::new();

    for &start in adjacency.keys() {
        if color[start] != Color::White {
            continue;
        }
        // Stack entries are (node, next-neighbor index); path mirrors gray
        // nodes on the stack.
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        let mut path: Vec<&str> = vec![start];
        color.insert(start, Color::Gray);

        while let Some(&(node, idx)) = stack.last() {
            let neighbors = &adjacency[node];
            if idx < neighbors.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let next = neighbors[idx];
                match color.get(next).copied() {
                    Some(Color::White) => {
                        color.insert(next, Color::Gray);
                        stack.push((next, 0));
                        path.push(next);
                    }
                    Some(Color::Gray) => {
                        if let Some(pos) = path.iter().position(|&n| n == next) {
                            cycles.insert(canonical_cycle(&path[pos..]));
                        }
                    }
                    // Black or missing (dangling target): no cycle here
                    _ => {}
                }
            } else {
                color.insert(node, Color::Black);
                stack.pop();
                path.pop();
            }
        }
    }

    cycles.into_iter().collect()
}

/// Rotate a cycle so its smallest member comes first.
fn canonical_cycle(path: &[&str]) -> Vec<String> {
    let min_pos = path
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(i, _)| i)
        .unwrap_or(0);
    path[min_pos..]
        .iter()
        .chain(path[..min_pos].iter())
        .map(|s| s.to_string())
        .collect()
}
