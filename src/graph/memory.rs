//! In-memory graph store.
//!
//! Identical semantics to the SQLite store, backed by hash maps behind a
//! read-write lock. Tests use it for speed; embedders can use it for
//! ephemeral scopes.

use crate::error::{Error, Result};
use crate::graph::store::GraphStore;
use crate::graph::types::{Behavior, BehaviorQuery, Direction, Edge, EdgeKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Behavior>,
    /// Keyed by (source, target, kind) to mirror the SQL uniqueness rule.
    edges: HashMap<(String, String, EdgeKind), Edge>,
}

/// Hash-map-backed graph store.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
    closed: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::storage("store is closed"));
        }
        let inner = self
            .inner
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        Ok(f(&inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::storage("store is closed"));
        }
        let mut inner = self
            .inner
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        f(&mut inner)
    }
}

impl GraphStore for MemoryGraphStore {
    fn add_node(&self, behavior: &Behavior) -> Result<()> {
        let mut behavior = behavior.clone();
        behavior.validate()?;

        self.write(|inner| {
            if inner.nodes.contains_key(&behavior.id) {
                return Err(Error::state_violation(format!(
                    "behavior '{}' already exists",
                    behavior.id
                )));
            }
            inner.nodes.insert(behavior.id.clone(), behavior);
            Ok(())
        })
    }

    fn update_node(&self, behavior: &Behavior) -> Result<()> {
        let mut behavior = behavior.clone();
        behavior.validate()?;

        self.write(|inner| {
            if !inner.nodes.contains_key(&behavior.id) {
                return Err(Error::not_found("behavior", behavior.id.clone()));
            }
            inner.nodes.insert(behavior.id.clone(), behavior);
            Ok(())
        })
    }

    fn delete_node(&self, id: &str) -> Result<bool> {
        self.write(|inner| {
            let existed = inner.nodes.remove(id).is_some();
            inner
                .edges
                .retain(|(source, target, _), _| source != id && target != id);
            Ok(existed)
        })
    }

    fn get_node(&self, id: &str) -> Result<Option<Behavior>> {
        self.read(|inner| inner.nodes.get(id).cloned())
    }

    fn query_nodes(&self, query: &BehaviorQuery) -> Result<Vec<Behavior>> {
        self.read(|inner| {
            let mut matched: Vec<Behavior> = inner
                .nodes
                .values()
                .filter(|b| query.matches(b))
                .cloned()
                .collect();
            matched.sort_by(|a, b| a.id.cmp(&b.id));
            if let Some(limit) = query.limit {
                matched.truncate(limit);
            }
            matched
        })
    }

    fn add_edge(&self, edge: &Edge) -> Result<()> {
        edge.validate()?;

        self.write(|inner| {
            let key = (edge.source.clone(), edge.target.clone(), edge.kind);
            match inner.edges.get_mut(&key) {
                // Duplicate triple replaces the weight, keeps created_at
                Some(existing) => existing.weight = edge.weight,
                None => {
                    inner.edges.insert(key, edge.clone());
                }
            }
            Ok(())
        })
    }

    fn remove_edge(&self, source: &str, target: &str, kind: EdgeKind) -> Result<bool> {
        self.write(|inner| {
            Ok(inner
                .edges
                .remove(&(source.to_string(), target.to_string(), kind))
                .is_some())
        })
    }

    fn get_edges(
        &self,
        id: &str,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>> {
        self.read(|inner| {
            let mut edges: Vec<Edge> = inner
                .edges
                .values()
                .filter(|e| match direction {
                    Direction::Out => e.source == id,
                    Direction::In => e.target == id,
                    Direction::Both => e.source == id || e.target == id,
                })
                .filter(|e| kind.map_or(true, |k| e.kind == k))
                .cloned()
                .collect();
            edges.sort_by(|a, b| {
                (&a.source, &a.target, a.kind.as_str()).cmp(&(&b.source, &b.target, b.kind.as_str()))
            });
            edges
        })
    }

    fn all_edges(&self) -> Result<Vec<Edge>> {
        self.read(|inner| {
            let mut edges: Vec<Edge> = inner.edges.values().cloned().collect();
            edges.sort_by(|a, b| {
                (&a.source, &a.target, a.kind.as_str()).cmp(&(&b.source, &b.target, b.kind.as_str()))
            });
            edges
        })
    }

    fn count_nodes(&self) -> Result<u64> {
        self.read(|inner| inner.nodes.len() as u64)
    }

    fn count_edges(&self) -> Result<u64> {
        self.read(|inner| inner.edges.len() as u64)
    }

    fn clear(&self) -> Result<()> {
        self.write(|inner| {
            inner.nodes.clear();
            inner.edges.clear();
            Ok(())
        })
    }

    fn sync(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::storage("store is closed"));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
