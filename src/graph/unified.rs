//! Unified view over the local and global stores.
//!
//! Reads are a union of both peers, deduplicated by id with the local
//! peer winning; every result is tagged with its origin. Writes are
//! routed by an explicit [`Scope`]. Cross-scope operations always touch
//! the local peer before the global one so lock acquisition has a fixed
//! order.

use crate::error::{Error, Result};
use crate::graph::store::GraphStore;
use crate::graph::types::{
    Behavior, BehaviorQuery, Direction, Edge, EdgeKind, Scope, ScopedBehavior,
};
use std::collections::HashSet;

/// Composition of a global store and an optional project-local store.
pub struct UnifiedStore {
    local: Option<Box<dyn GraphStore>>,
    global: Box<dyn GraphStore>,
}

impl UnifiedStore {
    /// Create a unified store over both peers.
    pub fn new(local: Option<Box<dyn GraphStore>>, global: Box<dyn GraphStore>) -> Self {
        Self { local, global }
    }

    /// Create a unified store with only a global peer.
    pub fn global_only(global: Box<dyn GraphStore>) -> Self {
        Self {
            local: None,
            global,
        }
    }

    /// Whether a local peer is attached.
    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    /// The store backing a scope.
    pub fn scope(&self, scope: Scope) -> Result<&dyn GraphStore> {
        match scope {
            Scope::Global => Ok(self.global.as_ref()),
            Scope::Local => self
                .local
                .as_deref()
                .ok_or_else(|| Error::state_violation("no local scope is attached")),
        }
    }

    /// Peers in fixed lock order: local first, then global.
    fn peers(&self) -> Vec<(Scope, &dyn GraphStore)> {
        let mut peers = Vec::with_capacity(2);
        if let Some(local) = self.local.as_deref() {
            peers.push((Scope::Local, local));
        }
        peers.push((Scope::Global, self.global.as_ref()));
        peers
    }

    // ==================== Routed writes ====================

    pub fn add_node(&self, scope: Scope, behavior: &Behavior) -> Result<()> {
        self.scope(scope)?.add_node(behavior)
    }

    pub fn update_node(&self, scope: Scope, behavior: &Behavior) -> Result<()> {
        self.scope(scope)?.update_node(behavior)
    }

    pub fn delete_node(&self, scope: Scope, id: &str) -> Result<bool> {
        self.scope(scope)?.delete_node(id)
    }

    pub fn add_edge(&self, scope: Scope, edge: &Edge) -> Result<()> {
        self.scope(scope)?.add_edge(edge)
    }

    pub fn remove_edge(
        &self,
        scope: Scope,
        source: &str,
        target: &str,
        kind: EdgeKind,
    ) -> Result<bool> {
        self.scope(scope)?.remove_edge(source, target, kind)
    }

    /// Update a node wherever it lives, local peer first.
    pub fn update_node_anywhere(&self, behavior: &Behavior) -> Result<Scope> {
        for (scope, store) in self.peers() {
            if store.get_node(&behavior.id)?.is_some() {
                store.update_node(behavior)?;
                return Ok(scope);
            }
        }
        Err(Error::not_found("behavior", behavior.id.clone()))
    }

    // ==================== Union reads ====================

    /// Fetch a node from either peer; local wins.
    pub fn get_node(&self, id: &str) -> Result<Option<ScopedBehavior>> {
        for (scope, store) in self.peers() {
            if let Some(behavior) = store.get_node(id)? {
                return Ok(Some(ScopedBehavior {
                    behavior,
                    origin: scope,
                }));
            }
        }
        Ok(None)
    }

    /// Fetch the scope a node lives in, local first.
    pub fn locate(&self, id: &str) -> Result<Option<Scope>> {
        for (scope, store) in self.peers() {
            if store.get_node(id)?.is_some() {
                return Ok(Some(scope));
            }
        }
        Ok(None)
    }

    /// Union query, deduplicated by id with local winning.
    pub fn query_nodes(&self, query: &BehaviorQuery) -> Result<Vec<ScopedBehavior>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::new();

        for (scope, store) in self.peers() {
            for behavior in store.query_nodes(query)? {
                if seen.insert(behavior.id.clone()) {
                    results.push(ScopedBehavior {
                        behavior,
                        origin: scope,
                    });
                }
            }
        }

        results.sort_by(|a, b| a.behavior.id.cmp(&b.behavior.id));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    /// Union of edges touching a node across both peers, deduplicated by
    /// `(source, target, kind)` with local winning.
    pub fn get_edges(
        &self,
        id: &str,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>> {
        let mut seen: HashSet<(String, String, EdgeKind)> = HashSet::new();
        let mut results = Vec::new();

        for (_, store) in self.peers() {
            for edge in store.get_edges(id, direction, kind)? {
                if seen.insert((edge.source.clone(), edge.target.clone(), edge.kind)) {
                    results.push(edge);
                }
            }
        }
        Ok(results)
    }

    /// Durably commit both peers, local first.
    pub fn sync(&self) -> Result<()> {
        for (_, store) in self.peers() {
            store.sync()?;
        }
        Ok(())
    }

    /// Close both peers. Idempotent.
    pub fn close(&self) -> Result<()> {
        for (_, store) in self.peers() {
            store.close()?;
        }
        Ok(())
    }
}
