//! Curation operations: forget, deprecate, restore, merge.
//!
//! Lifecycle transitions over the behavior graph:
//!
//! ```text
//! Active ─┬─> Forgotten ──> Active   (restore)
//!         ├─> Deprecated ─> Active   (restore)
//!         └─> Merged                 (terminal)
//! ```
//!
//! Every transition stores a tagged [`CurationRecord`] carrying the
//! original kind, actor, timestamp, and reason. Transitions never touch
//! `confidence` or `stats`.

use crate::analysis::similarity::merged_behavior;
use crate::error::{Error, Result};
use crate::graph::store::GraphStore;
use crate::graph::types::{
    Behavior, BehaviorKind, CurationRecord, Direction, Edge, EdgeKind, Scope,
};
use crate::graph::unified::UnifiedStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of a curation transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationOutcome {
    pub behavior_id: String,
    pub from_kind: BehaviorKind,
    pub to_kind: BehaviorKind,
    pub scope: Scope,
}

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub surviving_id: String,
    pub merged_id: String,
    pub redirected_edges: u64,
    pub scope: Scope,
}

/// Curation operations over the unified store.
pub struct Curator<'a> {
    store: &'a UnifiedStore,
}

impl<'a> Curator<'a> {
    pub fn new(store: &'a UnifiedStore) -> Self {
        Self { store }
    }

    fn load_active(&self, id: &str) -> Result<(Behavior, Scope)> {
        let scoped = self
            .store
            .get_node(id)?
            .ok_or_else(|| Error::not_found("behavior", id))?;
        if !scoped.behavior.kind.is_active() {
            return Err(Error::state_violation(format!(
                "behavior '{}' is {}, not active",
                id, scoped.behavior.kind
            )));
        }
        Ok((scoped.behavior, scoped.origin))
    }

    /// Move an active behavior to the Forgotten state.
    pub fn forget(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: Option<&str>,
    ) -> Result<CurationOutcome> {
        let (mut behavior, scope) = self.load_active(id)?;
        let from_kind = behavior.kind;

        behavior.set_curation_record(&CurationRecord::Forgotten {
            original_kind: from_kind,
            reason: reason.map(str::to_string),
            at: Utc::now(),
            actor: actor.map(str::to_string),
        })?;
        behavior.kind = BehaviorKind::Forgotten;
        self.store.update_node(scope, &behavior)?;

        info!(behavior = id, %scope, "behavior forgotten");
        Ok(CurationOutcome {
            behavior_id: id.to_string(),
            from_kind,
            to_kind: BehaviorKind::Forgotten,
            scope,
        })
    }

    /// Move an active behavior to the Deprecated state. A reason is
    /// required; a replacement, if named, must exist and gets a
    /// `deprecated-to` edge.
    pub fn deprecate(
        &self,
        id: &str,
        reason: &str,
        replacement: Option<&str>,
        actor: Option<&str>,
    ) -> Result<CurationOutcome> {
        if reason.trim().is_empty() {
            return Err(Error::invalid_input("deprecation requires a reason"));
        }
        let (mut behavior, scope) = self.load_active(id)?;
        let from_kind = behavior.kind;

        if let Some(replacement_id) = replacement {
            if self.store.get_node(replacement_id)?.is_none() {
                return Err(Error::not_found("behavior", replacement_id));
            }
        }

        behavior.set_curation_record(&CurationRecord::Deprecated {
            original_kind: from_kind,
            reason: reason.trim().to_string(),
            replaced_by: replacement.map(str::to_string),
            at: Utc::now(),
            actor: actor.map(str::to_string),
        })?;
        behavior.kind = BehaviorKind::Deprecated;
        self.store.update_node(scope, &behavior)?;

        if let Some(replacement_id) = replacement {
            self.store
                .add_edge(scope, &Edge::new(id, replacement_id, EdgeKind::DeprecatedTo))?;
        }

        info!(behavior = id, %scope, "behavior deprecated");
        Ok(CurationOutcome {
            behavior_id: id.to_string(),
            from_kind,
            to_kind: BehaviorKind::Deprecated,
            scope,
        })
    }

    /// Restore a forgotten or deprecated behavior to its original kind.
    /// Merged behaviors are terminal.
    pub fn restore(&self, id: &str) -> Result<CurationOutcome> {
        let scoped = self
            .store
            .get_node(id)?
            .ok_or_else(|| Error::not_found("behavior", id))?;
        let mut behavior = scoped.behavior;
        let scope = scoped.origin;
        let from_kind = behavior.kind;

        let record = behavior.curation_record().ok_or_else(|| {
            Error::state_violation(format!("behavior '{}' has no curation record", id))
        })?;

        match (&behavior.kind, &record) {
            (BehaviorKind::Merged, _) | (_, CurationRecord::Merged { .. }) => {
                return Err(Error::state_violation(format!(
                    "behavior '{}' was merged; merges are not restorable",
                    id
                )));
            }
            (BehaviorKind::Forgotten, CurationRecord::Forgotten { .. })
            | (BehaviorKind::Deprecated, CurationRecord::Deprecated { .. }) => {}
            _ => {
                return Err(Error::state_violation(format!(
                    "behavior '{}' is {}, nothing to restore",
                    id, behavior.kind
                )));
            }
        }

        // Deprecation edges disappear with the state
        if let CurationRecord::Deprecated {
            replaced_by: Some(ref replacement_id),
            ..
        } = record
        {
            self.store
                .remove_edge(scope, id, replacement_id, EdgeKind::DeprecatedTo)?;
        }

        behavior.kind = record.original_kind();
        behavior.clear_curation_record();
        self.store.update_node(scope, &behavior)?;

        info!(behavior = id, %scope, "behavior restored");
        Ok(CurationOutcome {
            behavior_id: id.to_string(),
            from_kind,
            to_kind: behavior.kind,
            scope,
        })
    }

    /// Merge one active behavior into another in the same scope.
    ///
    /// The survivor absorbs the loser's predicate, tags, and strength;
    /// the loser becomes a terminal `merged-behavior` with a
    /// `merged-into` edge, and its other inbound edges are redirected to
    /// the survivor.
    pub fn merge(&self, surviving_id: &str, merged_id: &str) -> Result<MergeOutcome> {
        if surviving_id == merged_id {
            return Err(Error::state_violation("cannot merge a behavior into itself"));
        }
        let (survivor, survivor_scope) = self.load_active(surviving_id)?;
        let (mut loser, loser_scope) = self.load_active(merged_id)?;
        if survivor_scope != loser_scope {
            return Err(Error::state_violation(format!(
                "cannot merge across scopes ({} is {}, {} is {})",
                surviving_id, survivor_scope, merged_id, loser_scope
            )));
        }
        let scope = survivor_scope;

        let merged = merged_behavior(&survivor, &loser);
        self.store.update_node(scope, &merged)?;

        let from_kind = loser.kind;
        loser.set_curation_record(&CurationRecord::Merged {
            original_kind: from_kind,
            merged_into: surviving_id.to_string(),
            at: Utc::now(),
            actor: None,
        })?;
        loser.kind = BehaviorKind::Merged;
        self.store.update_node(scope, &loser)?;

        self.store
            .add_edge(scope, &Edge::new(merged_id, surviving_id, EdgeKind::MergedInto))?;

        let redirected = self.redirect_inbound(scope, merged_id, surviving_id)?;

        info!(
            survivor = surviving_id,
            merged = merged_id,
            redirected,
            %scope,
            "behaviors merged"
        );
        Ok(MergeOutcome {
            surviving_id: surviving_id.to_string(),
            merged_id: merged_id.to_string(),
            redirected_edges: redirected,
            scope,
        })
    }

    /// Point the loser's inbound edges at the survivor, dropping
    /// would-be self-edges and leaving the fresh `merged-into` edge in
    /// place.
    fn redirect_inbound(&self, scope: Scope, from: &str, to: &str) -> Result<u64> {
        let store = self.store.scope(scope)?;
        let mut redirected = 0;

        for edge in store.get_edges(from, Direction::In, None)? {
            if edge.kind == EdgeKind::MergedInto {
                continue;
            }
            store.remove_edge(&edge.source, &edge.target, edge.kind)?;
            if edge.source == to {
                debug!(source = %edge.source, kind = %edge.kind, "dropping would-be self-edge");
                continue;
            }
            let mut moved = edge.clone();
            moved.target = to.to_string();
            store.add_edge(&moved)?;
            redirected += 1;
        }

        Ok(redirected)
    }
}
