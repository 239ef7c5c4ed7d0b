//! Graph store contract and SQLite-backed implementation.

use crate::error::{Error, Result};
use crate::graph::schema::{initialize_schema, is_initialized};
use crate::graph::types::{Behavior, BehaviorQuery, Direction, Edge, EdgeKind};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Typed property-graph CRUD contract.
///
/// All implementations are single-writer, multi-reader per instance; a
/// mutating call either lands completely or not at all. `close` is
/// idempotent and subsequent operations fail with a storage error.
pub trait GraphStore: Send + Sync {
    /// Insert a behavior node. Fails on duplicate id.
    fn add_node(&self, behavior: &Behavior) -> Result<()>;

    /// Replace an existing behavior node.
    fn update_node(&self, behavior: &Behavior) -> Result<()>;

    /// Delete a node and the edges touching it. Returns whether it existed.
    fn delete_node(&self, id: &str) -> Result<bool>;

    /// Fetch a node by id.
    fn get_node(&self, id: &str) -> Result<Option<Behavior>>;

    /// Fetch nodes matching a conjunctive equality query.
    fn query_nodes(&self, query: &BehaviorQuery) -> Result<Vec<Behavior>>;

    /// Add an edge. Re-adding the same `(source, target, kind)` replaces
    /// the weight. Self-edges are rejected.
    fn add_edge(&self, edge: &Edge) -> Result<()>;

    /// Remove an edge. Returns whether it existed.
    fn remove_edge(&self, source: &str, target: &str, kind: EdgeKind) -> Result<bool>;

    /// Edges touching a node, filtered by direction and optional kind.
    fn get_edges(&self, id: &str, direction: Direction, kind: Option<EdgeKind>)
        -> Result<Vec<Edge>>;

    /// Every edge in the store.
    fn all_edges(&self) -> Result<Vec<Edge>>;

    /// Number of nodes.
    fn count_nodes(&self) -> Result<u64>;

    /// Number of edges.
    fn count_edges(&self) -> Result<u64>;

    /// Remove every node and edge. Used by snapshot restore in replace
    /// mode.
    fn clear(&self) -> Result<()>;

    /// Durably commit pending writes.
    fn sync(&self) -> Result<()>;

    /// Release the backing resources. Idempotent.
    fn close(&self) -> Result<()>;
}

/// SQLite-backed graph store. One connection, WAL journal, per-operation
/// transactions.
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
    closed: AtomicBool,
}

impl SqliteGraphStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        })
    }

    /// Create an in-memory SQLite store (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::storage("store is closed"));
        }
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::storage(e.to_string()))
    }

    fn row_to_behavior(row: &rusqlite::Row) -> rusqlite::Result<Behavior> {
        let content: String = row.get(3)?;
        let when: String = row.get(4)?;
        let provenance: String = row.get(7)?;
        let stats: String = row.get(8)?;
        let requires: String = row.get(9)?;
        let overrides: String = row.get(10)?;
        let conflicts: String = row.get(11)?;
        let metadata: String = row.get(12)?;

        let kind_str: String = row.get(1)?;
        let kind = crate::graph::types::BehaviorKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown behavior kind '{}'", kind_str).into(),
            )
        })?;

        Ok(Behavior {
            id: row.get(0)?,
            kind,
            name: row.get(2)?,
            content: parse_json_column(3, &content)?,
            when: parse_json_column(4, &when)?,
            confidence: row.get(5)?,
            priority: row.get(6)?,
            provenance: parse_json_column(7, &provenance)?,
            stats: parse_json_column(8, &stats)?,
            requires: parse_json_column(9, &requires)?,
            overrides: parse_json_column(10, &overrides)?,
            conflicts: parse_json_column(11, &conflicts)?,
            metadata: parse_json_column(12, &metadata)?,
        })
    }

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
        let kind_str: String = row.get(2)?;
        let kind = EdgeKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown edge kind '{}'", kind_str).into(),
            )
        })?;
        let metadata: String = row.get(5)?;

        Ok(Edge {
            source: row.get(0)?,
            target: row.get(1)?,
            kind,
            weight: row.get(3)?,
            created_at: parse_datetime(row.get::<_, String>(4)?),
            metadata: parse_json_column(5, &metadata)?,
        })
    }
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const BEHAVIOR_COLUMNS: &str = "id, kind, name, content, when_predicate, confidence, priority,
    provenance, stats, requires, overrides, conflicts, metadata";

impl GraphStore for SqliteGraphStore {
    fn add_node(&self, behavior: &Behavior) -> Result<()> {
        let mut behavior = behavior.clone();
        behavior.validate()?;

        if self.get_node(&behavior.id)?.is_some() {
            return Err(Error::state_violation(format!(
                "behavior '{}' already exists",
                behavior.id
            )));
        }

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO behaviors (
                    id, kind, name, content, when_predicate, confidence, priority,
                    provenance, stats, requires, overrides, conflicts, metadata,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    behavior.id,
                    behavior.kind.as_str(),
                    behavior.name,
                    serde_json::to_string(&behavior.content).unwrap_or_default(),
                    serde_json::to_string(&behavior.when).unwrap_or_default(),
                    behavior.confidence,
                    behavior.priority,
                    serde_json::to_string(&behavior.provenance).unwrap_or_default(),
                    serde_json::to_string(&behavior.stats).unwrap_or_default(),
                    serde_json::to_string(&behavior.requires).unwrap_or_default(),
                    serde_json::to_string(&behavior.overrides).unwrap_or_default(),
                    serde_json::to_string(&behavior.conflicts).unwrap_or_default(),
                    serde_json::to_string(&behavior.metadata).unwrap_or_default(),
                    behavior.stats.created_at.to_rfc3339(),
                    behavior.stats.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    fn update_node(&self, behavior: &Behavior) -> Result<()> {
        let mut behavior = behavior.clone();
        behavior.validate()?;

        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE behaviors SET
                    kind = ?2, name = ?3, content = ?4, when_predicate = ?5,
                    confidence = ?6, priority = ?7, provenance = ?8, stats = ?9,
                    requires = ?10, overrides = ?11, conflicts = ?12, metadata = ?13,
                    updated_at = ?14
                 WHERE id = ?1",
                params![
                    behavior.id,
                    behavior.kind.as_str(),
                    behavior.name,
                    serde_json::to_string(&behavior.content).unwrap_or_default(),
                    serde_json::to_string(&behavior.when).unwrap_or_default(),
                    behavior.confidence,
                    behavior.priority,
                    serde_json::to_string(&behavior.provenance).unwrap_or_default(),
                    serde_json::to_string(&behavior.stats).unwrap_or_default(),
                    serde_json::to_string(&behavior.requires).unwrap_or_default(),
                    serde_json::to_string(&behavior.overrides).unwrap_or_default(),
                    serde_json::to_string(&behavior.conflicts).unwrap_or_default(),
                    serde_json::to_string(&behavior.metadata).unwrap_or_default(),
                    Utc::now().to_rfc3339(),
                ],
            )
        })?;

        if rows == 0 {
            return Err(Error::not_found("behavior", behavior.id.clone()));
        }
        Ok(())
    }

    fn delete_node(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM edges WHERE source = ?1 OR target = ?1",
                params![id],
            )?;
            let rows = tx.execute("DELETE FROM behaviors WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(rows > 0)
        })
    }

    fn get_node(&self, id: &str) -> Result<Option<Behavior>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM behaviors WHERE id = ?1", BEHAVIOR_COLUMNS),
                params![id],
                |row| Self::row_to_behavior(row),
            )
            .optional()
        })
    }

    fn query_nodes(&self, query: &BehaviorQuery) -> Result<Vec<Behavior>> {
        // Kind narrows in SQL; when/tag clauses are JSON fields and filter
        // in Rust over the narrowed set.
        let rows: Vec<Behavior> = self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM behaviors", BEHAVIOR_COLUMNS);
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(kind) = query.kind {
                sql.push_str(" WHERE kind = ?");
                params_vec.push(Box::new(kind.as_str().to_string()));
            }
            sql.push_str(" ORDER BY id");

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let behaviors = stmt
                .query_map(params_refs.as_slice(), |row| Self::row_to_behavior(row))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(behaviors)
        })?;

        let mut matched: Vec<Behavior> =
            rows.into_iter().filter(|b| query.matches(b)).collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn add_edge(&self, edge: &Edge) -> Result<()> {
        edge.validate()?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO edges (source, target, kind, weight, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source, target, kind) DO UPDATE SET weight = excluded.weight",
                params![
                    edge.source,
                    edge.target,
                    edge.kind.as_str(),
                    edge.weight,
                    edge.created_at.to_rfc3339(),
                    serde_json::to_string(&edge.metadata).unwrap_or_default(),
                ],
            )?;
            Ok(())
        })
    }

    fn remove_edge(&self, source: &str, target: &str, kind: EdgeKind) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM edges WHERE source = ?1 AND target = ?2 AND kind = ?3",
                params![source, target, kind.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    fn get_edges(
        &self,
        id: &str,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>> {
        self.with_conn(|conn| {
            let clause = match direction {
                Direction::Out => "source = ?1",
                Direction::In => "target = ?1",
                Direction::Both => "(source = ?1 OR target = ?1)",
            };
            let sql = match kind {
                Some(_) => format!(
                    "SELECT source, target, kind, weight, created_at, metadata
                     FROM edges WHERE {} AND kind = ?2",
                    clause
                ),
                None => format!(
                    "SELECT source, target, kind, weight, created_at, metadata
                     FROM edges WHERE {}",
                    clause
                ),
            };

            let mut stmt = conn.prepare(&sql)?;
            let edges = match kind {
                Some(k) => stmt
                    .query_map(params![id, k.as_str()], |row| Self::row_to_edge(row))?
                    .filter_map(|r| r.ok())
                    .collect(),
                None => stmt
                    .query_map(params![id], |row| Self::row_to_edge(row))?
                    .filter_map(|r| r.ok())
                    .collect(),
            };
            Ok(edges)
        })
    }

    fn all_edges(&self) -> Result<Vec<Edge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source, target, kind, weight, created_at, metadata FROM edges",
            )?;
            let edges = stmt
                .query_map([], |row| Self::row_to_edge(row))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(edges)
        })
    }

    fn count_nodes(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM behaviors", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n as u64)
    }

    fn count_edges(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get::<_, i64>(0))
        })
        .map(|n| n as u64)
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM edges", [])?;
            tx.execute("DELETE FROM behaviors", [])?;
            tx.commit()?;
            Ok(())
        })
    }

    fn sync(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        // Subsequent operations fail; the connection itself is dropped
        // with the last Arc clone.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::BehaviorKind;

    fn sample(name: &str) -> Behavior {
        Behavior::new(BehaviorKind::Directive, name, format!("{} canonical", name))
    }

    #[test]
    fn test_add_and_get_node() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let behavior = sample("use-pathlib").with_when("language", "python");

        store.add_node(&behavior).unwrap();
        let loaded = store.get_node(&behavior.id).unwrap().unwrap();

        assert_eq!(loaded.name, "use-pathlib");
        assert_eq!(loaded.when.get("language").map(String::as_str), Some("python"));
    }

    #[test]
    fn test_add_duplicate_fails() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let behavior = sample("dup");
        store.add_node(&behavior).unwrap();
        assert!(matches!(
            store.add_node(&behavior),
            Err(Error::StateViolation(_))
        ));
    }

    #[test]
    fn test_update_missing_fails() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let behavior = sample("ghost");
        assert!(matches!(
            store.update_node(&behavior),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_removes_touching_edges() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = sample("a");
        let b = sample("b");
        store.add_node(&a).unwrap();
        store.add_node(&b).unwrap();
        store
            .add_edge(&Edge::new(&a.id, &b.id, EdgeKind::SimilarTo).with_weight(0.7))
            .unwrap();

        assert!(store.delete_node(&a.id).unwrap());
        assert_eq!(store.get_edges(&b.id, Direction::Both, None).unwrap().len(), 0);
    }

    #[test]
    fn test_query_by_kind_and_when() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .add_node(&sample("c1").with_when("language", "go"))
            .unwrap();
        store
            .add_node(
                &Behavior::new(BehaviorKind::Constraint, "c2", "never force push")
                    .with_when("language", "go"),
            )
            .unwrap();

        let constraints = store
            .query_nodes(&BehaviorQuery::new().kind(BehaviorKind::Constraint))
            .unwrap();
        assert_eq!(constraints.len(), 1);

        let go = store
            .query_nodes(&BehaviorQuery::new().when("language", "go"))
            .unwrap();
        assert_eq!(go.len(), 2);
    }

    #[test]
    fn test_edge_add_is_idempotent_replace() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = sample("a");
        let b = sample("b");
        store.add_node(&a).unwrap();
        store.add_node(&b).unwrap();

        store
            .add_edge(&Edge::new(&a.id, &b.id, EdgeKind::SimilarTo).with_weight(0.5))
            .unwrap();
        store
            .add_edge(&Edge::new(&a.id, &b.id, EdgeKind::SimilarTo).with_weight(0.8))
            .unwrap();

        let edges = store.get_edges(&a.id, Direction::Out, None).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 0.8);
    }

    #[test]
    fn test_self_edge_rejected() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = sample("a");
        store.add_node(&a).unwrap();
        assert!(store
            .add_edge(&Edge::new(&a.id, &a.id, EdgeKind::Requires))
            .is_err());
    }

    #[test]
    fn test_edge_direction_filter() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = sample("a");
        let b = sample("b");
        store.add_node(&a).unwrap();
        store.add_node(&b).unwrap();
        store
            .add_edge(&Edge::new(&a.id, &b.id, EdgeKind::Overrides))
            .unwrap();

        assert_eq!(store.get_edges(&a.id, Direction::Out, None).unwrap().len(), 1);
        assert_eq!(store.get_edges(&a.id, Direction::In, None).unwrap().len(), 0);
        assert_eq!(store.get_edges(&b.id, Direction::In, None).unwrap().len(), 1);
        assert_eq!(
            store
                .get_edges(&a.id, Direction::Both, Some(EdgeKind::Requires))
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.count_nodes().is_err());
    }

    #[test]
    fn test_clear() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = sample("a");
        let b = sample("b");
        store.add_node(&a).unwrap();
        store.add_node(&b).unwrap();
        store
            .add_edge(&Edge::new(&a.id, &b.id, EdgeKind::SimilarTo).with_weight(0.6))
            .unwrap();

        store.clear().unwrap();
        assert_eq!(store.count_nodes().unwrap(), 0);
        assert_eq!(store.count_edges().unwrap(), 0);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("behaviors.db");

        let behavior = sample("persisted");
        {
            let store = SqliteGraphStore::open(&path).unwrap();
            store.add_node(&behavior).unwrap();
            store.sync().unwrap();
        }

        let reopened = SqliteGraphStore::open(&path).unwrap();
        assert!(reopened.get_node(&behavior.id).unwrap().is_some());
    }
}
