//! Behavior graph storage.
//!
//! The graph is a typed property graph: behaviors are nodes with lifecycle
//! states, relations are directed weighted edges. Two storage peers exist
//! per installation — a project-local scope and a user-global scope — and
//! the [`UnifiedStore`] composes them into one read-union, routed-write
//! view.
//!
//! ## Example
//!
//! ```rust,ignore
//! use floop_core::graph::{Behavior, BehaviorKind, SqliteGraphStore, GraphStore};
//!
//! let store = SqliteGraphStore::open(".floop/behaviors.db")?;
//! let behavior = Behavior::new(BehaviorKind::Directive, "use-pathlib", "Use pathlib.Path")
//!     .with_when("language", "python")
//!     .with_confidence(0.9);
//! store.add_node(&behavior)?;
//! ```

pub mod memory;
pub mod schema;
pub mod store;
pub mod types;
pub mod unified;
pub mod validate;

pub use memory::MemoryGraphStore;
pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::{GraphStore, SqliteGraphStore};
pub use types::{
    Behavior, BehaviorContent, BehaviorKind, BehaviorQuery, BehaviorStats, CurationRecord,
    Direction, Edge, EdgeKind, Provenance, Scope, ScopedBehavior, WhenPredicate,
    CURATION_METADATA_KEY, NEEDS_REVIEW_METADATA_KEY, PAGERANK_METADATA_KEY,
};
pub use unified::UnifiedStore;
pub use validate::{validate_store, ValidationFinding, ValidationReport};
