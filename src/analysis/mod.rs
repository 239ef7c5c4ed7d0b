//! Graph analysis: similarity, edge derivation, ranking, spreading
//! activation.
//!
//! Everything in this module is pure computation over store reads — none
//! of it suspends, and runtime is bounded by the size of the graph.

pub mod edges;
pub mod pagerank;
pub mod similarity;
pub mod spreading;

pub use edges::{derive_edges, EdgeDerivationReport, EdgeDeriveOptions};
pub use pagerank::{pagerank, recompute_and_store, PageRankParams};
pub use similarity::{
    is_more_specific, merged_behavior, shared_tag_count, similarity, when_overlap,
    SimilarityScore,
};
pub use spreading::{seed_activation, spread, EdgeSource, SpreadResult};
