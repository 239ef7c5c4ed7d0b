//! # floop-core
//!
//! A behavior-learning and context-injection engine for AI coding
//! agents. Corrections ("you did X, should have done Y") are distilled
//! into reusable *behaviors*, stored in a typed property graph across a
//! project-local and a user-global scope, and — when an agent is about
//! to act — the behaviors relevant to the current context are selected,
//! ranked under a token budget, and emitted as a prompt fragment.
//!
//! ## Core Components
//!
//! - **Graph**: transactional typed property graph with dual scopes and
//!   durable snapshots
//! - **Learn**: correction ingestion, candidate extraction, dedup/merge
//! - **Activation**: `when`-predicate evaluation, conflict resolution,
//!   spreading activation
//! - **Assembly**: tier assignment under a token budget and rendering
//! - **Session**: per-session injection dedup with upgrade/reinforce
//!   logic
//!
//! ## Example
//!
//! ```rust,ignore
//! use floop_core::{Engine, EngineConfig, LearnRequest, ScopePaths};
//!
//! let engine = Engine::open(
//!     ScopePaths::discover_local("."),
//!     ScopePaths::global(),
//!     EngineConfig::default(),
//! )?;
//!
//! engine.learn(LearnRequest {
//!     wrong: "used os.path".into(),
//!     right: "use pathlib.Path".into(),
//!     file: Some("script.py".into()),
//!     ..Default::default()
//! })?;
//! ```

pub mod activation;
pub mod analysis;
pub mod assembly;
pub mod backup;
pub mod cancel;
pub mod config;
pub mod context;
pub mod curation;
pub mod engine;
pub mod error;
pub mod fsio;
pub mod graph;
pub mod hook;
pub mod learn;
pub mod sanitize;
pub mod scope;
pub mod seeder;
pub mod semantic;
pub mod session;
pub mod tags;

// Re-exports for convenience
pub use activation::{
    active_behaviors, explain, is_active, resolve, ActivationExplanation, ConditionCheck,
    ExcludedEntry, OverriddenEntry, ResolvedActivation,
};
pub use analysis::{
    derive_edges, is_more_specific, merged_behavior, pagerank, seed_activation, shared_tag_count,
    similarity, spread, when_overlap, EdgeDerivationReport, EdgeDeriveOptions, EdgeSource,
    PageRankParams, SimilarityScore, SpreadResult,
};
pub use assembly::{
    assign_tiers, compile, summarize, InjectionPlan, OutputFormat, PlannedBehavior,
    RankedBehavior, Tier, TokenCostModel,
};
pub use backup::{
    apply_retention, detect_format, restore_from_file, verify, RestoreMode, RestoreSummary,
    RetentionPolicy, RetentionReport, SnapshotBody, SnapshotFormat, VerifyReport,
};
pub use cancel::CancellationFlag;
pub use config::EngineConfig;
pub use context::Context;
pub use curation::{CurationOutcome, Curator, MergeOutcome};
pub use engine::{
    ActivateRequest, ActivateResult, DeduplicateReport, EmittedBehavior, Engine, EngineStats,
    LearnRequest, PromptResult, ScopeStats,
};
pub use error::{Error, Result};
pub use graph::{
    Behavior, BehaviorContent, BehaviorKind, BehaviorQuery, BehaviorStats, CurationRecord,
    Direction, Edge, EdgeKind, GraphStore, MemoryGraphStore, Provenance, Scope, ScopedBehavior,
    SqliteGraphStore, UnifiedStore, ValidationFinding, ValidationReport, WhenPredicate,
};
pub use hook::{handle_hook, HookInput, HookTrigger};
pub use learn::{
    ContextSnapshot, Correction, CorrectionLog, LearnOutcome, LearningPipeline, ReprocessReport,
};
pub use scope::{Manifest, ScopePaths};
pub use seeder::{seed, SeedReport};
pub use semantic::{
    compare_with_fallback, AnalyzerConfig, AnthropicAnalyzer, CandidateHints, SemanticAnalyzer,
};
pub use session::{
    FilterDecision, FilterOutcome, FilteredEmission, InjectionRecord, SessionLock, SessionState,
    SessionStore,
};
