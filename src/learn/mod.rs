//! Learning pipeline: corrections in, behaviors out.
//!
//! A correction ("you did X, should have done Y") becomes a candidate
//! behavior through extraction, gets routed to a scope, deduplicated
//! against what that scope already knows, and either auto-accepted or
//! held as a proposal for review. The corrections log is the durable
//! record of everything that was ever learned from.

pub mod classify;
pub mod corrections;
pub mod extract;
pub mod pipeline;
pub mod types;

pub use classify::classify_scope;
pub use corrections::CorrectionLog;
pub use extract::{derive_name, extract_candidate, infer_kind};
pub use pipeline::{LearnOutcome, LearningPipeline, ReprocessReport};
pub use types::{ContextSnapshot, Correction};
