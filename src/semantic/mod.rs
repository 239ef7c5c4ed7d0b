//! Optional semantic analysis capability.
//!
//! A [`SemanticAnalyzer`] can judge behavior similarity and enrich
//! correction extraction beyond what the lexical heuristics see. The
//! capability is strictly optional: every caller goes through
//! [`compare_with_fallback`], which bounds the analyzer with a timeout
//! and falls back to the lexical path on any failure, so the engine is
//! fully usable with zero external services.

pub mod anthropic;

pub use anthropic::{AnthropicAnalyzer, AnalyzerConfig};

use crate::analysis::similarity::similarity;
use crate::cancel::CancellationFlag;
use crate::error::{Error, Result};
use crate::graph::types::{Behavior, BehaviorKind, WhenPredicate};
use crate::learn::types::ContextSnapshot;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

/// Hints an analyzer can contribute to candidate extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateHints {
    pub name: Option<String>,
    pub kind: Option<BehaviorKind>,
    pub tags: BTreeSet<String>,
    pub when: WhenPredicate,
}

/// Semantic analysis over behaviors and corrections.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    /// A short name for logging.
    fn name(&self) -> &str;

    /// Semantic similarity of two behaviors in [0, 1].
    async fn compare_behaviors(&self, a: &Behavior, b: &Behavior) -> Result<f64>;

    /// Extract naming/classification hints from a correction.
    async fn extract_correction(
        &self,
        agent_action: &str,
        corrected_action: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<CandidateHints>;
}

/// Compare two behaviors, preferring the analyzer but never depending on
/// it.
///
/// The analyzer call is bounded by `timeout`; on timeout, error, or
/// cancellation the lexical score is returned and the failure is logged.
pub async fn compare_with_fallback(
    analyzer: Option<&dyn SemanticAnalyzer>,
    a: &Behavior,
    b: &Behavior,
    timeout: Duration,
    cancel: &CancellationFlag,
) -> f64 {
    let lexical = similarity(a, b).score;

    let Some(analyzer) = analyzer else {
        return lexical;
    };
    if cancel.is_cancelled() {
        return lexical;
    }

    match tokio::time::timeout(timeout, analyzer.compare_behaviors(a, b)).await {
        Ok(Ok(score)) => score.clamp(0.0, 1.0),
        Ok(Err(e)) => {
            warn!(analyzer = analyzer.name(), error = %e, "semantic comparison failed, using lexical score");
            lexical
        }
        Err(_) => {
            warn!(
                analyzer = analyzer.name(),
                timeout_ms = timeout.as_millis() as u64,
                "semantic comparison timed out, using lexical score"
            );
            lexical
        }
    }
}

/// Map any analyzer transport error into the non-fatal `Semantic`
/// variant.
pub(crate) fn semantic_error(message: impl Into<String>) -> Error {
    Error::Semantic(message.into())
}
