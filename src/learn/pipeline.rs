//! The learning pipeline: correction in, behavior placement out.
//!
//! Extraction, scope classification, deduplication against the target
//! scope, the accept/review gate, and the durable corrections-log append
//! — in that order, with the whole sequence treated as one operation:
//! the log records the correction as processed only after its behavior
//! placement landed.

use crate::analysis::similarity::{merged_behavior, similarity};
use crate::cancel::CancellationFlag;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::graph::types::{
    Behavior, BehaviorQuery, Scope, NEEDS_REVIEW_METADATA_KEY,
};
use crate::graph::unified::UnifiedStore;
use crate::learn::classify::classify_scope;
use crate::learn::corrections::CorrectionLog;
use crate::learn::extract::extract_candidate;
use crate::learn::types::Correction;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What happened to one correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnOutcome {
    pub correction_id: String,
    /// The behavior that now carries the guidance (new or merged-into).
    pub behavior_id: String,
    /// Set when the candidate merged into an existing behavior.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<String>,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub review_reasons: Vec<String>,
    pub scope: Scope,
}

/// Summary of a batch reprocess run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprocessReport {
    pub total: u64,
    pub processed: u64,
    pub merged: u64,
    pub flagged_for_review: u64,
    /// Per-item failures: (correction id, error description).
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

/// The learning pipeline over a unified store.
pub struct LearningPipeline<'a> {
    store: &'a UnifiedStore,
    config: &'a EngineConfig,
}

impl<'a> LearningPipeline<'a> {
    pub fn new(store: &'a UnifiedStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Process one correction end to end and append it to the log.
    pub fn learn(
        &self,
        log: &CorrectionLog,
        mut correction: Correction,
        scope_override: Option<Scope>,
    ) -> Result<LearnOutcome> {
        let outcome = self.place(&correction, scope_override)?;

        correction.mark_processed();
        log.append(&correction)?;

        info!(
            correction = %outcome.correction_id,
            behavior = %outcome.behavior_id,
            merged = outcome.merged_into.is_some(),
            accepted = outcome.accepted,
            scope = %outcome.scope,
            "correction learned"
        );
        Ok(outcome)
    }

    /// Reprocess every unprocessed correction already in the log.
    ///
    /// Individual failures are reported and skipped; the log is rewritten
    /// atomically at the end so `processed` flags reflect what actually
    /// landed.
    pub fn reprocess(
        &self,
        log: &CorrectionLog,
        dry_run: bool,
        cancel: &CancellationFlag,
    ) -> Result<ReprocessReport> {
        let mut corrections = log.read_all()?;
        let mut report = ReprocessReport {
            dry_run,
            ..ReprocessReport::default()
        };

        for correction in corrections.iter_mut() {
            if correction.processed {
                continue;
            }
            cancel.check()?;
            report.total += 1;

            if dry_run {
                continue;
            }

            match self.place(correction, None) {
                Ok(outcome) => {
                    correction.mark_processed();
                    report.processed += 1;
                    if outcome.merged_into.is_some() {
                        report.merged += 1;
                    }
                    if !outcome.accepted {
                        report.flagged_for_review += 1;
                    }
                }
                Err(e) => {
                    warn!(correction = %correction.id, error = %e, "reprocess item failed");
                    report.failed.push((correction.id.clone(), e.to_string()));
                }
            }
        }

        if !dry_run {
            log.rewrite(&corrections)?;
        }

        info!(
            total = report.total,
            processed = report.processed,
            merged = report.merged,
            review = report.flagged_for_review,
            failed = report.failed.len(),
            "reprocess finished"
        );
        Ok(report)
    }

    /// Extract, classify, deduplicate, and persist one candidate without
    /// touching any log. Callers that manage per-scope logs append the
    /// correction themselves based on the returned scope.
    pub fn place(
        &self,
        correction: &Correction,
        scope_override: Option<Scope>,
    ) -> Result<LearnOutcome> {
        let mut candidate = extract_candidate(correction);
        candidate.validate()?;

        let mut scope = classify_scope(&candidate, correction, scope_override);
        if scope == Scope::Local && !self.store.has_local() {
            debug!("no local scope attached, storing globally");
            scope = Scope::Global;
        }

        // Deduplicate against the target scope only
        let existing = self
            .store
            .scope(scope)?
            .query_nodes(&BehaviorQuery::new().active_only())?;

        if let Some((target, score)) = best_match(&candidate, &existing) {
            if score >= self.config.auto_merge_threshold {
                return self.merge_candidate(correction, candidate, target, scope);
            }
        }

        let review_reasons = self.review_reasons(&candidate, &existing);
        let accepted = candidate.confidence >= self.config.auto_accept_threshold
            && review_reasons.is_empty();
        if !accepted {
            candidate.metadata.insert(
                NEEDS_REVIEW_METADATA_KEY.to_string(),
                serde_json::Value::Bool(true),
            );
            if !review_reasons.is_empty() {
                candidate.metadata.insert(
                    "review_reasons".to_string(),
                    serde_json::json!(review_reasons),
                );
            }
        }

        self.store.scope(scope)?.add_node(&candidate)?;

        Ok(LearnOutcome {
            correction_id: correction.id.clone(),
            behavior_id: candidate.id,
            merged_into: None,
            accepted,
            review_reasons,
            scope,
        })
    }

    /// Fold a near-duplicate candidate into the behavior it duplicates.
    fn merge_candidate(
        &self,
        correction: &Correction,
        candidate: Behavior,
        target: &Behavior,
        scope: Scope,
    ) -> Result<LearnOutcome> {
        let mut merged = merged_behavior(target, &candidate);
        // The repeated correction is a confirmation signal
        merged.stats.times_confirmed += 1;
        self.store.scope(scope)?.update_node(&merged)?;

        debug!(
            candidate = %candidate.id,
            target = %target.id,
            "candidate merged into existing behavior"
        );
        Ok(LearnOutcome {
            correction_id: correction.id.clone(),
            behavior_id: target.id.clone(),
            merged_into: Some(target.id.clone()),
            accepted: true,
            review_reasons: Vec::new(),
            scope,
        })
    }

    /// Reasons a candidate should be held for review instead of
    /// auto-accepted.
    fn review_reasons(&self, candidate: &Behavior, existing: &[Behavior]) -> Vec<String> {
        let mut reasons = Vec::new();

        // Nothing to match on at all: the predicate is empty and no tags
        // anchor the guidance
        if candidate.when.is_empty() && candidate.content.tags.is_empty() {
            reasons.push("unconditional with no tags; extremely low specificity".to_string());
        }

        // Close to an established high-confidence behavior without being
        // a near-duplicate: likely contradicts or shadows it
        for other in existing {
            let score = similarity(candidate, other).score;
            if other.confidence >= 0.9
                && score >= self.config.similar_floor
                && score < self.config.auto_merge_threshold
            {
                reasons.push(format!(
                    "similar to established behavior '{}' (score {:.2})",
                    other.id, score
                ));
            }
        }

        reasons
    }
}

/// The most similar existing behavior, if any.
fn best_match<'b>(candidate: &Behavior, existing: &'b [Behavior]) -> Option<(&'b Behavior, f64)> {
    existing
        .iter()
        .map(|b| (b, similarity(candidate, b).score))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::MemoryGraphStore;
    use crate::learn::types::ContextSnapshot;

    fn setup() -> (tempfile::TempDir, UnifiedStore, EngineConfig, CorrectionLog) {
        let dir = tempfile::tempdir().unwrap();
        let store = UnifiedStore::new(
            Some(Box::new(MemoryGraphStore::new())),
            Box::new(MemoryGraphStore::new()),
        );
        let log = CorrectionLog::new(dir.path().join("corrections.jsonl"));
        (dir, store, EngineConfig::default(), log)
    }

    fn python_correction(wrong: &str, right: &str) -> Correction {
        Correction::new(
            wrong,
            right,
            ContextSnapshot {
                file_path: Some("script.py".to_string()),
                file_ext: Some("py".to_string()),
                file_language: Some("python".to_string()),
                task: Some("refactor".to_string()),
                ..ContextSnapshot::default()
            },
        )
    }

    #[test]
    fn test_learn_creates_behavior_and_logs() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        let outcome = pipeline
            .learn(&log, python_correction("used os.path", "use pathlib.Path"), None)
            .unwrap();

        assert!(outcome.accepted);
        assert!(outcome.merged_into.is_none());

        let behavior = store.get_node(&outcome.behavior_id).unwrap().unwrap();
        assert_eq!(behavior.behavior.content.canonical, "use pathlib.Path");
        assert_eq!(
            behavior.behavior.when.get("language").map(String::as_str),
            Some("python")
        );
        assert!(behavior.behavior.content.tags.contains("pathlib"));

        let logged = log.read_all().unwrap();
        assert_eq!(logged.len(), 1);
        assert!(logged[0].processed);
    }

    #[test]
    fn test_near_duplicate_merges_not_inserts() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        let first = pipeline
            .learn(&log, python_correction("used os.path", "use pathlib.Path"), None)
            .unwrap();
        let scope = first.scope;
        let count_before = store.scope(scope).unwrap().count_nodes().unwrap();
        let confidence_before = store
            .get_node(&first.behavior_id)
            .unwrap()
            .unwrap()
            .behavior
            .confidence;

        let second = pipeline
            .learn(&log, python_correction("used os.path again", "use pathlib.Path"), None)
            .unwrap();

        assert_eq!(second.merged_into.as_deref(), Some(first.behavior_id.as_str()));
        assert_eq!(store.scope(scope).unwrap().count_nodes().unwrap(), count_before);

        let after = store.get_node(&first.behavior_id).unwrap().unwrap().behavior;
        assert!(after.confidence >= confidence_before);
        assert_eq!(after.stats.times_confirmed, 1);
        assert_eq!(log.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_low_specificity_flagged_for_review() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        // No context at all and wording that matches no tag
        let correction = Correction::new("zzz", "qqq wvx bbb", ContextSnapshot::default());
        let outcome = pipeline.learn(&log, correction, None).unwrap();

        assert!(!outcome.accepted);
        assert!(!outcome.review_reasons.is_empty());

        let behavior = store.get_node(&outcome.behavior_id).unwrap().unwrap().behavior;
        assert!(behavior.needs_review());
        // Proposals do not activate
        let active = store
            .query_nodes(&BehaviorQuery::new().active_only())
            .unwrap();
        assert!(active.iter().all(|s| s.behavior.id != behavior.id));
    }

    #[test]
    fn test_scope_routing_global_for_general_guidance() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        let outcome = pipeline
            .learn(&log, python_correction("w", "use pathlib.Path everywhere"), None)
            .unwrap();
        assert_eq!(outcome.scope, Scope::Global);

        let local = pipeline
            .learn(
                &log,
                python_correction("w", "keep fixtures under tests/fixtures"),
                None,
            )
            .unwrap();
        assert_eq!(local.scope, Scope::Local);
    }

    #[test]
    fn test_scope_override_wins() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        let outcome = pipeline
            .learn(
                &log,
                python_correction("w", "use pathlib.Path"),
                Some(Scope::Local),
            )
            .unwrap();
        assert_eq!(outcome.scope, Scope::Local);
    }

    #[test]
    fn test_reprocess_updates_flags_atomically() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        // Two raw corrections appended without processing
        log.append(&python_correction("w1", "use pathlib.Path")).unwrap();
        log.append(&python_correction("w2", "never commit secrets")).unwrap();

        let report = pipeline
            .reprocess(&log, false, &CancellationFlag::new())
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 2);
        assert!(report.failed.is_empty());

        assert!(log.unprocessed().unwrap().is_empty());
        // Second run is a no-op
        let again = pipeline
            .reprocess(&log, false, &CancellationFlag::new())
            .unwrap();
        assert_eq!(again.total, 0);
    }

    #[test]
    fn test_reprocess_dry_run_changes_nothing() {
        let (_dir, store, config, log) = setup();
        let pipeline = LearningPipeline::new(&store, &config);

        log.append(&python_correction("w", "use pathlib.Path")).unwrap();
        let report = pipeline
            .reprocess(&log, true, &CancellationFlag::new())
            .unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(log.unprocessed().unwrap().len(), 1);
        assert_eq!(store.query_nodes(&BehaviorQuery::new()).unwrap().len(), 0);
    }

    #[test]
    fn test_global_fallback_without_local_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = UnifiedStore::global_only(Box::new(MemoryGraphStore::new()));
        let config = EngineConfig::default();
        let log = CorrectionLog::new(dir.path().join("corrections.jsonl"));
        let pipeline = LearningPipeline::new(&store, &config);

        let outcome = pipeline
            .learn(
                &log,
                python_correction("w", "keep fixtures under tests/fixtures"),
                None,
            )
            .unwrap();
        assert_eq!(outcome.scope, Scope::Global);
    }
}
