//! The engine: command-shaped operations over the behavior graph.
//!
//! An [`Engine`] owns the unified store, the per-scope corrections logs,
//! the session store, and the configuration. Every operation consumes
//! structured input and produces a `serde`-serializable result; the
//! transport (argv, JSON over stdio, a library call) is the caller's
//! concern.

use crate::activation::{explain, is_active, resolve, ActivationExplanation, ResolvedActivation};
use crate::analysis::edges::{derive_edges, EdgeDerivationReport, EdgeDeriveOptions};
use crate::analysis::similarity::similarity;
use crate::analysis::spreading::spread;
use crate::assembly::compile::{compile, OutputFormat};
use crate::assembly::tiering::{
    assign_tiers, InjectionPlan, RankedBehavior, Tier, TokenCostModel,
};
use crate::backup::{
    backup_to_file, restore_from_file, verify, RestoreMode, RestoreSummary, VerifyReport,
};
use crate::cancel::CancellationFlag;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::curation::{CurationOutcome, Curator, MergeOutcome};
use crate::error::{Error, Result};
use crate::graph::store::{GraphStore, SqliteGraphStore};
use crate::graph::types::{
    BehaviorKind, BehaviorQuery, Scope, ScopedBehavior,
};
use crate::graph::unified::UnifiedStore;
use crate::graph::validate::{validate_store, ValidationReport};
use crate::learn::corrections::CorrectionLog;
use crate::learn::pipeline::{LearnOutcome, LearningPipeline, ReprocessReport};
use crate::learn::types::{ContextSnapshot, Correction};
use crate::scope::ScopePaths;
use crate::seeder::{seed, SeedReport};
use crate::semantic::{compare_with_fallback, SemanticAnalyzer};
use crate::session::{filter_plan, SessionLock, SessionStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Input to `learn`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnRequest {
    /// What the agent did.
    pub wrong: String,
    /// What it should have done.
    pub right: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Force the target scope instead of classifying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

/// Input to `activate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<usize>,
    pub session_id: String,
    #[serde(default)]
    pub format: OutputFormat,
}

/// One behavior emitted by `activate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedBehavior {
    pub id: String,
    pub name: String,
    pub kind: BehaviorKind,
    pub tier: Tier,
    pub activation: f64,
    pub tokens: usize,
    pub is_upgrade: bool,
    pub is_reinforce: bool,
}

/// Result of `activate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivateResult {
    /// The prompt fragment, empty when nothing is emitted.
    pub fragment: String,
    pub emitted: Vec<EmittedBehavior>,
    /// Ids suppressed by the session filter.
    pub suppressed: Vec<String>,
    pub total_tokens: usize,
    pub budget: usize,
    pub exceeded: bool,
}

/// Result of `prompt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptResult {
    pub fragment: String,
    pub behavior_count: usize,
    pub total_tokens: usize,
    pub exceeded: bool,
}

/// One merge performed (or proposed) by `deduplicate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatePair {
    pub surviving_id: String,
    pub merged_id: String,
    pub score: f64,
}

/// Result of `deduplicate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeduplicateReport {
    pub pairs: Vec<DeduplicatePair>,
    pub dry_run: bool,
}

/// Per-scope node/edge counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeStats {
    pub nodes: u64,
    pub edges: u64,
    pub corrections: u64,
    pub by_kind: BTreeMap<String, u64>,
}

/// Result of `stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<ScopeStats>,
    pub global: ScopeStats,
}

/// The behavior engine.
pub struct Engine {
    store: UnifiedStore,
    config: EngineConfig,
    global_log: CorrectionLog,
    local_log: Option<CorrectionLog>,
    sessions: SessionStore,
    backups_dir: PathBuf,
    analyzer: Option<Box<dyn SemanticAnalyzer>>,
    cost_model: TokenCostModel,
}

impl Engine {
    /// Open an engine over on-disk scopes. Initializes directory layouts
    /// and seeds the global store with the meta-behaviors.
    pub fn open(
        local: Option<ScopePaths>,
        global: ScopePaths,
        config: EngineConfig,
    ) -> Result<Self> {
        global.initialize()?;
        let global_store = SqliteGraphStore::open(global.behaviors_db())?;
        seed(&global_store)?;

        let (local_store, local_log) = match &local {
            Some(paths) => {
                paths.initialize()?;
                let store: Box<dyn GraphStore> =
                    Box::new(SqliteGraphStore::open(paths.behaviors_db())?);
                (Some(store), Some(CorrectionLog::new(paths.corrections_log())))
            }
            None => (None, None),
        };

        Ok(Self {
            store: UnifiedStore::new(local_store, Box::new(global_store)),
            global_log: CorrectionLog::new(global.corrections_log()),
            local_log,
            sessions: SessionStore::new(global.sessions_dir()),
            backups_dir: global.backups_dir(),
            analyzer: None,
            config,
            cost_model: TokenCostModel::default(),
        })
    }

    /// An engine over in-memory stores with filesystem state under the
    /// given directory. Used by tests and ephemeral embedders.
    pub fn ephemeral(state_dir: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        use crate::graph::memory::MemoryGraphStore;

        let state_dir = state_dir.into();
        let global_store = MemoryGraphStore::new();
        seed(&global_store)?;

        Ok(Self {
            store: UnifiedStore::new(
                Some(Box::new(MemoryGraphStore::new())),
                Box::new(global_store),
            ),
            global_log: CorrectionLog::new(state_dir.join("corrections.jsonl")),
            local_log: Some(CorrectionLog::new(state_dir.join("local-corrections.jsonl"))),
            sessions: SessionStore::new(state_dir.join("sessions")),
            backups_dir: state_dir.join("backups"),
            analyzer: None,
            config,
            cost_model: TokenCostModel::default(),
        })
    }

    /// Attach a semantic analyzer.
    pub fn with_analyzer(mut self, analyzer: Box<dyn SemanticAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &UnifiedStore {
        &self.store
    }

    fn log_for(&self, scope: Scope) -> Result<&CorrectionLog> {
        match scope {
            Scope::Global => Ok(&self.global_log),
            Scope::Local => self
                .local_log
                .as_ref()
                .ok_or_else(|| Error::state_violation("no local scope is attached")),
        }
    }

    // ==================== Learning ====================

    /// Record a correction and place the learned behavior.
    pub fn learn(&self, request: LearnRequest) -> Result<LearnOutcome> {
        if request.right.trim().is_empty() {
            return Err(Error::invalid_input("corrected action must not be empty"));
        }

        let context = Context::from_signals(
            request.file.as_deref(),
            request.task.as_deref(),
            request.branch.as_deref(),
            request.environment.as_deref(),
            None,
        );
        let mut correction = Correction::new(
            &request.wrong,
            &request.right,
            ContextSnapshot::from_context(&context),
        );
        if correction.corrected_action.is_empty() {
            return Err(Error::invalid_input(
                "corrected action is empty after sanitization",
            ));
        }

        // Place first, then log in the scope the behavior landed in
        let pipeline = LearningPipeline::new(&self.store, &self.config);
        let outcome = pipeline.place(&correction, request.scope)?;
        correction.mark_processed();
        self.log_for(outcome.scope)?.append(&correction)?;

        info!(
            correction = %outcome.correction_id,
            behavior = %outcome.behavior_id,
            scope = %outcome.scope,
            "correction learned"
        );
        Ok(outcome)
    }

    /// Reprocess unprocessed corrections in every attached scope, local
    /// first.
    pub fn reprocess(&self, dry_run: bool) -> Result<Vec<(Scope, ReprocessReport)>> {
        let pipeline = LearningPipeline::new(&self.store, &self.config);
        let cancel = CancellationFlag::new();
        let mut reports = Vec::new();

        if let Some(local_log) = &self.local_log {
            reports.push((Scope::Local, pipeline.reprocess(local_log, dry_run, &cancel)?));
        }
        reports.push((
            Scope::Global,
            pipeline.reprocess(&self.global_log, dry_run, &cancel)?,
        ));
        Ok(reports)
    }

    // ==================== Reads ====================

    /// List behaviors, optionally narrowed to a scope and tag.
    pub fn list(&self, scope: Option<Scope>, tag: Option<&str>) -> Result<Vec<ScopedBehavior>> {
        let mut query = BehaviorQuery::new();
        if let Some(tag) = tag {
            query = query.tag(tag);
        }
        match scope {
            None => self.store.query_nodes(&query),
            Some(scope) => {
                let behaviors = self.store.scope(scope)?.query_nodes(&query)?;
                Ok(behaviors
                    .into_iter()
                    .map(|behavior| ScopedBehavior {
                        behavior,
                        origin: scope,
                    })
                    .collect())
            }
        }
    }

    /// Fetch one behavior with its origin.
    pub fn show(&self, id: &str) -> Result<ScopedBehavior> {
        self.store
            .get_node(id)?
            .ok_or_else(|| Error::not_found("behavior", id))
    }

    /// Explain a behavior's activation against a context.
    pub fn why(&self, id: &str, context: &Context) -> Result<ActivationExplanation> {
        let scoped = self.show(id)?;
        Ok(explain(&scoped.behavior, context))
    }

    /// Evaluate and resolve the behaviors active in a context.
    pub fn active(&self, context: &Context) -> Result<ResolvedActivation> {
        let matched: Vec<_> = self
            .store
            .query_nodes(&BehaviorQuery::new().active_only())?
            .into_iter()
            .map(|s| s.behavior)
            .filter(|b| is_active(b, context))
            .collect();
        Ok(resolve(matched))
    }

    // ==================== Assembly ====================

    /// Assemble a prompt fragment over the currently active behaviors,
    /// without session filtering or spreading. With `tiered` off, every
    /// behavior renders at Full regardless of budget.
    pub fn prompt(
        &self,
        context: &Context,
        token_budget: Option<usize>,
        tiered: bool,
        format: OutputFormat,
    ) -> Result<PromptResult> {
        let resolved = self.active(context)?;
        let ranked: Vec<RankedBehavior> = resolved
            .active
            .into_iter()
            .map(|behavior| RankedBehavior {
                activation: crate::analysis::spreading::seed_activation(&behavior),
                behavior,
            })
            .collect();

        let budget = if tiered {
            token_budget.unwrap_or(self.config.default_token_budget)
        } else {
            usize::MAX
        };
        let plan = assign_tiers(ranked, budget, self.config.min_full, &self.cost_model);
        let fragment = compile(&plan, &context_reason(context), format);

        Ok(PromptResult {
            behavior_count: plan.emitted().count(),
            total_tokens: plan.total_tokens,
            exceeded: plan.exceeded,
            fragment,
        })
    }

    /// The full activation path: evaluate, resolve, spread, tier, filter
    /// through the session, and compile.
    pub fn activate(&self, request: ActivateRequest) -> Result<ActivateResult> {
        let context = Context::from_signals(
            request.file.as_deref(),
            request.task.as_deref(),
            None,
            request.environment.as_deref(),
            None,
        );

        // Evaluate and resolve the directly matched set
        let resolved = self.active(&context)?;
        let demoted: HashSet<String> = resolved
            .overridden
            .iter()
            .map(|e| e.behavior.id.clone())
            .chain(resolved.excluded.iter().map(|e| e.behavior.id.clone()))
            .collect();

        // Spread activation outward from the surviving seeds
        let spread_results = spread(&self.store, &resolved.active, &self.config)?;

        let mut ranked = Vec::new();
        for result in &spread_results {
            if demoted.contains(&result.behavior_id) {
                continue;
            }
            let Some(scoped) = self.store.get_node(&result.behavior_id)? else {
                continue;
            };
            if !scoped.behavior.kind.is_active() || scoped.behavior.needs_review() {
                continue;
            }
            ranked.push(RankedBehavior {
                behavior: scoped.behavior,
                activation: result.activation,
            });
        }

        let budget = request.token_budget.unwrap_or(self.config.default_token_budget);
        let plan = assign_tiers(ranked, budget, self.config.min_full, &self.cost_model);

        // Session filtering under the per-session advisory lock
        let lock_path = self.sessions.lock_path(&request.session_id)?;
        let _lock = SessionLock::acquire(&lock_path)?;

        let mut state = self.sessions.load(&request.session_id)?;
        state.prompt_count += 1;

        let entries: Vec<_> = plan.emitted().cloned().collect();
        let outcome = filter_plan(&entries, &mut state, &self.config);

        // Persist before returning so a crash cannot double-inject
        self.sessions.save(&state)?;

        // Compile only what survived the filter
        let mut emitted_plan = InjectionPlan {
            budget: plan.budget,
            exceeded: plan.exceeded,
            ..InjectionPlan::default()
        };
        let mut emitted = Vec::new();
        for emission in &outcome.emitted {
            let planned = emission.planned.clone();
            emitted_plan.total_tokens += planned.tokens;
            emitted.push(EmittedBehavior {
                id: planned.behavior.id.clone(),
                name: planned.behavior.name.clone(),
                kind: planned.behavior.kind,
                tier: planned.tier,
                activation: planned.activation,
                tokens: planned.tokens,
                is_upgrade: emission.is_upgrade,
                is_reinforce: emission.is_reinforce,
            });
            match planned.tier {
                Tier::Full => emitted_plan.full.push(planned),
                Tier::Summary => emitted_plan.summary.push(planned),
                Tier::NameOnly => emitted_plan.name_only.push(planned),
                Tier::Omitted => {}
            }
        }

        let fragment = compile(&emitted_plan, &context_reason(&context), request.format);

        // Activation counters move only for what was actually emitted
        for entry in &emitted {
            if let Some(mut scoped) = self.store.get_node(&entry.id)? {
                scoped.behavior.record_activation();
                self.store.update_node(scoped.origin, &scoped.behavior)?;
            }
        }

        info!(
            session = %request.session_id,
            emitted = emitted.len(),
            suppressed = outcome.suppressed.len(),
            tokens = emitted_plan.total_tokens,
            "activation complete"
        );
        Ok(ActivateResult {
            fragment,
            emitted,
            suppressed: outcome.suppressed,
            total_tokens: emitted_plan.total_tokens,
            budget: plan.budget,
            exceeded: plan.exceeded,
        })
    }

    // ==================== Curation ====================

    pub fn forget(&self, id: &str, reason: Option<&str>) -> Result<CurationOutcome> {
        Curator::new(&self.store).forget(id, reason, None)
    }

    pub fn deprecate(
        &self,
        id: &str,
        reason: &str,
        replacement: Option<&str>,
    ) -> Result<CurationOutcome> {
        Curator::new(&self.store).deprecate(id, reason, replacement, None)
    }

    pub fn restore(&self, id: &str) -> Result<CurationOutcome> {
        Curator::new(&self.store).restore(id)
    }

    pub fn merge(&self, surviving_id: &str, merged_id: &str) -> Result<MergeOutcome> {
        Curator::new(&self.store).merge(surviving_id, merged_id)
    }

    // ==================== Maintenance ====================

    /// Find and merge near-duplicate pairs in one scope.
    pub fn deduplicate(
        &self,
        scope: Scope,
        threshold: Option<f64>,
        dry_run: bool,
    ) -> Result<DeduplicateReport> {
        let threshold = threshold
            .unwrap_or(self.config.auto_merge_threshold)
            .clamp(0.0, 1.0);
        let behaviors = self
            .store
            .scope(scope)?
            .query_nodes(&BehaviorQuery::new().active_only())?;

        let mut report = DeduplicateReport {
            dry_run,
            ..DeduplicateReport::default()
        };
        let mut consumed: HashSet<String> = HashSet::new();
        let curator = Curator::new(&self.store);

        for i in 0..behaviors.len() {
            for j in (i + 1)..behaviors.len() {
                let a = &behaviors[i];
                let b = &behaviors[j];
                if consumed.contains(&a.id) || consumed.contains(&b.id) {
                    continue;
                }
                let score = similarity(a, b).score;
                if score < threshold {
                    continue;
                }

                // Higher confidence survives; ties keep the lower id
                let (survivor, loser) = if (b.confidence, &a.id) > (a.confidence, &b.id) {
                    (b, a)
                } else {
                    (a, b)
                };
                debug!(survivor = %survivor.id, loser = %loser.id, score, "duplicate pair");
                if !dry_run {
                    curator.merge(&survivor.id, &loser.id)?;
                }
                consumed.insert(loser.id.clone());
                report.pairs.push(DeduplicatePair {
                    surviving_id: survivor.id.clone(),
                    merged_id: loser.id.clone(),
                    score,
                });
            }
        }

        Ok(report)
    }

    /// Derive `similar-to`/`overrides` edges in one scope.
    pub fn derive_edges(
        &self,
        scope: Scope,
        clear: bool,
        dry_run: bool,
    ) -> Result<EdgeDerivationReport> {
        derive_edges(
            self.store.scope(scope)?,
            &self.config,
            EdgeDeriveOptions { clear, dry_run },
            &CancellationFlag::new(),
        )
    }

    /// Run the validation sweep over one scope, or both when `None`.
    pub fn validate(&self, scope: Option<Scope>) -> Result<Vec<(Scope, ValidationReport)>> {
        let scopes: Vec<Scope> = match scope {
            Some(scope) => vec![scope],
            None if self.store.has_local() => vec![Scope::Local, Scope::Global],
            None => vec![Scope::Global],
        };

        let mut reports = Vec::new();
        for scope in scopes {
            reports.push((scope, validate_store(self.store.scope(scope)?)?));
        }
        Ok(reports)
    }

    /// Seed (or re-seed) the global meta-behaviors.
    pub fn seed_globals(&self) -> Result<SeedReport> {
        seed(self.store.scope(Scope::Global)?)
    }

    // ==================== Snapshots ====================

    /// Write a snapshot of one scope. Returns the file path.
    pub fn backup(
        &self,
        scope: Scope,
        output: Option<PathBuf>,
        compress: bool,
    ) -> Result<PathBuf> {
        let path = match output {
            Some(path) => path,
            None => {
                std::fs::create_dir_all(&self.backups_dir)?;
                self.backups_dir.join(format!(
                    "floop-{}-{}.floop",
                    scope,
                    Utc::now().format("%Y%m%dT%H%M%SZ")
                ))
            }
        };
        backup_to_file(self.store.scope(scope)?, &path, compress)?;
        Ok(path)
    }

    /// Restore a snapshot file into one scope.
    pub fn restore_backup(
        &self,
        scope: Scope,
        file: &std::path::Path,
        mode: RestoreMode,
    ) -> Result<RestoreSummary> {
        restore_from_file(self.store.scope(scope)?, file, mode, &CancellationFlag::new())
    }

    /// Verify a snapshot file without restoring it.
    pub fn verify_backup(&self, file: &std::path::Path) -> Result<VerifyReport> {
        let data = std::fs::read(file)?;
        verify(&data)
    }

    // ==================== Introspection ====================

    /// Node/edge/correction counts per scope.
    pub fn stats(&self) -> Result<EngineStats> {
        let mut stats = EngineStats {
            global: self.scope_stats(Scope::Global)?,
            local: None,
        };
        if self.store.has_local() {
            stats.local = Some(self.scope_stats(Scope::Local)?);
        }
        Ok(stats)
    }

    fn scope_stats(&self, scope: Scope) -> Result<ScopeStats> {
        let store = self.store.scope(scope)?;
        let mut by_kind: BTreeMap<String, u64> = BTreeMap::new();
        for behavior in store.query_nodes(&BehaviorQuery::new())? {
            *by_kind.entry(behavior.kind.to_string()).or_insert(0) += 1;
        }
        Ok(ScopeStats {
            nodes: store.count_nodes()?,
            edges: store.count_edges()?,
            corrections: self.log_for(scope)?.read_all()?.len() as u64,
            by_kind,
        })
    }

    /// Semantic comparison of two behaviors, bounded by the configured
    /// timeout and falling back to the lexical score.
    pub async fn semantic_compare(&self, a_id: &str, b_id: &str) -> Result<f64> {
        let a = self.show(a_id)?.behavior;
        let b = self.show(b_id)?.behavior;
        Ok(compare_with_fallback(
            self.analyzer.as_deref(),
            &a,
            &b,
            Duration::from_secs(self.config.semantic_timeout_secs),
            &CancellationFlag::new(),
        )
        .await)
    }

    /// Durably commit and release both scopes.
    pub fn close(&self) -> Result<()> {
        self.store.sync()?;
        self.store.close()
    }
}

/// Human-readable activation reason derived from a context.
fn context_reason(context: &Context) -> String {
    let mut parts = Vec::new();
    if let Some(language) = &context.file_language {
        parts.push(format!("language={}", language));
    }
    if let Some(task) = &context.task {
        parts.push(format!("task={}", task));
    }
    if let Some(file) = &context.file_path {
        parts.push(format!("file={}", file));
    }
    if parts.is_empty() {
        "session context".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::ephemeral(dir.path(), EngineConfig::default()).unwrap();
        (dir, engine)
    }

    fn learn_python(engine: &Engine, right: &str) -> LearnOutcome {
        engine
            .learn(LearnRequest {
                wrong: "did something else".to_string(),
                right: right.to_string(),
                file: Some("script.py".to_string()),
                task: Some("refactor".to_string()),
                ..LearnRequest::default()
            })
            .unwrap()
    }

    #[test]
    fn test_learn_then_show() {
        let (_dir, engine) = engine();
        let outcome = learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let shown = engine.show(&outcome.behavior_id).unwrap();
        assert_eq!(
            shown.behavior.when.get("language").map(String::as_str),
            Some("python")
        );
        assert!(shown.behavior.content.tags.contains("pathlib"));
    }

    #[test]
    fn test_learn_rejects_empty_right() {
        let (_dir, engine) = engine();
        let result = engine.learn(LearnRequest {
            wrong: "w".to_string(),
            right: "  <div></div> ".to_string(),
            ..LearnRequest::default()
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_active_respects_context() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let python = Context::new().with_file("x.py").with_task("refactor");
        let resolved = engine.active(&python).unwrap();
        assert!(resolved
            .active
            .iter()
            .any(|b| b.content.canonical.contains("pathlib")));

        let go = Context::new().with_file("x.go").with_task("refactor");
        let resolved = engine.active(&go).unwrap();
        assert!(!resolved
            .active
            .iter()
            .any(|b| b.content.canonical.contains("pathlib")));
    }

    #[test]
    fn test_prompt_renders_active_behaviors() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let context = Context::new().with_file("x.py").with_task("refactor");
        let result = engine
            .prompt(&context, Some(2000), true, OutputFormat::Markdown)
            .unwrap();
        assert!(result.fragment.contains("## Dynamic Context Update"));
        assert!(result.fragment.contains("pathlib.Path"));
        assert!(result.behavior_count >= 1);
    }

    #[test]
    fn test_prompt_untiered_renders_everything_full() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let context = Context::new().with_file("x.py").with_task("refactor");
        let tight = engine.prompt(&context, Some(10), true, OutputFormat::Plain).unwrap();
        let untiered = engine.prompt(&context, Some(10), false, OutputFormat::Plain).unwrap();
        assert!(untiered.total_tokens >= tight.total_tokens);
        assert!(untiered.fragment.contains("pathlib.Path"));
    }

    #[test]
    fn test_activate_emits_then_suppresses() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let request = ActivateRequest {
            file: Some("x.py".to_string()),
            task: Some("refactor".to_string()),
            environment: None,
            token_budget: Some(2000),
            session_id: "session-1".to_string(),
            format: OutputFormat::Markdown,
        };

        let first = engine.activate(request.clone()).unwrap();
        assert!(!first.emitted.is_empty());
        assert!(first.fragment.contains("pathlib.Path"));

        let second = engine.activate(request).unwrap();
        assert!(second.emitted.is_empty());
        assert!(!second.suppressed.is_empty());
        assert_eq!(second.fragment, "");
    }

    #[test]
    fn test_activate_bumps_stats_only_for_emitted() {
        let (_dir, engine) = engine();
        let outcome = learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let request = ActivateRequest {
            file: Some("x.py".to_string()),
            task: Some("refactor".to_string()),
            environment: None,
            token_budget: Some(2000),
            session_id: "session-2".to_string(),
            format: OutputFormat::Plain,
        };
        engine.activate(request.clone()).unwrap();
        let after_first = engine.show(&outcome.behavior_id).unwrap().behavior;
        assert_eq!(after_first.stats.times_activated, 1);

        // Second call suppresses, so the counter stays put
        engine.activate(request).unwrap();
        let after_second = engine.show(&outcome.behavior_id).unwrap().behavior;
        assert_eq!(after_second.stats.times_activated, 1);
    }

    #[test]
    fn test_list_filters_by_scope_and_tag() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let all = engine.list(None, None).unwrap();
        // Seeds plus the learned behavior
        assert!(all.len() >= 4);

        let tagged = engine.list(None, Some("pathlib")).unwrap();
        assert_eq!(tagged.len(), 1);

        let global_only = engine.list(Some(Scope::Global), Some("pathlib")).unwrap();
        assert_eq!(global_only.len(), 1);
    }

    #[test]
    fn test_why_explains() {
        let (_dir, engine) = engine();
        let outcome = learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let wrong_context = Context::new().with_file("x.go");
        let explanation = engine.why(&outcome.behavior_id, &wrong_context).unwrap();
        assert!(!explanation.active);
        assert!(!explanation.checks.is_empty());
    }

    #[test]
    fn test_curation_round_trip_via_engine() {
        let (_dir, engine) = engine();
        let outcome = learn_python(&engine, "use pathlib.Path for all filesystem paths");

        engine.forget(&outcome.behavior_id, Some("testing")).unwrap();
        let context = Context::new().with_file("x.py").with_task("refactor");
        assert!(engine
            .active(&context)
            .unwrap()
            .active
            .iter()
            .all(|b| b.id != outcome.behavior_id));

        engine.restore(&outcome.behavior_id).unwrap();
        assert!(engine
            .active(&context)
            .unwrap()
            .active
            .iter()
            .any(|b| b.id == outcome.behavior_id));
    }

    #[test]
    fn test_deduplicate_merges_near_duplicates() {
        let (_dir, engine) = engine();
        // Force both into the same scope with distinct-enough wording to
        // dodge the pipeline's own auto-merge
        engine
            .learn(LearnRequest {
                wrong: "w".to_string(),
                right: "always run the full test suite before committing".to_string(),
                file: Some("a.py".to_string()),
                scope: Some(Scope::Global),
                ..LearnRequest::default()
            })
            .unwrap();
        engine
            .learn(LearnRequest {
                wrong: "w".to_string(),
                right: "always run the full test suite before pushing".to_string(),
                file: Some("a.py".to_string()),
                scope: Some(Scope::Global),
                ..LearnRequest::default()
            })
            .unwrap();

        let dry = engine.deduplicate(Scope::Global, Some(0.7), true).unwrap();
        assert_eq!(dry.pairs.len(), 1);

        let wet = engine.deduplicate(Scope::Global, Some(0.7), false).unwrap();
        assert_eq!(wet.pairs.len(), 1);
        let merged = engine.show(&wet.pairs[0].merged_id).unwrap().behavior;
        assert_eq!(merged.kind, BehaviorKind::Merged);
    }

    #[test]
    fn test_derive_edges_and_stats() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let report = engine.derive_edges(Scope::Global, false, false).unwrap();
        // Scan ran over seeds + learned behavior without error
        assert!(report.pairs_scanned > 0);

        let stats = engine.stats().unwrap();
        assert!(stats.global.nodes >= 4);
        assert_eq!(stats.global.corrections, 1);
    }

    #[test]
    fn test_validate_clean_engine() {
        let (_dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        for (_, report) in engine.validate(None).unwrap() {
            assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
        }
    }

    #[test]
    fn test_backup_verify_restore_cycle() {
        let (dir, engine) = engine();
        learn_python(&engine, "use pathlib.Path for all filesystem paths");

        let path = engine
            .backup(Scope::Global, Some(dir.path().join("snap.floop")), true)
            .unwrap();
        let report = engine.verify_backup(&path).unwrap();
        assert!(report.ok);

        let nodes_before = engine.stats().unwrap().global.nodes;
        let summary = engine
            .restore_backup(Scope::Global, &path, RestoreMode::Replace)
            .unwrap();
        assert_eq!(summary.nodes_inserted, nodes_before);
        assert_eq!(engine.stats().unwrap().global.nodes, nodes_before);
    }

    #[tokio::test]
    async fn test_semantic_compare_without_analyzer() {
        let (_dir, engine) = engine();
        let a = learn_python(&engine, "use pathlib.Path for all filesystem paths");
        let b = learn_python(&engine, "never commit secrets to the repository");

        let score = engine.semantic_compare(&a.behavior_id, &b.behavior_id).await.unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_sqlite_engine_open_and_seed() {
        let dir = tempfile::tempdir().unwrap();
        let global = ScopePaths::at(dir.path().join("global/.floop"));
        let local = ScopePaths::at(dir.path().join("project/.floop"));

        let engine =
            Engine::open(Some(local.clone()), global.clone(), EngineConfig::default()).unwrap();
        assert!(global.manifest().exists());
        assert!(local.manifest().exists());
        assert!(engine.stats().unwrap().global.nodes >= 3);

        engine.close().unwrap();
    }
}
