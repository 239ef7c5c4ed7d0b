//! Core types for the behavior graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};
use crate::sanitize::sanitize_text;

/// Condition predicate: a conjunction of equalities over context keys.
///
/// An empty map means the behavior is unconditional.
pub type WhenPredicate = BTreeMap<String, String>;

/// Kind of a behavior node.
///
/// The first four are the active taxonomy; the last three are curation
/// lifecycle states, not kinds a behavior is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorKind {
    #[serde(rename = "directive")]
    Directive,
    #[serde(rename = "constraint")]
    Constraint,
    #[serde(rename = "procedure")]
    Procedure,
    #[serde(rename = "preference")]
    Preference,
    #[serde(rename = "forgotten-behavior")]
    Forgotten,
    #[serde(rename = "deprecated-behavior")]
    Deprecated,
    #[serde(rename = "merged-behavior")]
    Merged,
}

impl BehaviorKind {
    /// Whether this is one of the four active kinds.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Directive | Self::Constraint | Self::Procedure | Self::Preference
        )
    }

    /// Whether this is a curation lifecycle state.
    pub fn is_curation_state(&self) -> bool {
        !self.is_active()
    }

    /// The canonical string form, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::Constraint => "constraint",
            Self::Procedure => "procedure",
            Self::Preference => "preference",
            Self::Forgotten => "forgotten-behavior",
            Self::Deprecated => "deprecated-behavior",
            Self::Merged => "merged-behavior",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "directive" => Some(Self::Directive),
            "constraint" => Some(Self::Constraint),
            "procedure" => Some(Self::Procedure),
            "preference" => Some(Self::Preference),
            "forgotten-behavior" => Some(Self::Forgotten),
            "deprecated-behavior" => Some(Self::Deprecated),
            "merged-behavior" => Some(Self::Merged),
            _ => None,
        }
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content carried by a behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorContent {
    /// The guidance itself. Mandatory, non-empty after sanitization.
    pub canonical: String,
    /// Short form used at the Summary tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Long form with examples or rationale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<String>,
    /// Free-form structured payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub structured: BTreeMap<String, serde_json::Value>,
    /// Semantic tags.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// Where a behavior came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Source category: "correction", "seed", "manual", "merge".
    pub source_type: String,
    /// Correction that produced this behavior, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_id: Option<String>,
    /// When the behavior was created.
    pub created_at: DateTime<Utc>,
    /// Who approved it, for reviewed behaviors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

/// Usage counters for a behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorStats {
    pub times_activated: u64,
    pub times_followed: u64,
    pub times_confirmed: u64,
    pub times_overridden: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for BehaviorStats {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            times_activated: 0,
            times_followed: 0,
            times_confirmed: 0,
            times_overridden: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Curation transition payload, stored under the reserved `curation`
/// metadata key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CurationRecord {
    Forgotten {
        original_kind: BehaviorKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actor: Option<String>,
    },
    Deprecated {
        original_kind: BehaviorKind,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        replaced_by: Option<String>,
        at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actor: Option<String>,
    },
    Merged {
        original_kind: BehaviorKind,
        merged_into: String,
        at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actor: Option<String>,
    },
}

impl CurationRecord {
    /// The kind the behavior had before its first transition.
    pub fn original_kind(&self) -> BehaviorKind {
        match self {
            Self::Forgotten { original_kind, .. }
            | Self::Deprecated { original_kind, .. }
            | Self::Merged { original_kind, .. } => *original_kind,
        }
    }
}

/// Reserved metadata key holding the [`CurationRecord`].
pub const CURATION_METADATA_KEY: &str = "curation";

/// Metadata key holding the last computed PageRank score.
pub const PAGERANK_METADATA_KEY: &str = "pagerank";

/// Metadata key marking a behavior as an unreviewed proposal.
pub const NEEDS_REVIEW_METADATA_KEY: &str = "needs_review";

/// A behavior: an addressable unit of learned guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    pub id: String,
    pub kind: BehaviorKind,
    pub name: String,
    pub content: BehaviorContent,
    /// Conjunction of equalities over context keys. Empty = unconditional.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub when: WhenPredicate,
    pub confidence: f64,
    pub priority: i64,
    pub provenance: Provenance,
    pub stats: BehaviorStats,
    /// Ids of behaviors this one requires. Mirrored by `requires` edges.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub requires: BTreeSet<String>,
    /// Ids of behaviors this one overrides. Mirrored by `overrides` edges.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub overrides: BTreeSet<String>,
    /// Ids of behaviors this one conflicts with. Mirrored by `conflicts`
    /// edges.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicts: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Behavior {
    /// Create a behavior with a fresh id and sanitized canonical content.
    pub fn new(kind: BehaviorKind, name: impl Into<String>, canonical: impl AsRef<str>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            name: sanitize_text(name.into().as_ref()),
            content: BehaviorContent {
                canonical: sanitize_text(canonical.as_ref()),
                ..BehaviorContent::default()
            },
            when: BTreeMap::new(),
            confidence: 0.5,
            priority: 0,
            provenance: Provenance {
                source_type: "manual".to_string(),
                correction_id: None,
                created_at: now,
                approved_by: None,
            },
            stats: BehaviorStats::default(),
            requires: BTreeSet::new(),
            overrides: BTreeSet::new(),
            conflicts: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_when(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.when.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.content.tags.insert(tag.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.content.summary = Some(sanitize_text(summary.into().as_ref()));
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.provenance.source_type = source_type.into();
        self
    }

    /// Validate structural invariants and normalize in place.
    ///
    /// Clamps confidence, re-sanitizes canonical content, and rejects
    /// behaviors whose canonical content is empty afterwards or whose
    /// curation state lacks an original kind.
    pub fn validate(&mut self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_input("behavior id must not be empty"));
        }
        self.content.canonical = sanitize_text(&self.content.canonical);
        if self.content.canonical.is_empty() {
            return Err(Error::invalid_input(
                "behavior canonical content is empty after sanitization",
            ));
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        if self.kind.is_curation_state() && self.curation_record().is_none() {
            return Err(Error::state_violation(format!(
                "behavior '{}' is in curation state {} without a curation record",
                self.id, self.kind
            )));
        }
        Ok(())
    }

    /// The curation record, if the behavior carries one.
    pub fn curation_record(&self) -> Option<CurationRecord> {
        self.metadata
            .get(CURATION_METADATA_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Attach a curation record.
    pub fn set_curation_record(&mut self, record: &CurationRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.metadata.insert(CURATION_METADATA_KEY.to_string(), value);
        Ok(())
    }

    /// Remove the curation record (on restore).
    pub fn clear_curation_record(&mut self) {
        self.metadata.remove(CURATION_METADATA_KEY);
    }

    /// Whether the behavior is an unreviewed proposal.
    pub fn needs_review(&self) -> bool {
        self.metadata
            .get(NEEDS_REVIEW_METADATA_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// The last computed PageRank score, if derivation has run.
    pub fn pagerank(&self) -> Option<f64> {
        self.metadata
            .get(PAGERANK_METADATA_KEY)
            .and_then(|v| v.as_f64())
    }

    /// Multiplier derived from priority, shared by seeding and ranking.
    pub fn priority_factor(&self) -> f64 {
        (1.0 + self.priority as f64 / 10.0).clamp(0.1, 2.0)
    }

    /// Mark the behavior as activated now.
    pub fn record_activation(&mut self) {
        self.stats.times_activated += 1;
        self.stats.updated_at = Utc::now();
    }
}

/// Kind of a typed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "requires")]
    Requires,
    #[serde(rename = "overrides")]
    Overrides,
    #[serde(rename = "conflicts")]
    Conflicts,
    #[serde(rename = "similar-to")]
    SimilarTo,
    #[serde(rename = "learned-from")]
    LearnedFrom,
    #[serde(rename = "deprecated-to")]
    DeprecatedTo,
    #[serde(rename = "merged-into")]
    MergedInto,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requires => "requires",
            Self::Overrides => "overrides",
            Self::Conflicts => "conflicts",
            Self::SimilarTo => "similar-to",
            Self::LearnedFrom => "learned-from",
            Self::DeprecatedTo => "deprecated-to",
            Self::MergedInto => "merged-into",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requires" => Some(Self::Requires),
            "overrides" => Some(Self::Overrides),
            "conflicts" => Some(Self::Conflicts),
            "similar-to" => Some(Self::SimilarTo),
            "learned-from" => Some(Self::LearnedFrom),
            "deprecated-to" => Some(Self::DeprecatedTo),
            "merged-into" => Some(Self::MergedInto),
            _ => None,
        }
    }

    /// Edge kinds spreading activation propagates across.
    pub fn propagates_activation(&self) -> bool {
        matches!(
            self,
            Self::SimilarTo | Self::Requires | Self::Overrides | Self::LearnedFrom
        )
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed typed weighted edge between two behaviors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Weight in (0, 1].
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Edge {
    /// Create an edge with weight clamped into (0, 1].
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight: 1.0,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }

    /// Validate: no self-edges, positive bounded weight.
    pub fn validate(&self) -> Result<()> {
        if self.source == self.target {
            return Err(Error::state_violation(format!(
                "self-edge on '{}' ({})",
                self.source, self.kind
            )));
        }
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(Error::invalid_input(format!(
                "edge weight {} outside (0, 1]",
                self.weight
            )));
        }
        Ok(())
    }
}

/// Direction selector for edge queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    Both,
}

/// Storage scope: a project-local or user-global peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Local,
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// A behavior tagged with the scope it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedBehavior {
    pub behavior: Behavior,
    pub origin: Scope,
}

/// Conjunctive equality query over top-level behavior attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorQuery {
    /// Restrict to a kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<BehaviorKind>,
    /// Restrict to an exact name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Restrict to behaviors carrying this tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Required `when` entries, matched as equalities.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub when: WhenPredicate,
    /// Restrict to active kinds only.
    #[serde(default)]
    pub active_only: bool,
    /// Result cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl BehaviorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: BehaviorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn when(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.when.insert(key.into(), value.into());
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a behavior satisfies every clause of this query.
    pub fn matches(&self, behavior: &Behavior) -> bool {
        if let Some(kind) = self.kind {
            if behavior.kind != kind {
                return false;
            }
        }
        if let Some(ref name) = self.name {
            if &behavior.name != name {
                return false;
            }
        }
        if self.active_only {
            if !behavior.kind.is_active() {
                return false;
            }
            // Unreviewed proposals are persisted but stay inactive
            if behavior.needs_review() {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !behavior.content.tags.contains(tag) {
                return false;
            }
        }
        for (key, value) in &self.when {
            if behavior.when.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            BehaviorKind::Directive,
            BehaviorKind::Constraint,
            BehaviorKind::Procedure,
            BehaviorKind::Preference,
            BehaviorKind::Forgotten,
            BehaviorKind::Deprecated,
            BehaviorKind::Merged,
        ] {
            assert_eq!(BehaviorKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_curation_states() {
        assert!(BehaviorKind::Directive.is_active());
        assert!(BehaviorKind::Forgotten.is_curation_state());
        assert!(!BehaviorKind::Merged.is_active());
    }

    #[test]
    fn test_behavior_validate_clamps_confidence() {
        let mut b = Behavior::new(BehaviorKind::Directive, "n", "use pathlib");
        b.confidence = 3.0;
        b.validate().unwrap();
        assert_eq!(b.confidence, 1.0);
    }

    #[test]
    fn test_behavior_validate_rejects_empty_canonical() {
        let mut b = Behavior::new(BehaviorKind::Directive, "n", "<div></div>");
        assert!(b.validate().is_err());
    }

    #[test]
    fn test_curation_state_requires_record() {
        let mut b = Behavior::new(BehaviorKind::Forgotten, "n", "some content");
        assert!(b.validate().is_err());

        b.set_curation_record(&CurationRecord::Forgotten {
            original_kind: BehaviorKind::Directive,
            reason: None,
            at: Utc::now(),
            actor: None,
        })
        .unwrap();
        b.validate().unwrap();
        assert_eq!(
            b.curation_record().unwrap().original_kind(),
            BehaviorKind::Directive
        );
    }

    #[test]
    fn test_edge_rejects_self_loop() {
        let edge = Edge::new("a", "a", EdgeKind::Requires);
        assert!(edge.validate().is_err());
    }

    #[test]
    fn test_edge_weight_clamped() {
        let edge = Edge::new("a", "b", EdgeKind::SimilarTo).with_weight(7.0);
        assert_eq!(edge.weight, 1.0);
        edge.validate().unwrap();
    }

    #[test]
    fn test_query_matches_when_and_kind() {
        let b = Behavior::new(BehaviorKind::Constraint, "n", "never force push")
            .with_when("language", "rust")
            .with_tag("git");

        assert!(BehaviorQuery::new().kind(BehaviorKind::Constraint).matches(&b));
        assert!(BehaviorQuery::new().when("language", "rust").matches(&b));
        assert!(!BehaviorQuery::new().when("language", "go").matches(&b));
        assert!(BehaviorQuery::new().tag("git").matches(&b));
        assert!(!BehaviorQuery::new().tag("testing").matches(&b));
    }

    #[test]
    fn test_priority_factor_clamped() {
        let mut b = Behavior::new(BehaviorKind::Directive, "n", "c");
        b.priority = 100;
        assert_eq!(b.priority_factor(), 2.0);
        b.priority = -100;
        assert_eq!(b.priority_factor(), 0.1);
        b.priority = 5;
        assert!((b.priority_factor() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_behavior_serde_round_trip() {
        let b = Behavior::new(BehaviorKind::Procedure, "release", "tag then publish")
            .with_when("task", "release")
            .with_tag("git")
            .with_confidence(0.9);
        let json = serde_json::to_string(&b).unwrap();
        let back: Behavior = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }
}
