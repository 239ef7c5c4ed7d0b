//! Correction records.

use crate::sanitize::{sanitize_path, sanitize_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context captured at the moment a correction happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Snapshot the relevant parts of an activation context.
    pub fn from_context(context: &crate::context::Context) -> Self {
        Self {
            file_path: context.file_path.clone(),
            file_ext: context.file_ext.clone(),
            file_language: context.file_language.clone(),
            task: context.task.clone(),
            branch: context.branch.clone(),
            environment: context.environment.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// An observed mismatch between what the agent did and what it should
/// have done. Immutable once appended to the corrections log, apart from
/// the `processed` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub context_snapshot: ContextSnapshot,
    /// What the agent did (sanitized).
    pub agent_action: String,
    /// What it should have done (sanitized).
    pub corrected_action: String,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Correction {
    /// Create an unprocessed correction with sanitized fields.
    pub fn new(
        agent_action: impl AsRef<str>,
        corrected_action: impl AsRef<str>,
        mut context_snapshot: ContextSnapshot,
    ) -> Self {
        context_snapshot.file_path = context_snapshot
            .file_path
            .as_deref()
            .map(sanitize_path)
            .filter(|p| !p.is_empty());
        context_snapshot.task = context_snapshot
            .task
            .as_deref()
            .map(sanitize_text)
            .filter(|t| !t.is_empty());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            context_snapshot,
            agent_action: sanitize_text(agent_action.as_ref()),
            corrected_action: sanitize_text(corrected_action.as_ref()),
            processed: false,
            processed_at: None,
        }
    }

    /// Flag the correction processed now.
    pub fn mark_processed(&mut self) {
        self.processed = true;
        self.processed_at = Some(Utc::now());
    }
}
