//! Persisted per-session injection state.
//!
//! One directory per session under the sessions root, owner-only
//! permissions, state written via temp file + rename. The state is saved
//! before an activation response is returned, so a crash after emission
//! cannot cause double-injection on restart.

use crate::assembly::tiering::Tier;
use crate::error::Result;
use crate::fsio::{atomic_write, create_private_dir, restrict_file};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Record of one behavior's injections within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionRecord {
    pub tier: Tier,
    pub activation: f64,
    pub token_cost: usize,
    pub injected_at: DateTime<Utc>,
    /// How many times the behavior has been emitted this session.
    pub count: u64,
}

/// Everything remembered about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub prompt_count: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub injections: BTreeMap<String, InjectionRecord>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            prompt_count: 0,
            started_at: now,
            updated_at: now,
            injections: BTreeMap::new(),
        }
    }

    /// Record an emission at the given tier.
    pub fn record_injection(
        &mut self,
        behavior_id: impl Into<String>,
        tier: Tier,
        activation: f64,
        token_cost: usize,
    ) {
        let now = Utc::now();
        self.updated_at = now;
        self.injections
            .entry(behavior_id.into())
            .and_modify(|record| {
                record.tier = tier;
                record.activation = activation;
                record.token_cost = token_cost;
                record.injected_at = now;
                record.count += 1;
            })
            .or_insert(InjectionRecord {
                tier,
                activation,
                token_cost,
                injected_at: now,
                count: 1,
            });
    }
}

/// Loads and saves session state files under a sessions root.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for one session.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root
            .join(format!("floop-session-{}", sanitize_session_id(session_id)))
    }

    fn state_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("state.json")
    }

    /// Load a session's state, or start fresh if none exists or the file
    /// is unreadable.
    pub fn load(&self, session_id: &str) -> Result<SessionState> {
        let path = self.state_path(session_id);
        if !path.exists() {
            return Ok(SessionState::new(session_id));
        }
        match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(state) => Ok(state),
                Err(e) => {
                    warn!(session = session_id, error = %e, "session state unreadable, starting fresh");
                    Ok(SessionState::new(session_id))
                }
            },
            Err(e) => {
                warn!(session = session_id, error = %e, "session state unreadable, starting fresh");
                Ok(SessionState::new(session_id))
            }
        }
    }

    /// Persist a session's state atomically with owner-only permissions.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let dir = self.session_dir(&state.session_id);
        create_private_dir(&dir)?;

        let path = self.state_path(&state.session_id);
        let data = serde_json::to_vec_pretty(state)?;
        atomic_write(&path, &data)?;
        restrict_file(&path)?;
        Ok(())
    }

    /// Path of the advisory lock file for a session.
    pub fn lock_path(&self, session_id: &str) -> Result<PathBuf> {
        let dir = self.session_dir(session_id);
        create_private_dir(&dir)?;
        Ok(dir.join(".lock"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Session ids come from the hook boundary; keep only filesystem-safe
/// characters.
fn sanitize_session_id(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
