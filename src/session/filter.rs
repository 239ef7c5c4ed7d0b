//! Session-scoped injection filtering.
//!
//! Prevents spamming an agent with the same behavior over and over
//! within one session: repeats at the same or a lower tier are
//! suppressed unless the behavior's activation jumped (upgrade) or its
//! last injection is old enough to bear repeating (reinforce).

use crate::assembly::tiering::{PlannedBehavior, Tier};
use crate::config::EngineConfig;
use crate::session::state::SessionState;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why an entry was emitted or suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDecision {
    /// First time this session.
    New,
    /// Activation rose by at least the upgrade margin, or the planned
    /// tier is higher than anything emitted before.
    Upgrade,
    /// Long-running session; repeating for reinforcement.
    Reinforce,
    /// Already injected; nothing changed enough to repeat it.
    Suppressed,
}

/// One behavior that passed the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredEmission {
    pub planned: PlannedBehavior,
    pub is_upgrade: bool,
    pub is_reinforce: bool,
}

/// Outcome of filtering a plan against session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub emitted: Vec<FilteredEmission>,
    /// Ids suppressed as same-or-lower-tier repeats.
    pub suppressed: Vec<String>,
}

/// Decide for one planned behavior.
fn decide(planned: &PlannedBehavior, state: &SessionState, config: &EngineConfig) -> FilterDecision {
    let Some(record) = state.injections.get(&planned.behavior.id) else {
        return FilterDecision::New;
    };

    if planned.activation - record.activation >= config.upgrade_margin {
        return FilterDecision::Upgrade;
    }
    if planned.tier.rank() > record.tier.rank() {
        return FilterDecision::Upgrade;
    }

    let age = Utc::now() - record.injected_at;
    if age >= Duration::seconds(config.reinforce_interval_secs as i64) {
        return FilterDecision::Reinforce;
    }

    FilterDecision::Suppressed
}

/// Filter a plan's emitted entries against the session's history and
/// record what survives.
///
/// The state is mutated (injection records updated) but not persisted;
/// the caller saves it before returning the response.
pub fn filter_plan(
    entries: &[PlannedBehavior],
    state: &mut SessionState,
    config: &EngineConfig,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for planned in entries {
        if planned.tier == Tier::Omitted {
            continue;
        }
        let decision = decide(planned, state, config);
        debug!(
            behavior = %planned.behavior.id,
            ?decision,
            "session filter decision"
        );
        match decision {
            FilterDecision::Suppressed => {
                outcome.suppressed.push(planned.behavior.id.clone());
            }
            FilterDecision::New | FilterDecision::Upgrade | FilterDecision::Reinforce => {
                state.record_injection(
                    planned.behavior.id.clone(),
                    planned.tier,
                    planned.activation,
                    planned.tokens,
                );
                outcome.emitted.push(FilteredEmission {
                    planned: planned.clone(),
                    is_upgrade: decision == FilterDecision::Upgrade,
                    is_reinforce: decision == FilterDecision::Reinforce,
                });
            }
        }
    }

    outcome
}
