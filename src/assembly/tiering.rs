//! Tier assignment under a token budget.
//!
//! Behaviors are ranked, then upgraded best-first until the budget runs
//! out: each behavior climbs NameOnly → Summary → Full, and the walk
//! stops at the first upgrade the budget cannot absorb. Because the
//! upgrade order is fixed for a given ranking, a larger budget can only
//! apply more upgrades — a behavior's tier never drops when the budget
//! grows. Constraints and the `min_full` top-ranked behaviors are
//! floored at Full; the plan reports when honoring a floor pushed the
//! total past the budget.

use crate::assembly::summarize::{summarize, DEFAULT_SUMMARY_LEN};
use crate::graph::types::{Behavior, BehaviorKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Rendering fidelity of one behavior in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Full,
    Summary,
    NameOnly,
    Omitted,
}

impl Tier {
    /// Fidelity rank: higher means more detail.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Full => 3,
            Self::Summary => 2,
            Self::NameOnly => 1,
            Self::Omitted => 0,
        }
    }
}

/// Token cost estimation per tier.
///
/// Flat per-tier costs are the fast model; the precise estimator divides
/// the rendered text length by four characters per token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenCostModel {
    pub full_cost: usize,
    pub summary_cost: usize,
    pub name_only_cost: usize,
    /// Estimate from rendered content length instead of flat costs.
    pub precise: bool,
}

impl Default for TokenCostModel {
    fn default() -> Self {
        Self {
            full_cost: 80,
            summary_cost: 30,
            name_only_cost: 10,
            precise: true,
        }
    }
}

impl TokenCostModel {
    /// Estimated cost of rendering one behavior at one tier.
    pub fn cost(&self, behavior: &Behavior, tier: Tier) -> usize {
        if !self.precise {
            return match tier {
                Tier::Full => self.full_cost,
                Tier::Summary => self.summary_cost,
                Tier::NameOnly => self.name_only_cost,
                Tier::Omitted => 0,
            };
        }
        let chars = match tier {
            Tier::Full => behavior.content.canonical.len(),
            Tier::Summary => summarize(behavior, DEFAULT_SUMMARY_LEN).len(),
            Tier::NameOnly => behavior.name.len(),
            Tier::Omitted => 0,
        };
        // ~4 characters per token, minimum one token for non-empty text
        if chars == 0 {
            0
        } else {
            (chars + 3) / 4
        }
    }
}

/// A behavior with the activation it arrived with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedBehavior {
    pub behavior: Behavior,
    pub activation: f64,
}

impl RankedBehavior {
    /// Relevance score: PageRank × confidence × activation × priority
    /// factor. A node with no persisted PageRank uses the uniform score
    /// for a graph of `population` nodes.
    pub fn score(&self, population: usize) -> f64 {
        let uniform = 1.0 / population.max(1) as f64;
        let pagerank = self.behavior.pagerank().unwrap_or(uniform);
        pagerank * self.behavior.confidence * self.activation * self.behavior.priority_factor()
    }
}

/// One entry of an injection plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedBehavior {
    pub behavior: Behavior,
    pub activation: f64,
    pub tier: Tier,
    pub tokens: usize,
}

/// A tiered plan ready for compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectionPlan {
    pub full: Vec<PlannedBehavior>,
    pub summary: Vec<PlannedBehavior>,
    pub name_only: Vec<PlannedBehavior>,
    /// Ids of behaviors that did not fit at all.
    pub omitted: Vec<String>,
    pub total_tokens: usize,
    pub budget: usize,
    /// True when floors forced the total past the budget.
    pub exceeded: bool,
}

impl InjectionPlan {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.summary.is_empty() && self.name_only.is_empty()
    }

    /// Entries of every emitted tier, Full first, rank order preserved.
    pub fn emitted(&self) -> impl Iterator<Item = &PlannedBehavior> {
        self.full
            .iter()
            .chain(self.summary.iter())
            .chain(self.name_only.iter())
    }
}

/// Assign tiers under a token budget.
///
/// Floors come first: constraints and the `min_full` top-ranked
/// behaviors are charged at Full even when that exceeds the budget
/// (reported via `exceeded`). The remaining behaviors start at Omitted
/// and upgrade through NameOnly → Summary → Full in rank order,
/// stopping at the first upgrade the budget cannot absorb. The upgrade
/// sequence is fixed for a given ranking, so raising the budget only
/// ever applies more upgrades: no behavior's tier can drop when the
/// budget grows.
pub fn assign_tiers(
    mut ranked: Vec<RankedBehavior>,
    budget: usize,
    min_full: usize,
    cost_model: &TokenCostModel,
) -> InjectionPlan {
    let population = ranked.len();
    ranked.sort_by(|a, b| {
        b.score(population)
            .partial_cmp(&a.score(population))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.behavior.id.cmp(&b.behavior.id))
    });

    let budget_i = i64::try_from(budget).unwrap_or(i64::MAX);
    let mut tiers = vec![Tier::Omitted; ranked.len()];
    let mut total: i64 = 0;

    // Floors are charged up front
    for (rank, item) in ranked.iter().enumerate() {
        if item.behavior.kind == BehaviorKind::Constraint || rank < min_full {
            tiers[rank] = Tier::Full;
            total += cost_model.cost(&item.behavior, Tier::Full) as i64;
        }
    }
    let exceeded = total > budget_i;

    // Upgrade the rest, best-ranked first, each through its tiers
    'upgrades: for (rank, item) in ranked.iter().enumerate() {
        if tiers[rank] == Tier::Full {
            continue;
        }
        for level in [Tier::NameOnly, Tier::Summary, Tier::Full] {
            let delta = cost_model.cost(&item.behavior, level) as i64
                - cost_model.cost(&item.behavior, tiers[rank]) as i64;
            if total + delta > budget_i {
                break 'upgrades;
            }
            total += delta;
            tiers[rank] = level;
        }
    }

    let mut plan = InjectionPlan {
        budget,
        exceeded,
        total_tokens: usize::try_from(total.max(0)).unwrap_or(0),
        ..InjectionPlan::default()
    };
    for (rank, item) in ranked.into_iter().enumerate() {
        let tier = tiers[rank];
        let planned = PlannedBehavior {
            tokens: cost_model.cost(&item.behavior, tier),
            activation: item.activation,
            tier,
            behavior: item.behavior,
        };
        match tier {
            Tier::Full => plan.full.push(planned),
            Tier::Summary => plan.summary.push(planned),
            Tier::NameOnly => plan.name_only.push(planned),
            Tier::Omitted => plan.omitted.push(planned.behavior.id),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ranked(id: &str, kind: BehaviorKind, canonical: &str, activation: f64) -> RankedBehavior {
        RankedBehavior {
            behavior: Behavior::new(kind, id, canonical).with_id(id).with_confidence(0.8),
            activation,
        }
    }

    fn flat_model() -> TokenCostModel {
        TokenCostModel {
            precise: false,
            ..TokenCostModel::default()
        }
    }

    #[test]
    fn test_everything_fits_full() {
        let items = vec![
            ranked("a", BehaviorKind::Directive, "content a", 0.9),
            ranked("b", BehaviorKind::Directive, "content b", 0.8),
        ];
        let plan = assign_tiers(items, 200, 0, &flat_model());
        assert_eq!(plan.full.len(), 2);
        assert_eq!(plan.total_tokens, 160);
        assert!(!plan.exceeded);
    }

    #[test]
    fn test_budget_degrades_tail() {
        let items: Vec<RankedBehavior> = (0..4)
            .map(|i| {
                ranked(
                    &format!("b{}", i),
                    BehaviorKind::Directive,
                    "content",
                    1.0 - i as f64 * 0.1,
                )
            })
            .collect();
        // One full (80) + rest must degrade under 150
        let plan = assign_tiers(items, 150, 0, &flat_model());
        assert_eq!(plan.full.len(), 1);
        assert!(plan.summary.len() >= 1);
        assert!(plan.total_tokens <= 150);
        assert!(!plan.exceeded);
    }

    #[test]
    fn test_constraints_never_below_full() {
        let items = vec![
            ranked("c1", BehaviorKind::Constraint, "never force push", 0.9),
            ranked("c2", BehaviorKind::Constraint, "never commit secrets", 0.8),
            ranked("c3", BehaviorKind::Constraint, "never edit main directly", 0.7),
        ];
        let plan = assign_tiers(items, 80, 0, &flat_model());
        assert_eq!(plan.full.len(), 3);
        assert!(plan.exceeded);
        assert_eq!(plan.total_tokens, 240);
    }

    #[test]
    fn test_min_full_reserved() {
        let items: Vec<RankedBehavior> = (0..3)
            .map(|i| {
                ranked(
                    &format!("b{}", i),
                    BehaviorKind::Directive,
                    "content",
                    1.0 - i as f64 * 0.1,
                )
            })
            .collect();
        let plan = assign_tiers(items, 10, 2, &flat_model());
        assert_eq!(plan.full.len(), 2);
        assert!(plan.exceeded);
    }

    #[test]
    fn test_omitted_when_nothing_fits() {
        let items = vec![
            ranked("a", BehaviorKind::Directive, "content", 0.9),
            ranked("b", BehaviorKind::Directive, "content", 0.1),
        ];
        let plan = assign_tiers(items, 80, 0, &flat_model());
        assert_eq!(plan.full.len(), 1);
        assert_eq!(plan.omitted.len(), 1);
        assert_eq!(plan.omitted[0], "b");
    }

    #[test]
    fn test_ranking_orders_by_score() {
        let weak = ranked("weak", BehaviorKind::Directive, "content", 0.1);
        let strong = ranked("strong", BehaviorKind::Directive, "content", 1.0);
        let plan = assign_tiers(vec![weak, strong], 80, 0, &flat_model());
        assert_eq!(plan.full[0].behavior.id, "strong");
    }

    #[test]
    fn test_precise_model_uses_content_length() {
        let model = TokenCostModel::default();
        let short = Behavior::new(BehaviorKind::Directive, "s", "tiny");
        let long = Behavior::new(
            BehaviorKind::Directive,
            "l",
            "a much longer canonical body of guidance text for the estimator",
        );
        assert!(model.cost(&long, Tier::Full) > model.cost(&short, Tier::Full));
        assert_eq!(model.cost(&short, Tier::Full), 1);
        assert_eq!(model.cost(&short, Tier::Omitted), 0);
    }

    fn tier_of(plan: &InjectionPlan, id: &str) -> Tier {
        if plan.full.iter().any(|p| p.behavior.id == id) {
            Tier::Full
        } else if plan.summary.iter().any(|p| p.behavior.id == id) {
            Tier::Summary
        } else if plan.name_only.iter().any(|p| p.behavior.id == id) {
            Tier::NameOnly
        } else {
            Tier::Omitted
        }
    }

    proptest! {
        #[test]
        fn prop_budget_increase_is_monotone(
            budget_low in 0usize..400,
            extra in 0usize..400,
            count in 1usize..10,
        ) {
            let items: Vec<RankedBehavior> = (0..count)
                .map(|i| ranked(
                    &format!("b{:02}", i),
                    BehaviorKind::Directive,
                    "stable canonical content",
                    1.0 - i as f64 * 0.05,
                ))
                .collect();

            let small = assign_tiers(items.clone(), budget_low, 0, &flat_model());
            let large = assign_tiers(items.clone(), budget_low + extra, 0, &flat_model());

            for item in &items {
                let id = &item.behavior.id;
                prop_assert!(
                    tier_of(&large, id).rank() >= tier_of(&small, id).rank(),
                    "behavior {} degraded when budget grew", id
                );
            }
        }
    }
}
