//! Tiered assembly of prompt fragments under a token budget.

pub mod compile;
pub mod summarize;
pub mod tiering;

pub use compile::{compile, OutputFormat};
pub use summarize::{summarize, DEFAULT_SUMMARY_LEN};
pub use tiering::{
    assign_tiers, InjectionPlan, PlannedBehavior, RankedBehavior, Tier, TokenCostModel,
};
