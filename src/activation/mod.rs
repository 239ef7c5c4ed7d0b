//! Predicate evaluation and conflict resolution.
//!
//! The activation path: evaluate each behavior's `when` predicate against
//! the current [`Context`](crate::context::Context), then resolve
//! `overrides`/`conflicts` relations over the matched set.

pub mod evaluator;
pub mod resolver;

pub use evaluator::{
    active_behaviors, explain, is_active, ActivationExplanation, ConditionCheck,
};
pub use resolver::{resolve, ExcludedEntry, OverriddenEntry, ResolvedActivation};
