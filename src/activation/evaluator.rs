//! Evaluation of behavior `when` predicates against a context.

use crate::context::Context;
use crate::graph::types::Behavior;
use serde::{Deserialize, Serialize};

/// Whether a behavior's predicate matches the context.
///
/// Every `when` entry must equal the corresponding context value, compared
/// case-sensitively after trimming. A missing context value never matches.
/// An empty predicate is always active.
pub fn is_active(behavior: &Behavior, context: &Context) -> bool {
    behavior
        .when
        .iter()
        .all(|(key, required)| match context.get(key) {
            Some(actual) => actual.trim() == required.trim(),
            None => false,
        })
}

/// One condition's evaluation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionCheck {
    pub field: String,
    pub required: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    pub matched: bool,
}

/// Full explanation of an activation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationExplanation {
    pub behavior_id: String,
    pub active: bool,
    pub checks: Vec<ConditionCheck>,
    pub reason: String,
}

/// Explain why a behavior does or does not activate in a context.
pub fn explain(behavior: &Behavior, context: &Context) -> ActivationExplanation {
    let checks: Vec<ConditionCheck> = behavior
        .when
        .iter()
        .map(|(key, required)| {
            let actual = context.get(key).map(str::to_string);
            let matched = actual
                .as_deref()
                .map(|a| a.trim() == required.trim())
                .unwrap_or(false);
            ConditionCheck {
                field: key.clone(),
                required: required.clone(),
                actual,
                matched,
            }
        })
        .collect();

    let active = checks.iter().all(|c| c.matched);
    let reason = if behavior.when.is_empty() {
        "unconditional".to_string()
    } else if active {
        let matched: Vec<String> = checks
            .iter()
            .map(|c| format!("{}={}", c.field, c.required))
            .collect();
        format!("all conditions hold: {}", matched.join(", "))
    } else {
        let failed: Vec<String> = checks
            .iter()
            .filter(|c| !c.matched)
            .map(|c| match &c.actual {
                Some(actual) => format!("{} required '{}', found '{}'", c.field, c.required, actual),
                None => format!("{} required '{}', not present", c.field, c.required),
            })
            .collect();
        failed.join("; ")
    };

    ActivationExplanation {
        behavior_id: behavior.id.clone(),
        active,
        checks,
        reason,
    }
}

/// Filter a slice of behaviors down to those active in the context.
pub fn active_behaviors<'a>(behaviors: &'a [Behavior], context: &Context) -> Vec<&'a Behavior> {
    behaviors
        .iter()
        .filter(|b| b.kind.is_active() && is_active(b, context))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::BehaviorKind;

    fn behavior() -> Behavior {
        Behavior::new(BehaviorKind::Directive, "b", "use pathlib")
            .with_when("language", "python")
            .with_when("task", "refactor")
    }

    fn python_ctx() -> Context {
        Context::new().with_file("tool.py").with_task("refactor")
    }

    #[test]
    fn test_all_conditions_must_hold() {
        assert!(is_active(&behavior(), &python_ctx()));

        let wrong_task = Context::new().with_file("tool.py").with_task("review");
        assert!(!is_active(&behavior(), &wrong_task));
    }

    #[test]
    fn test_missing_context_value_is_non_match() {
        let no_task = Context::new().with_file("tool.py");
        assert!(!is_active(&behavior(), &no_task));
    }

    #[test]
    fn test_empty_when_always_active() {
        let unconditional = Behavior::new(BehaviorKind::Directive, "b", "always");
        assert!(is_active(&unconditional, &Context::new()));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let b = Behavior::new(BehaviorKind::Directive, "b", "content").with_when("task", "Review");
        let ctx = Context::new().with_task("review");
        assert!(!is_active(&b, &ctx));
    }

    #[test]
    fn test_explain_reports_each_condition() {
        let explanation = explain(&behavior(), &python_ctx());
        assert!(explanation.active);
        assert_eq!(explanation.checks.len(), 2);
        assert!(explanation.checks.iter().all(|c| c.matched));
        assert!(explanation.reason.contains("language=python"));
    }

    #[test]
    fn test_explain_names_the_failure() {
        let ctx = Context::new().with_file("tool.go").with_task("refactor");
        let explanation = explain(&behavior(), &ctx);
        assert!(!explanation.active);
        assert!(explanation.reason.contains("language required 'python', found 'go'"));
    }

    #[test]
    fn test_explain_unconditional() {
        let unconditional = Behavior::new(BehaviorKind::Directive, "b", "always");
        let explanation = explain(&unconditional, &Context::new());
        assert!(explanation.active);
        assert_eq!(explanation.reason, "unconditional");
    }

    #[test]
    fn test_active_behaviors_skips_curation_states() {
        use crate::graph::types::CurationRecord;
        let mut forgotten = Behavior::new(BehaviorKind::Forgotten, "f", "forgotten content");
        forgotten
            .set_curation_record(&CurationRecord::Forgotten {
                original_kind: BehaviorKind::Directive,
                reason: None,
                at: chrono::Utc::now(),
                actor: None,
            })
            .unwrap();
        let live = Behavior::new(BehaviorKind::Directive, "d", "live content");

        let all = vec![forgotten, live];
        let active = active_behaviors(&all, &Context::new());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "d");
    }
}
