//! Rendering a tiered plan into a prompt fragment.
//!
//! The compiler is a pure function of the plan plus the trigger reason;
//! an empty plan produces empty output in every format.

use crate::assembly::summarize::{summarize, DEFAULT_SUMMARY_LEN};
use crate::assembly::tiering::{InjectionPlan, PlannedBehavior, Tier};
use crate::graph::types::BehaviorKind;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format for a compiled plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Xml,
    Plain,
}

/// Render a plan in the requested format.
pub fn compile(plan: &InjectionPlan, reason: &str, format: OutputFormat) -> String {
    if plan.is_empty() {
        return String::new();
    }
    match format {
        OutputFormat::Markdown => compile_markdown(plan, reason),
        OutputFormat::Xml => compile_xml(plan),
        OutputFormat::Plain => compile_plain(plan),
    }
}

/// The text a planned behavior contributes at its tier.
fn rendered_text(planned: &PlannedBehavior) -> String {
    match planned.tier {
        Tier::Full => planned.behavior.content.canonical.clone(),
        Tier::Summary => summarize(&planned.behavior, DEFAULT_SUMMARY_LEN),
        Tier::NameOnly => planned.behavior.name.clone(),
        Tier::Omitted => String::new(),
    }
}

fn section_title(kind: BehaviorKind) -> &'static str {
    match kind {
        BehaviorKind::Directive => "Directives",
        BehaviorKind::Constraint => "Constraints",
        BehaviorKind::Procedure => "Procedures",
        BehaviorKind::Preference => "Preferences",
        // Curation states never reach a plan; group them defensibly anyway
        BehaviorKind::Forgotten | BehaviorKind::Deprecated | BehaviorKind::Merged => "Other",
    }
}

fn compile_markdown(plan: &InjectionPlan, reason: &str) -> String {
    let mut out = String::from("## Dynamic Context Update\n\n");
    let _ = writeln!(out, "_Activated by: {}_", reason);

    const SECTION_ORDER: [BehaviorKind; 4] = [
        BehaviorKind::Constraint,
        BehaviorKind::Directive,
        BehaviorKind::Procedure,
        BehaviorKind::Preference,
    ];

    for kind in SECTION_ORDER {
        let entries: Vec<&PlannedBehavior> = plan
            .emitted()
            .filter(|p| p.behavior.kind == kind)
            .collect();
        if entries.is_empty() {
            continue;
        }
        let _ = write!(out, "\n### {}\n", section_title(kind));
        for planned in entries {
            let _ = writeln!(out, "- {}", rendered_text(planned));
        }
    }

    out
}

fn compile_xml(plan: &InjectionPlan) -> String {
    let mut out = String::from("<behaviors>\n");
    for planned in plan.emitted() {
        let tier = match planned.tier {
            Tier::Full => "full",
            Tier::Summary => "summary",
            Tier::NameOnly => "name_only",
            Tier::Omitted => continue,
        };
        let _ = writeln!(
            out,
            "  <behavior id=\"{}\" kind=\"{}\" tier=\"{}\">{}</behavior>",
            escape_xml(&planned.behavior.id),
            planned.behavior.kind,
            tier,
            escape_xml(&rendered_text(planned)),
        );
    }
    out.push_str("</behaviors>\n");
    out
}

fn compile_plain(plan: &InjectionPlan) -> String {
    let mut out = String::new();
    for planned in plan.emitted() {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            planned.behavior.kind,
            planned.behavior.name,
            rendered_text(planned),
        );
    }
    out
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
