//! Human-readable summary printed when a run completes.

use std::fmt::Write;

use shipwright_adapters::{CheckStatus, VisualOutcome};

use crate::state::{ArtifactOrigin, WorkflowState};

const NONE: &str = "-";

fn checks_label(checks: Option<CheckStatus>) -> &'static str {
    match checks {
        Some(CheckStatus::Success) => "passed",
        Some(CheckStatus::Failure) => "failed",
        Some(CheckStatus::Pending) => "still pending",
        None => NONE,
    }
}

fn visual_label(visual: Option<&VisualOutcome>) -> String {
    match visual {
        Some(VisualOutcome::Passed {
            snapshots,
            browser_minutes,
        }) => format!("passed ({snapshots} snapshots, {browser_minutes:.1} browser minutes)"),
        Some(VisualOutcome::Failed { reason }) => format!("failed: {reason}"),
        Some(VisualOutcome::Skipped { reason }) => format!("skipped: {reason}"),
        None => NONE.to_string(),
    }
}

#[must_use]
pub fn render_summary(state: &WorkflowState) -> String {
    let ctx = &state.context;
    let mut out = String::new();

    let source = match (&ctx.requirements_source.issue, &ctx.requirements_source.text) {
        (Some(issue), _) => format!("issue #{issue}"),
        (None, Some(_)) => "inline text".to_string(),
        (None, None) => NONE.to_string(),
    };
    let origin = match ctx.artifact_origin {
        Some(ArtifactOrigin::Generated) => "generated",
        Some(ArtifactOrigin::Fallback) => "static fallback",
        None => NONE,
    };

    let _ = writeln!(out, "Pipeline {}", state.status);
    let _ = writeln!(out, "  Requirements:  {source}");
    let _ = writeln!(out, "  Branch:        {}", ctx.branch_name.as_deref().unwrap_or(NONE));
    let _ = writeln!(
        out,
        "  Pull request:  {}",
        ctx.pull_request_url.as_deref().unwrap_or(NONE)
    );
    let _ = writeln!(out, "  Code:          {origin}");
    let _ = writeln!(out, "  CI checks:     {}", checks_label(ctx.checks));
    let _ = writeln!(out, "  Visual checks: {}", visual_label(ctx.visual.as_ref()));
    let _ = writeln!(out, "  Preview:       {}", ctx.preview_url.as_deref().unwrap_or(NONE));
    if let Some(cost) = &ctx.cost_report {
        let _ = writeln!(
            out,
            "  Spend today:   {} of {} ({} remaining){}",
            cost.spent,
            cost.cap,
            cost.remaining,
            if cost.halted { ", HALTED" } else { "" }
        );
        for usage in &cost.providers {
            let _ = writeln!(
                out,
                "    {:<12} {:>9} tokens  {}",
                usage.provider, usage.tokens, usage.cost
            );
        }
    }

    out.push_str("Stages:\n");
    for record in &ctx.stages {
        let _ = writeln!(out, "  {:<20} {}", record.stage.to_string(), record.outcome);
    }
    out
}
