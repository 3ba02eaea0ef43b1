//! Behaviour of the eight stages.
//!
//! Each stage reads its inputs from the persisted context and writes its
//! outputs back. Stage functions never touch `WorkflowState.status`; turning an
//! error into a failed run is the engine's job.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use shipwright_adapters::{
    AdapterError, ArtifactFile, CheckStatus, PreviewStatus, PullRequestRequest, VisualOutcome,
};
use shipwright_budget::BudgetGuard;
use shipwright_llm::{AttemptOutcome, AttemptRecord, ExpectedShape, Prompt, ProviderClient};
use shipwright_utils::{PipelineError, ShipwrightError};

use crate::engine::{Collaborators, EngineSettings};
use crate::fallback::{fallback_artifacts, headline};
use crate::polling::{PollResult, poll_until};
use crate::prompts::{CODE_PURPOSE, CODE_ROLE, SPEC_PURPOSE, SPEC_ROLE, code_request, spec_request};
use crate::stage::{StageId, StageOutcome};
use crate::state::{CostReport, GeneratedArtifact, PREVIEW_UNKNOWN, WorkflowContext};
use crate::store::{FILES_ARTIFACT, SPEC_ARTIFACT, StateStore};

/// Billing provider name used for visual suite spend
pub const VISUAL_PROVIDER: &str = "visual";

/// Everything a stage may use. Borrowed from the engine for one stage.
pub(crate) struct StageEnv<'a> {
    pub store: &'a dyn StateStore,
    pub guard: &'a BudgetGuard,
    pub provider: &'a ProviderClient,
    pub collaborators: &'a Collaborators,
    pub settings: &'a EngineSettings,
}

pub(crate) async fn execute(
    stage: StageId,
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    if let Some(field) = ctx.missing_input_for(stage) {
        return Err(missing(stage, field).into());
    }
    match stage {
        StageId::Requirements => gather_requirements(env, ctx).await,
        StageId::Specification => generate_specification(env, ctx).await,
        StageId::CodeGeneration => generate_code(env, ctx).await,
        StageId::Testing => await_ci(env, ctx).await,
        StageId::VisualTesting => run_visual_checks(env, ctx).await,
        StageId::Preview => resolve_preview(env, ctx).await,
        StageId::CostCheck => check_costs(env, ctx).await,
        StageId::Completion => Ok(StageOutcome::Completed),
    }
}

fn missing(stage: StageId, field: &str) -> PipelineError {
    PipelineError::InvalidInput(format!("stage {stage} requires {field}, which is not recorded"))
}

/// Adapter failures: missing configuration is operator input, the rest is upstream.
fn adapter_failure(what: &str, err: AdapterError) -> PipelineError {
    match err {
        AdapterError::Unconfigured(reason) => {
            PipelineError::InvalidInput(format!("{what}: {reason}"))
        }
        other => PipelineError::SourceUnavailable(format!("{what}: {other}")),
    }
}

fn describe_attempts(attempts: &[AttemptRecord]) -> String {
    if attempts.is_empty() {
        return "no provider was attempted".to_string();
    }
    attempts
        .iter()
        .map(|a| {
            let outcome = match &a.outcome {
                AttemptOutcome::Succeeded => "succeeded".to_string(),
                AttemptOutcome::Failed(reason) => reason.clone(),
                AttemptOutcome::Unparseable => "output could not be parsed as JSON".to_string(),
            };
            format!("{} ({}): {outcome}", a.slot, a.provider)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Stage 1
// ---------------------------------------------------------------------------

async fn gather_requirements(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    let source = ctx.requirements_source.clone();
    let Some(issue) = source.issue.as_deref() else {
        ctx.requirements_text = source.text;
        return Ok(StageOutcome::Completed);
    };

    let reason = match env.collaborators.issues.fetch(issue).await {
        Ok(body) if !body.trim().is_empty() => {
            info!(issue = %issue, chars = body.len(), "Fetched requirements");
            ctx.requirements_text = Some(body);
            return Ok(StageOutcome::Completed);
        }
        Ok(_) => "issue has no body".to_string(),
        Err(e) => e.to_string(),
    };

    match source.text {
        Some(text) => {
            warn!(issue = %issue, reason = %reason, "Issue unavailable, using inline requirements");
            ctx.requirements_text = Some(text);
            Ok(StageOutcome::Warning(format!(
                "issue {issue} unavailable ({reason}); used inline requirements"
            )))
        }
        None => Err(PipelineError::SourceUnavailable(format!("issue {issue}: {reason}")).into()),
    }
}

// ---------------------------------------------------------------------------
// Stage 2
// ---------------------------------------------------------------------------

async fn generate_specification(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    let requirements = ctx
        .requirements_text
        .as_deref()
        .ok_or_else(|| missing(StageId::Specification, "requirements_text"))?;

    let prompt = Prompt::new(SPEC_PURPOSE, spec_request(requirements)).with_system(SPEC_ROLE);
    let result = env.provider.generate(&prompt, ExpectedShape::Text).await;

    // No fabricated spec: total failure is fatal here.
    let Some(spec) = result.text() else {
        return Err(PipelineError::GenerationFailed {
            stage: StageId::Specification.number(),
            reason: describe_attempts(&result.attempts),
        }
        .into());
    };

    env.store.write_artifact(SPEC_ARTIFACT, spec)?;
    info!(provider = %result.provider_used, chars = spec.len(), "Specification generated");
    ctx.spec_document = Some(spec.to_string());
    Ok(StageOutcome::Completed)
}

// ---------------------------------------------------------------------------
// Stage 3
// ---------------------------------------------------------------------------

/// Accept a model answer only if every file is a safe relative path with content.
pub fn validate_artifact(value: &Value) -> Result<Vec<ArtifactFile>, String> {
    let entries = value
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| "response has no \"files\" array".to_string())?;
    if entries.is_empty() {
        return Err("response contains no files".to_string());
    }

    let mut seen = BTreeSet::new();
    let mut files = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let file: ArtifactFile = serde_json::from_value(entry.clone())
            .map_err(|e| format!("file {i} is malformed: {e}"))?;
        check_path(&file.path).map_err(|reason| format!("file {i} ({}): {reason}", file.path))?;
        if file.content.trim().is_empty() {
            return Err(format!("file {i} ({}) is empty", file.path));
        }
        if !seen.insert(file.path.clone()) {
            return Err(format!("file {i} ({}) is listed twice", file.path));
        }
        files.push(file);
    }
    Ok(files)
}

fn check_path(path: &str) -> Result<(), &'static str> {
    if path.trim().is_empty() {
        return Err("path is empty");
    }
    if path.starts_with(['/', '\\']) || path.as_bytes().get(1) == Some(&b':') {
        return Err("path is absolute");
    }
    if path.split(['/', '\\']).any(|part| part == "..") {
        return Err("path escapes the repository");
    }
    Ok(())
}

fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
        if out.len() >= 40 {
            break;
        }
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "app".to_string()
    } else {
        out.to_string()
    }
}

/// `<prefix><slug>-<yyyymmddhhmmss>`
#[must_use]
pub fn branch_name(prefix: &str, requirements: &str, now: DateTime<Utc>) -> String {
    format!(
        "{prefix}{}-{}",
        slug(&headline(requirements)),
        now.format("%Y%m%d%H%M%S")
    )
}

fn pull_request_body(ctx: &WorkflowContext, artifact: &GeneratedArtifact) -> String {
    let source = match &ctx.requirements_source.issue {
        Some(issue) => format!("issue #{issue}"),
        None => "inline requirements".to_string(),
    };
    let mut body = format!("Generated by shipwright from {source}.\n\n");
    if let GeneratedArtifact::Fallback(_) = artifact {
        body.push_str(
            "**Code generation was unavailable.** This pull request contains the static \
             fallback application, not generated code.\n\n",
        );
    }
    body.push_str("Files:\n");
    for file in artifact.files() {
        body.push_str(&format!("- `{}`\n", file.path));
    }
    body
}

async fn generate_code(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    let spec = ctx
        .spec_document
        .clone()
        .ok_or_else(|| missing(StageId::CodeGeneration, "spec_document"))?;
    let requirements = ctx.requirements_text.clone().unwrap_or_else(|| spec.clone());

    let prompt = Prompt::new(CODE_PURPOSE, code_request(&spec)).with_system(CODE_ROLE);
    let result = env.provider.generate(&prompt, ExpectedShape::Json).await;

    let artifact = match result.json().map(validate_artifact) {
        Some(Ok(files)) => {
            info!(provider = %result.provider_used, files = files.len(), "Code generated");
            GeneratedArtifact::Generated(files)
        }
        Some(Err(reason)) => {
            warn!(reason = %reason, "Generated artifact rejected, using fallback set");
            GeneratedArtifact::Fallback(fallback_artifacts(&requirements))
        }
        None => {
            warn!(
                attempts = %describe_attempts(&result.attempts),
                "Code generation failed with every provider, using fallback set"
            );
            GeneratedArtifact::Fallback(fallback_artifacts(&requirements))
        }
    };

    let manifest = serde_json::to_string_pretty(&artifact)
        .map_err(|e| ShipwrightError::storage(FILES_ARTIFACT, e))?;
    env.store.write_artifact(FILES_ARTIFACT, &manifest)?;
    ctx.artifact_origin = Some(artifact.origin());

    // Reused on resume so a retried stage targets the same branch.
    let branch = match &ctx.branch_name {
        Some(branch) => branch.clone(),
        None => {
            let branch = branch_name(&env.settings.branch_prefix, &requirements, Utc::now());
            ctx.branch_name = Some(branch.clone());
            branch
        }
    };
    let base = env.settings.base_branch.as_str();
    let pulls = &env.collaborators.pulls;

    pulls
        .create_branch(&branch, base)
        .await
        .map_err(|e| adapter_failure("create branch", e))?;
    pulls
        .push_files(&branch, artifact.files(), "Add generated application")
        .await
        .map_err(|e| adapter_failure("push files", e))?;
    let pr = pulls
        .open_pull_request(&PullRequestRequest {
            title: format!("shipwright: {}", headline(&requirements)),
            body: pull_request_body(ctx, &artifact),
            head: branch.clone(),
            base: base.to_string(),
            draft: true,
        })
        .await
        .map_err(|e| adapter_failure("open pull request", e))?;

    info!(branch = %branch, pr = pr.number, url = %pr.url, "Pull request open");
    ctx.pull_request_url = Some(pr.url);
    ctx.pull_request_number = Some(pr.number);

    Ok(match artifact {
        GeneratedArtifact::Generated(_) => StageOutcome::Completed,
        GeneratedArtifact::Fallback(_) => StageOutcome::Warning(
            "code generation unavailable; committed the fallback artifact set".to_string(),
        ),
    })
}

// ---------------------------------------------------------------------------
// Stage 4
// ---------------------------------------------------------------------------

async fn await_ci(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    let pr = ctx
        .pull_request_number
        .ok_or_else(|| missing(StageId::Testing, "pull_request_number"))?;
    let pulls = &env.collaborators.pulls;
    let timeout = env.settings.ci_timeout;

    let polled = poll_until(env.guard, "CI checks", timeout, env.settings.ci_poll_interval, || async move {
        match pulls.poll_checks(pr).await {
            Ok(CheckStatus::Pending) => None,
            Ok(status) => Some(status),
            Err(e) => {
                warn!(pr = pr, error = %e, "CI status unavailable, will retry");
                None
            }
        }
    })
    .await?;

    match polled {
        PollResult::Ready(CheckStatus::Failure) => {
            ctx.checks = Some(CheckStatus::Failure);
            warn!(pr = pr, "CI checks failed");
            Ok(StageOutcome::Warning("CI checks failed".to_string()))
        }
        PollResult::Ready(status) => {
            ctx.checks = Some(status);
            Ok(StageOutcome::Completed)
        }
        PollResult::TimedOut => {
            ctx.checks = Some(CheckStatus::Pending);
            let timeout = PipelineError::Timeout {
                what: "CI checks".to_string(),
                duration: timeout,
            };
            warn!(pr = pr, "{timeout}; continuing");
            Ok(StageOutcome::Warning(timeout.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 5
// ---------------------------------------------------------------------------

async fn run_visual_checks(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    let outcome = match env.collaborators.visual.run_checks().await {
        Ok(outcome) => outcome,
        Err(AdapterError::Unconfigured(reason)) => VisualOutcome::Skipped { reason },
        Err(e) => VisualOutcome::Failed {
            reason: e.to_string(),
        },
    };

    let stage_outcome = match &outcome {
        VisualOutcome::Passed {
            snapshots,
            browser_minutes,
        } => {
            if *snapshots > 0 {
                env.guard.record_snapshots(VISUAL_PROVIDER, *snapshots).await?;
            }
            if *browser_minutes > 0.0 {
                env.guard
                    .record_browser_minutes(VISUAL_PROVIDER, *browser_minutes)
                    .await?;
            }
            StageOutcome::Completed
        }
        VisualOutcome::Failed { reason } => {
            warn!(reason = %reason, "Visual/performance checks failed");
            StageOutcome::Warning(format!("visual/performance checks failed: {reason}"))
        }
        VisualOutcome::Skipped { reason } => {
            info!(reason = %reason, "Visual/performance checks skipped");
            StageOutcome::Skipped(reason.clone())
        }
    };
    ctx.visual = Some(outcome);
    Ok(stage_outcome)
}

// ---------------------------------------------------------------------------
// Stage 6
// ---------------------------------------------------------------------------

async fn resolve_preview(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    let pr = ctx
        .pull_request_number
        .ok_or_else(|| missing(StageId::Preview, "pull_request_number"))?;
    let preview = &env.collaborators.preview;
    let settings = env.settings;

    let polled = poll_until(
        env.guard,
        "preview deployment",
        settings.preview_timeout,
        settings.preview_poll_interval,
        || async move {
            match preview.resolve_preview_url(pr).await {
                Ok(PreviewStatus::Url(url)) => Some(url),
                Ok(PreviewStatus::Unknown) => None,
                Err(e) => {
                    debug!(pr = pr, error = %e, "Preview lookup failed, will retry");
                    None
                }
            }
        },
    )
    .await?;

    match polled {
        PollResult::Ready(url) => {
            info!(url = %url, "Preview deployed");
            ctx.preview_url = Some(url);
            Ok(StageOutcome::Completed)
        }
        PollResult::TimedOut => {
            warn!(pr = pr, "No preview URL found; recording it as unknown");
            ctx.preview_url = Some(PREVIEW_UNKNOWN.to_string());
            Ok(StageOutcome::Warning(
                "preview URL could not be resolved".to_string(),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 7
// ---------------------------------------------------------------------------

async fn check_costs(
    env: &StageEnv<'_>,
    ctx: &mut WorkflowContext,
) -> Result<StageOutcome, ShipwrightError> {
    // The engine's gate before this stage already denied an exhausted budget.
    let report = env.guard.report_daily().await?;

    let providers = match env.collaborators.usage.daily_usage().await {
        Ok(providers) => providers,
        Err(e) => {
            warn!(error = %e, "Usage source unavailable; cost report has no provider breakdown");
            Vec::new()
        }
    };

    info!(
        spent = %report.spent,
        cap = %report.cap,
        remaining = %report.remaining,
        warning = report.warning,
        halted = report.halted,
        "Cost check"
    );
    ctx.cost_report = Some(CostReport {
        spent: report.spent,
        cap: report.cap,
        remaining: report.remaining,
        warning: report.warning,
        halted: report.halted,
        providers,
    });

    if report.warning {
        return Ok(StageOutcome::Warning(format!(
            "spend {} has reached the warning threshold of the {} cap",
            report.spent, report.cap
        )));
    }
    Ok(StageOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_validate_artifact_accepts_relative_files() {
        let value = json!({"files": [
            {"path": "app/page.tsx", "content": "export default 1"},
            {"path": "package.json", "content": "{}"}
        ]});
        let files = validate_artifact(&value).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "app/page.tsx");
    }

    #[test]
    fn test_validate_artifact_rejects_unsafe_or_empty() {
        let cases = [
            json!({"nope": []}),
            json!({"files": []}),
            json!({"files": [{"path": "/etc/passwd", "content": "x"}]}),
            json!({"files": [{"path": "C:\\x", "content": "x"}]}),
            json!({"files": [{"path": "app/../../x", "content": "x"}]}),
            json!({"files": [{"path": "a.ts", "content": "  "}]}),
            json!({"files": [{"path": "a.ts"}]}),
            json!({"files": [{"path": "a.ts", "content": "1"}, {"path": "a.ts", "content": "2"}]}),
        ];
        for case in cases {
            assert!(validate_artifact(&case).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn test_branch_name() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            branch_name("shipwright/", "# Recipe Box!\nStore recipes", now),
            "shipwright/recipe-box-20260304050607"
        );
        assert_eq!(
            branch_name("sw/", "!!!", now),
            "sw/app-20260304050607"
        );
    }

    #[test]
    fn test_describe_attempts() {
        use shipwright_llm::ProviderUsed;
        let attempts = vec![
            AttemptRecord {
                slot: ProviderUsed::Primary,
                provider: "anthropic".into(),
                outcome: AttemptOutcome::Failed("timed out".into()),
            },
            AttemptRecord {
                slot: ProviderUsed::Secondary,
                provider: "ollama".into(),
                outcome: AttemptOutcome::Unparseable,
            },
        ];
        assert_eq!(
            describe_attempts(&attempts),
            "primary (anthropic): timed out; secondary (ollama): output could not be parsed as JSON"
        );
    }

    proptest! {
        #[test]
        fn prop_slug_is_branch_safe(text in ".{0,120}") {
            let s = slug(&text);
            prop_assert!(!s.is_empty());
            prop_assert!(s.len() <= 40);
            prop_assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!s.starts_with('-') && !s.ends_with('-'));
        }
    }
}
