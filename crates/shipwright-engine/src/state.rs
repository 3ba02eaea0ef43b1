//! The persisted workflow record.
//!
//! `WorkflowState` is the single source of truth for resumability: every stage
//! reads its inputs from `context` and writes its outputs back, so nothing
//! depends on in-memory continuity between processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shipwright_adapters::{ArtifactFile, CheckStatus, ProviderUsage, VisualOutcome};
use shipwright_budget::Money;
use shipwright_utils::PipelineError;

use crate::stage::{StageId, StageOutcome};

/// Marker stored in `preview_url` when no deployment URL was found
pub const PREVIEW_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where requirements come from. The inline text doubles as the fallback when
/// the issue cannot be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl RequirementsSource {
    /// # Errors
    ///
    /// `InvalidInput` when neither a non-empty issue nor non-empty text is given.
    pub fn new(issue: Option<String>, text: Option<String>) -> Result<Self, PipelineError> {
        let issue = issue.filter(|s| !s.trim().is_empty());
        let text = text.filter(|s| !s.trim().is_empty());
        if issue.is_none() && text.is_none() {
            return Err(PipelineError::InvalidInput(
                "either an issue reference or inline requirements text is required".to_string(),
            ));
        }
        Ok(Self { issue, text })
    }

    #[must_use]
    pub fn issue(id: impl Into<String>) -> Self {
        Self {
            issue: Some(id.into()),
            text: None,
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            issue: None,
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    Generated,
    Fallback,
}

/// Result of the code stage, keeping model output and the static fallback apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", content = "files", rename_all = "snake_case")]
pub enum GeneratedArtifact {
    Generated(Vec<ArtifactFile>),
    Fallback(Vec<ArtifactFile>),
}

impl GeneratedArtifact {
    #[must_use]
    pub fn files(&self) -> &[ArtifactFile] {
        match self {
            Self::Generated(files) | Self::Fallback(files) => files,
        }
    }

    #[must_use]
    pub fn origin(&self) -> ArtifactOrigin {
        match self {
            Self::Generated(_) => ArtifactOrigin::Generated,
            Self::Fallback(_) => ArtifactOrigin::Fallback,
        }
    }
}

/// Snapshot of spend taken by the cost stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    pub spent: Money,
    pub cap: Money,
    pub remaining: Money,
    pub warning: bool,
    pub halted: bool,
    #[serde(default)]
    pub providers: Vec<ProviderUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub outcome: StageOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Cross-stage outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    #[serde(default)]
    pub requirements_source: RequirementsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_origin: Option<ArtifactOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_report: Option<CostReport>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
}

impl WorkflowContext {
    /// Name of the first context field `stage` needs that is not present.
    #[must_use]
    pub fn missing_input_for(&self, stage: StageId) -> Option<&'static str> {
        let source = &self.requirements_source;
        match stage {
            StageId::Requirements if source.issue.is_none() && source.text.is_none() => {
                Some("requirements_source")
            }
            StageId::Specification if self.requirements_text.is_none() => {
                Some("requirements_text")
            }
            StageId::CodeGeneration if self.spec_document.is_none() => Some("spec_document"),
            StageId::Testing | StageId::Preview if self.pull_request_number.is_none() => {
                Some("pull_request_number")
            }
            _ => None,
        }
    }

    /// Record `outcome` for `stage`, replacing an earlier record of a retried stage.
    pub fn record_outcome(&mut self, stage: StageId, outcome: StageOutcome, at: DateTime<Utc>) {
        self.stages.retain(|r| r.stage != stage);
        self.stages.push(StageRecord {
            stage,
            outcome,
            finished_at: at,
        });
        self.stages.sort_by_key(|r| r.stage);
    }

    #[must_use]
    pub fn outcome_of(&self, stage: StageId) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Next stage to execute; frozen at the failing stage when `status` is failed
    pub current_stage: StageId,
    pub status: WorkflowStatus,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub context: WorkflowContext,
}

impl WorkflowState {
    #[must_use]
    pub fn new(source: RequirementsSource, now: DateTime<Utc>) -> Self {
        Self {
            current_stage: StageId::FIRST,
            status: WorkflowStatus::InProgress,
            details: "run started".to_string(),
            timestamp: now,
            context: WorkflowContext {
                requirements_source: source,
                ..WorkflowContext::default()
            },
        }
    }

    /// Placeholder reported by `status` when nothing is persisted
    #[must_use]
    pub fn not_started(now: DateTime<Utc>) -> Self {
        Self {
            current_stage: StageId::FIRST,
            status: WorkflowStatus::NotStarted,
            details: "no pipeline run recorded".to_string(),
            timestamp: now,
            context: WorkflowContext::default(),
        }
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == WorkflowStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_source_requires_something() {
        assert!(RequirementsSource::new(None, None).is_err());
        assert!(RequirementsSource::new(Some("  ".into()), Some(String::new())).is_err());

        let source = RequirementsSource::new(Some("42".into()), None).unwrap();
        assert_eq!(source.issue.as_deref(), Some("42"));
        assert_eq!(source.text, None);
    }

    #[test]
    fn test_new_state_starts_at_stage_one() {
        let state = WorkflowState::new(RequirementsSource::text("todo app"), Utc::now());
        assert_eq!(state.current_stage, StageId::Requirements);
        assert_eq!(state.status, WorkflowStatus::InProgress);
    }

    #[test]
    fn test_missing_inputs() {
        let mut ctx = WorkflowContext::default();
        assert_eq!(
            ctx.missing_input_for(StageId::Requirements),
            Some("requirements_source")
        );
        assert_eq!(
            ctx.missing_input_for(StageId::CodeGeneration),
            Some("spec_document")
        );
        assert_eq!(ctx.missing_input_for(StageId::CostCheck), None);

        ctx.pull_request_number = Some(7);
        assert_eq!(ctx.missing_input_for(StageId::Preview), None);
    }

    #[test]
    fn test_record_outcome_replaces_retried_stage() {
        let mut ctx = WorkflowContext::default();
        let now = Utc::now();
        ctx.record_outcome(StageId::Testing, StageOutcome::Warning("timeout".into()), now);
        ctx.record_outcome(StageId::Requirements, StageOutcome::Completed, now);
        ctx.record_outcome(StageId::Testing, StageOutcome::Completed, now);

        assert_eq!(ctx.stages.len(), 2);
        assert_eq!(ctx.stages[0].stage, StageId::Requirements);
        assert_eq!(ctx.outcome_of(StageId::Testing), Some(&StageOutcome::Completed));
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = WorkflowState::new(RequirementsSource::issue("12"), Utc::now());
        state.current_stage = StageId::Preview;
        state.context.preview_url = Some(PREVIEW_UNKNOWN.to_string());
        state
            .context
            .record_outcome(StageId::Requirements, StageOutcome::Completed, Utc::now());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["current_stage"], 6);
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["context"]["requirements_source"]["issue"], "12");
        assert_eq!(json["context"]["stages"][0]["outcome"]["status"], "completed");

        let back: WorkflowState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
