//! The workflow engine: sequencing, persistence, and failure handling.
//!
//! The engine is the only writer of `WorkflowState`. It runs stages strictly in
//! order, asks the budget guard before every stage, and persists the record
//! after every stage so a later process can resume from it.

use camino::Utf8PathBuf;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, error, info, warn};

use shipwright_adapters::{
    IssueSource, PreviewAdapter, PullRequestAdapter, UsageSource, VisualCheckAdapter,
};
use shipwright_budget::BudgetGuard;
use shipwright_config::Config;
use shipwright_llm::ProviderClient;
use shipwright_utils::error::LockError;
use shipwright_utils::logging::{log_stage_complete, log_stage_error, log_stage_start, stage_span};
use shipwright_utils::{PipelineError, ShipwrightError};

use crate::lock::{DEFAULT_LOCK_TTL, RunLock};
use crate::stage::StageId;
use crate::stages::{self, StageEnv};
use crate::state::{RequirementsSource, WorkflowState, WorkflowStatus};
use crate::store::StateStore;
use crate::summary::render_summary;

/// The external services a run talks to
#[derive(Clone)]
pub struct Collaborators {
    pub issues: Arc<dyn IssueSource>,
    pub pulls: Arc<dyn PullRequestAdapter>,
    pub preview: Arc<dyn PreviewAdapter>,
    pub visual: Arc<dyn VisualCheckAdapter>,
    pub usage: Arc<dyn UsageSource>,
}

/// Branching and polling parameters for one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub base_branch: String,
    pub branch_prefix: String,
    pub ci_timeout: Duration,
    pub ci_poll_interval: Duration,
    pub preview_timeout: Duration,
    pub preview_poll_interval: Duration,
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let pipeline = &config.pipeline;
        Self {
            base_branch: config.defaults.base_branch.clone(),
            branch_prefix: config.defaults.branch_prefix.clone(),
            ci_timeout: Duration::from_secs(pipeline.ci_timeout_secs),
            ci_poll_interval: Duration::from_secs(pipeline.ci_poll_interval_secs),
            preview_timeout: Duration::from_secs(pipeline.preview_timeout_secs),
            preview_poll_interval: Duration::from_secs(pipeline.preview_poll_interval_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Final state of a run that reached stage 8, plus the printed summary
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: WorkflowState,
    pub summary: String,
}

pub struct WorkflowEngine {
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) guard: Arc<BudgetGuard>,
    pub(crate) provider: Arc<ProviderClient>,
    pub(crate) collaborators: Collaborators,
    pub(crate) settings: EngineSettings,
    lock_path: Option<Utf8PathBuf>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        guard: Arc<BudgetGuard>,
        provider: Arc<ProviderClient>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            guard,
            provider,
            collaborators,
            settings,
            lock_path: None,
        }
    }

    /// Hold the run lock at `path` for the duration of `start` and `resume`.
    #[must_use]
    pub fn with_lock(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn guard(&self) -> &Arc<BudgetGuard> {
        &self.guard
    }

    /// Begin a new run at stage 1.
    ///
    /// # Errors
    ///
    /// `InvalidInput` without a requirements source, `AlreadyRunning` when the
    /// persisted run is still in progress or another process holds the lock.
    /// Neither mutates persisted state.
    pub async fn start(&self, source: RequirementsSource) -> Result<RunReport, ShipwrightError> {
        let source = RequirementsSource::new(source.issue, source.text)?;
        let _lock = self.acquire_lock()?;
        self.begin(source).await
    }

    /// Discard whatever run is recorded, then begin a new one at stage 1.
    ///
    /// The discard happens under the run lock, so a run that another process
    /// is still driving is never wiped.
    ///
    /// # Errors
    ///
    /// As [`start`](Self::start); `AlreadyRunning` leaves the record untouched.
    pub async fn start_over(
        &self,
        source: RequirementsSource,
    ) -> Result<RunReport, ShipwrightError> {
        let source = RequirementsSource::new(source.issue, source.text)?;
        let _lock = self.acquire_lock()?;
        self.discard()?;
        self.begin(source).await
    }

    async fn begin(&self, source: RequirementsSource) -> Result<RunReport, ShipwrightError> {
        if let Some(existing) = self.store.load()?
            && existing.is_in_progress()
        {
            return Err(PipelineError::AlreadyRunning(format!(
                "the recorded run is at stage {}; use resume, or start with --reset",
                existing.current_stage
            ))
            .into());
        }

        let state = WorkflowState::new(source, Utc::now());
        self.store.save(&state)?;
        info!(source = ?state.context.requirements_source, "Pipeline run started");
        self.run_from(state).await
    }

    /// Continue the persisted run, optionally from an operator-chosen stage.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when nothing is recorded or the chosen stage's inputs are
    /// missing from the recorded context.
    pub async fn resume(&self, stage: Option<StageId>) -> Result<RunReport, ShipwrightError> {
        let _lock = self.acquire_lock()?;

        let Some(mut state) = self.store.load()? else {
            return Err(PipelineError::InvalidInput(
                "nothing to resume: no pipeline run is recorded".to_string(),
            )
            .into());
        };
        if state.status == WorkflowStatus::Completed {
            return Err(PipelineError::InvalidInput(
                "nothing to resume: the recorded run already completed".to_string(),
            )
            .into());
        }

        let target = stage.unwrap_or(state.current_stage);
        if let Some(field) = state.context.missing_input_for(target) {
            return Err(PipelineError::InvalidInput(format!(
                "cannot resume at stage {target}: {field} is not recorded"
            ))
            .into());
        }
        if target != state.current_stage {
            info!(from = %state.current_stage, to = %target, "Operator override of resume stage");
        }

        info!(stage = %target, previous_status = %state.status, "Resuming pipeline run");
        state.current_stage = target;
        self.run_from(state).await
    }

    /// The persisted record, if any. Read-only.
    pub fn status(&self) -> Result<Option<WorkflowState>, ShipwrightError> {
        self.store.load()
    }

    /// Discard the persisted record and its artifacts.
    ///
    /// Takes the run lock first; an abandoned lock is replaced, a live one
    /// refuses the reset.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while another process holds the lock.
    pub fn reset(&self) -> Result<bool, ShipwrightError> {
        let _lock = self.acquire_lock()?;
        self.discard()
    }

    fn discard(&self) -> Result<bool, ShipwrightError> {
        let removed = self.store.clear_all()?;
        if removed {
            warn!("Pipeline state reset");
        }
        Ok(removed)
    }

    fn acquire_lock(&self) -> Result<Option<RunLock>, ShipwrightError> {
        let Some(path) = &self.lock_path else {
            return Ok(None);
        };
        match RunLock::acquire(path, DEFAULT_LOCK_TTL) {
            Ok(lock) => Ok(Some(lock)),
            Err(e @ LockError::Held { .. }) => {
                Err(PipelineError::AlreadyRunning(e.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_from(&self, mut state: WorkflowState) -> Result<RunReport, ShipwrightError> {
        state.status = WorkflowStatus::InProgress;
        state.details = format!("running stage {}", state.current_stage);
        state.timestamp = Utc::now();
        self.store.save(&state)?;

        loop {
            let stage = state.current_stage;

            if !self.guard.check_allowed().await? {
                let report = self.guard.report_daily().await?;
                let reason = report
                    .halt_reason
                    .unwrap_or_else(|| format!("daily cap reached: {} of {}", report.spent, report.cap));
                let denied = PipelineError::BudgetExceeded { reason }.into();
                return Err(self.fail(state, denied, 0));
            }

            let started = Instant::now();
            let result = {
                let env = StageEnv {
                    store: self.store.as_ref(),
                    guard: self.guard.as_ref(),
                    provider: self.provider.as_ref(),
                    collaborators: &self.collaborators,
                    settings: &self.settings,
                };
                let context = &mut state.context;
                async move {
                    log_stage_start(stage.number(), stage.name());
                    stages::execute(stage, &env, context).await
                }
                .instrument(stage_span(stage.number(), stage.name()))
                .await
            };
            let duration_ms = started.elapsed().as_millis();

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(state, e, duration_ms)),
            };
            log_stage_complete(stage.number(), stage.name(), outcome.label(), duration_ms);

            let now = Utc::now();
            state.context.record_outcome(stage, outcome.clone(), now);
            state.details = format!("stage {stage} {outcome}");
            state.timestamp = now;

            match stage.next() {
                Some(next) => {
                    state.current_stage = next;
                    self.store.save(&state)?;
                }
                None => {
                    state.status = WorkflowStatus::Completed;
                    state.details = "pipeline completed".to_string();
                    let summary = render_summary(&state);
                    // A clean slate for the next run; artifacts stay on disk.
                    self.store.clear()?;
                    info!("Pipeline run completed");
                    return Ok(RunReport { state, summary });
                }
            }
        }
    }

    /// Freeze the run at its current stage as failed and persist it.
    fn fail(
        &self,
        mut state: WorkflowState,
        err: ShipwrightError,
        duration_ms: u128,
    ) -> ShipwrightError {
        let stage = state.current_stage;
        let kind = err.kind().map_or("Internal", |k| k.as_str());
        log_stage_error(stage.number(), stage.name(), &err.to_string(), duration_ms);

        state.status = WorkflowStatus::Failed;
        state.details = shipwright_utils::redaction::redact_secrets(&format!("{kind}: {err}"));
        state.timestamp = Utc::now();
        if let Err(save_err) = self.store.save(&state) {
            error!(error = %save_err, "Could not persist failed workflow state");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{CODE_PURPOSE, SPEC_PURPOSE};
    use crate::stage::StageOutcome;
    use crate::state::{ArtifactOrigin, PREVIEW_UNKNOWN};
    use crate::testing::{GOOD_FILES, GOOD_SPEC, Harness, MockPulls, ScriptedBackend, TEST_PR_URL};
    use shipwright_adapters::{AdapterError, CheckStatus, PreviewStatus, VisualOutcome};
    use shipwright_budget::Money;
    use shipwright_llm::LlmError;
    use shipwright_utils::ErrorKind;

    fn text_source() -> RequirementsSource {
        RequirementsSource::text("# Todo app\nTrack my todos.")
    }

    fn failing_spec_backends() -> (ScriptedBackend, ScriptedBackend) {
        (
            ScriptedBackend::new("primary")
                .fail(SPEC_PURPOSE, LlmError::ProviderOutage("503".into())),
            ScriptedBackend::new("secondary")
                .fail(SPEC_PURPOSE, LlmError::Transport("connection refused".into())),
        )
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_clears_state() {
        let h = Harness::builder().build();

        let report = h.engine.start(text_source()).await.unwrap();

        assert_eq!(report.state.status, WorkflowStatus::Completed);
        assert_eq!(report.state.context.stages.len(), 8);
        assert_eq!(report.state.context.pull_request_url.as_deref(), Some(TEST_PR_URL));
        assert_eq!(
            report.state.context.artifact_origin,
            Some(ArtifactOrigin::Generated)
        );
        assert!(report.summary.contains(TEST_PR_URL));
        assert_eq!(h.engine.status().unwrap(), None);
        assert_eq!(
            h.store.read_artifact(crate::store::SPEC_ARTIFACT).unwrap().as_deref(),
            Some(GOOD_SPEC)
        );
    }

    #[tokio::test]
    async fn test_start_requires_a_source() {
        let h = Harness::builder().build();
        let err = h
            .engine
            .start(RequirementsSource::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(h.engine.status().unwrap(), None);
    }

    #[tokio::test]
    async fn test_spec_failure_freezes_state_at_stage_two() {
        let (primary, secondary) = failing_spec_backends();
        let h = Harness::builder().primary(primary).secondary(secondary).build();

        let err = h.engine.start(text_source()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::GenerationFailed));

        let state = h.engine.status().unwrap().unwrap();
        assert_eq!(state.current_stage, StageId::Specification);
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(state.details.starts_with("GenerationFailed:"));
        assert_eq!(
            state.context.outcome_of(StageId::Requirements),
            Some(&StageOutcome::Completed)
        );
    }

    #[tokio::test]
    async fn test_resume_retries_failed_stage_in_a_new_process() {
        let (primary, secondary) = failing_spec_backends();
        let first = Harness::builder().primary(primary).secondary(secondary).build();
        first.engine.start(text_source()).await.unwrap_err();

        let second = Harness::builder()
            .stores(first.store.clone(), first.budget.clone())
            .build();
        let report = second.engine.resume(None).await.unwrap();

        assert_eq!(report.state.status, WorkflowStatus::Completed);
        // Stage 1 was not re-run; stage 2 was.
        assert_eq!(second.primary.calls(), vec![SPEC_PURPOSE, CODE_PURPOSE]);
    }

    #[tokio::test]
    async fn test_resume_override_and_missing_inputs() {
        let (primary, secondary) = failing_spec_backends();
        let first = Harness::builder().primary(primary).secondary(secondary).build();
        first.engine.start(text_source()).await.unwrap_err();
        let before = first.engine.status().unwrap();

        let err = first
            .engine
            .resume(Some(StageId::CodeGeneration))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
        assert!(err.to_string().contains("spec_document"));
        assert_eq!(first.engine.status().unwrap(), before);

        let second = Harness::builder()
            .stores(first.store.clone(), first.budget.clone())
            .build();
        second.engine.resume(Some(StageId::Requirements)).await.unwrap();
        assert_eq!(second.primary.calls(), vec![SPEC_PURPOSE, CODE_PURPOSE]);
    }

    #[tokio::test]
    async fn test_resume_without_record() {
        let h = Harness::builder().build();
        let err = h.engine.resume(None).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
        assert!(err.to_string().contains("nothing to resume"));
    }

    #[tokio::test]
    async fn test_start_on_in_progress_run_is_rejected_without_mutation() {
        let h = Harness::builder().build();
        let mut existing = WorkflowState::new(text_source(), Utc::now());
        existing.current_stage = StageId::Testing;
        h.store.save(&existing).unwrap();

        let err = h.engine.start(text_source()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));
        assert_eq!(h.engine.status().unwrap(), Some(existing));
        assert!(h.pulls.calls().is_empty());
    }

    #[tokio::test]
    async fn test_secondary_provider_serves_when_primary_fails() {
        let h = Harness::builder()
            .primary(ScriptedBackend::new("primary"))
            .secondary(
                ScriptedBackend::new("secondary")
                    .answer(SPEC_PURPOSE, GOOD_SPEC)
                    .answer(CODE_PURPOSE, &format!("Sure! Here it is:\n{GOOD_FILES}\nEnjoy.")),
            )
            .build();

        let report = h.engine.start(text_source()).await.unwrap();
        assert_eq!(
            report.state.context.artifact_origin,
            Some(ArtifactOrigin::Generated)
        );
        assert_eq!(h.secondary.calls(), vec![SPEC_PURPOSE, CODE_PURPOSE]);
    }

    #[tokio::test]
    async fn test_code_generation_falls_back_to_static_set() {
        let h = Harness::builder()
            .primary(ScriptedBackend::new("primary").answer(SPEC_PURPOSE, GOOD_SPEC))
            .build();

        let report = h.engine.start(text_source()).await.unwrap();
        let ctx = &report.state.context;
        assert_eq!(ctx.artifact_origin, Some(ArtifactOrigin::Fallback));
        assert!(matches!(
            ctx.outcome_of(StageId::CodeGeneration),
            Some(StageOutcome::Warning(_))
        ));
        let pushed = h.pulls.pushed.lock().unwrap().clone();
        assert_eq!(pushed, crate::fallback::fallback_artifacts("# Todo app\nTrack my todos."));
    }

    #[tokio::test]
    async fn test_ci_timeout_is_a_warning_and_the_run_continues() {
        let h = Harness::builder()
            .pulls(MockPulls::with_checks([CheckStatus::Pending]))
            .build();

        let report = h.engine.start(text_source()).await.unwrap();
        let ctx = &report.state.context;
        assert_eq!(ctx.checks, Some(CheckStatus::Pending));
        match ctx.outcome_of(StageId::Testing) {
            Some(StageOutcome::Warning(reason)) => assert!(reason.contains("CI checks")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(ctx.outcome_of(StageId::VisualTesting).is_some());
    }

    #[tokio::test]
    async fn test_ci_failure_is_recorded() {
        let h = Harness::builder()
            .pulls(MockPulls::with_checks([
                CheckStatus::Pending,
                CheckStatus::Failure,
            ]))
            .build();

        let report = h.engine.start(text_source()).await.unwrap();
        assert_eq!(report.state.context.checks, Some(CheckStatus::Failure));
    }

    #[tokio::test]
    async fn test_unresolved_preview_is_unknown() {
        let h = Harness::builder().preview(PreviewStatus::Unknown).build();
        let report = h.engine.start(text_source()).await.unwrap();
        assert_eq!(
            report.state.context.preview_url.as_deref(),
            Some(PREVIEW_UNKNOWN)
        );
    }

    #[tokio::test]
    async fn test_visual_skip_and_metered_pass() {
        let h = Harness::builder().build();
        let report = h.engine.start(text_source()).await.unwrap();
        assert!(matches!(
            report.state.context.outcome_of(StageId::VisualTesting),
            Some(StageOutcome::Skipped(_))
        ));

        let h = Harness::builder()
            .visual(VisualOutcome::Passed {
                snapshots: 12,
                browser_minutes: 3.5,
            })
            .build();
        h.engine.start(text_source()).await.unwrap();
        let report = h.guard.report_daily().await.unwrap();
        let visual: Vec<_> = report
            .entries
            .iter()
            .filter(|e| e.provider == crate::stages::VISUAL_PROVIDER)
            .collect();
        assert_eq!(visual.len(), 2);
    }

    #[tokio::test]
    async fn test_issue_fallback_and_unavailable_source() {
        let h = Harness::builder()
            .issues(Err(AdapterError::NotFound("issue 9".into())))
            .build();
        let source = RequirementsSource::new(Some("9".into()), Some("inline".into())).unwrap();
        let report = h.engine.start(source).await.unwrap();
        assert_eq!(report.state.context.requirements_text.as_deref(), Some("inline"));
        assert!(matches!(
            report.state.context.outcome_of(StageId::Requirements),
            Some(StageOutcome::Warning(_))
        ));

        let h = Harness::builder()
            .issues(Err(AdapterError::NotFound("issue 9".into())))
            .build();
        let err = h
            .engine
            .start(RequirementsSource::issue("9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::SourceUnavailable));
        let state = h.engine.status().unwrap().unwrap();
        assert_eq!(state.current_stage, StageId::Requirements);
    }

    #[tokio::test]
    async fn test_issue_without_body_falls_back_to_inline_text() {
        let h = Harness::builder().issues(Ok(String::new())).build();
        let source = RequirementsSource::new(Some("9".into()), Some("inline".into())).unwrap();

        let report = h.engine.start(source).await.unwrap();

        assert_eq!(report.state.context.requirements_text.as_deref(), Some("inline"));
        assert!(matches!(
            report.state.context.outcome_of(StageId::Requirements),
            Some(StageOutcome::Warning(msg)) if msg.contains("issue has no body")
        ));
    }

    #[tokio::test]
    async fn test_halt_denies_before_the_stage_runs() {
        let h = Harness::builder().build();
        h.guard.halt("operator kill").await.unwrap();

        let err = h.engine.start(text_source()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::BudgetExceeded));
        let state = h.engine.status().unwrap().unwrap();
        assert_eq!(state.current_stage, StageId::Requirements);
        assert!(state.details.starts_with("BudgetExceeded:"));
        assert!(state.context.stages.is_empty());

        h.guard.clear("alice").await.unwrap();
        h.engine.resume(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_spend_crossing_cap_stops_at_next_boundary() {
        // One scripted call costs 2 cents at the harness price.
        let h = Harness::builder().cap(Money::from_cents(1)).build();

        let err = h.engine.start(text_source()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::BudgetExceeded));
        let state = h.engine.status().unwrap().unwrap();
        assert_eq!(state.current_stage, StageId::CodeGeneration);
        assert!(state.context.spec_document.is_some());
        assert!(h.guard.is_halted().await.unwrap());
    }

    #[tokio::test]
    async fn test_cost_check_warns_near_the_cap() {
        // Two scripted calls at 2 cents each against a 5 cent cap: past 80%, under the cap.
        let h = Harness::builder().cap(Money::from_cents(5)).build();

        let report = h.engine.start(text_source()).await.unwrap();

        let outcome = report.state.context.outcome_of(StageId::CostCheck).unwrap();
        assert!(
            matches!(outcome, StageOutcome::Warning(msg) if msg.contains("warning threshold")),
            "{outcome:?}"
        );
        let costs = report.state.context.cost_report.as_ref().unwrap();
        assert!(costs.warning);
        assert!(!costs.halted);
        assert!(costs.spent < costs.cap);
    }

    #[tokio::test]
    async fn test_run_lock_blocks_a_second_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("run.lock")).unwrap();
        let held = RunLock::acquire(&path, DEFAULT_LOCK_TTL).unwrap();

        let h = Harness::builder().build();
        let engine = h.engine.with_lock(path.clone());
        let err = engine.start(text_source()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));
        assert_eq!(engine.status().unwrap(), None);

        drop(held);
        engine.start(text_source()).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_reset_never_wipes_a_live_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("run.lock")).unwrap();
        let h = Harness::builder().build();
        let mut live = WorkflowState::new(text_source(), Utc::now());
        live.current_stage = StageId::Testing;
        h.store.save(&live).unwrap();
        let engine = h.engine.with_lock(path.clone());

        let held = RunLock::acquire(&path, DEFAULT_LOCK_TTL).unwrap();
        let err = engine.start_over(text_source()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));
        let err = engine.reset().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));
        assert_eq!(engine.status().unwrap(), Some(live));
        assert!(path.exists());

        drop(held);
        let report = engine.start_over(text_source()).await.unwrap();
        assert_eq!(report.state.status, WorkflowStatus::Completed);
        // Artifacts outlive the completed run until reset.
        assert!(engine.reset().unwrap());
        assert!(!engine.reset().unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_describes_effects_without_writing() {
        let h = Harness::builder().build();

        let report = h
            .engine
            .dry_run(crate::DryRunRequest::Start {
                source: RequirementsSource::issue("12"),
                reset: false,
            })
            .await
            .unwrap();

        let run = report.outcome.unwrap();
        assert_eq!(run.state.status, WorkflowStatus::Completed);
        assert!(report.effects.iter().any(|e| e == "would fetch issue 12"));
        assert!(report.effects.iter().any(|e| e.contains("draft pull request")));
        assert!(
            report
                .effects
                .iter()
                .any(|e| e == "would request specification from the generation provider")
        );

        assert_eq!(h.engine.status().unwrap(), None);
        assert!(h.pulls.calls().is_empty());
        assert!(h.primary.calls().is_empty());
        assert_eq!(h.guard.report_daily().await.unwrap().entries.len(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_reports_already_running() {
        let h = Harness::builder().build();
        h.store
            .save(&WorkflowState::new(text_source(), Utc::now()))
            .unwrap();

        let report = h
            .engine
            .dry_run(crate::DryRunRequest::Start {
                source: text_source(),
                reset: false,
            })
            .await
            .unwrap();
        let err = report.outcome.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));

        let report = h
            .engine
            .dry_run(crate::DryRunRequest::Start {
                source: text_source(),
                reset: true,
            })
            .await
            .unwrap();
        assert!(report.outcome.is_ok());
        assert_eq!(report.effects[0], "would discard the recorded pipeline state");
        assert!(h.engine.status().unwrap().unwrap().is_in_progress());
    }
}
