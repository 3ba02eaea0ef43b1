//! `start` and `resume`, live or dry.

use shipwright_engine::{
    DryRunReport, DryRunRequest, RequirementsSource, RunReport, StageId, WorkflowEngine,
    WorkflowStatus, render_summary,
};
use shipwright_utils::ShipwrightError;

pub async fn execute_start_command(
    engine: &WorkflowEngine,
    issue: Option<String>,
    spec: Option<String>,
    dry_run: bool,
    reset: bool,
) -> Result<(), ShipwrightError> {
    let source = RequirementsSource::new(issue, spec)?;

    if dry_run {
        let report = engine
            .dry_run(DryRunRequest::Start { source, reset })
            .await?;
        return print_dry_run(report);
    }

    let result = if reset {
        engine.start_over(source).await
    } else {
        engine.start(source).await
    };
    finish(engine, result)
}

pub async fn execute_resume_command(
    engine: &WorkflowEngine,
    stage: Option<StageId>,
    dry_run: bool,
) -> Result<(), ShipwrightError> {
    if dry_run {
        let report = engine.dry_run(DryRunRequest::Resume(stage)).await?;
        return print_dry_run(report);
    }

    let result = engine.resume(stage).await;
    finish(engine, result)
}

fn finish(
    engine: &WorkflowEngine,
    result: Result<RunReport, ShipwrightError>,
) -> Result<(), ShipwrightError> {
    match result {
        Ok(report) => {
            print!("{}", report.summary);
            Ok(())
        }
        Err(err) => {
            print_failure_snapshot(engine, &err);
            Err(err)
        }
    }
}

/// Where a failed run stopped, so the operator knows what `resume` will retry.
fn print_failure_snapshot(engine: &WorkflowEngine, err: &ShipwrightError) {
    let Ok(Some(state)) = engine.status() else {
        return;
    };
    if state.status != WorkflowStatus::Failed {
        return;
    }
    let kind = err.kind().map_or("Internal", |k| k.as_str());
    eprintln!("✗ Pipeline failed at stage {} [{kind}]", state.current_stage);
    eprint!("{}", render_summary(&state));
    eprintln!("Run `shipwright resume` to retry stage {}.\n", state.current_stage);
}

fn print_dry_run(report: DryRunReport) -> Result<(), ShipwrightError> {
    println!("Dry run: no external effects were performed");
    if report.effects.is_empty() {
        println!("  (no external effects planned)");
    }
    for (i, effect) in report.effects.iter().enumerate() {
        println!("  {:>2}. {effect}", i + 1);
    }
    println!();

    let run = report.outcome?;
    print!("{}", run.summary);
    Ok(())
}
