//! `status` and `reset`

use chrono::Utc;

use shipwright_engine::{WorkflowEngine, WorkflowState, render_summary};
use shipwright_utils::ShipwrightError;

/// Print the recorded run. Read-only; takes no lock.
pub fn execute_status_command(engine: &WorkflowEngine, json: bool) -> Result<(), ShipwrightError> {
    let recorded = engine.status()?;

    if json {
        let state = recorded.unwrap_or_else(|| WorkflowState::not_started(Utc::now()));
        let out = serde_json::to_string_pretty(&state).map_err(std::io::Error::from)?;
        println!("{out}");
        return Ok(());
    }

    let Some(state) = recorded else {
        println!("No pipeline run recorded");
        println!("  Start one with `shipwright start --issue <N>` or `--spec <TEXT>`");
        return Ok(());
    };

    print!("{}", render_summary(&state));
    println!("Next stage:      {}", state.current_stage);
    println!("Details:         {}", state.details);
    println!("Last updated:    {}", state.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

pub fn execute_reset_command(engine: &WorkflowEngine) -> Result<(), ShipwrightError> {
    if engine.reset()? {
        println!("Discarded the recorded pipeline run");
    } else {
        println!("Nothing to reset");
    }
    Ok(())
}
