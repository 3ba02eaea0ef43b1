//! `budget report | halt | clear`

use shipwright_budget::{BudgetGuard, BudgetReport};
use shipwright_utils::ShipwrightError;

use crate::cli::args::BudgetCommands;

pub async fn execute_budget_command(
    guard: &BudgetGuard,
    command: BudgetCommands,
) -> Result<(), ShipwrightError> {
    match command {
        BudgetCommands::Report { json } => {
            let report = guard.report_daily().await?;
            if json {
                let out = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
                println!("{out}");
            } else {
                print_report(&report);
            }
        }
        BudgetCommands::Halt { reason } => {
            let report = guard.halt(&reason).await?;
            println!("✓ Pipeline halted: {}", report.halt_reason.as_deref().unwrap_or(&reason));
            println!("  No stage will run until `shipwright budget clear --operator <NAME>`");
        }
        BudgetCommands::Clear { operator } => {
            let report = guard.clear(&operator).await?;
            println!("✓ Halt cleared by {operator}");
            if report.spent >= report.cap {
                println!(
                    "  Note: today's spend {} has already reached the {} cap; the next stage will halt again",
                    report.spent, report.cap
                );
            }
        }
    }
    Ok(())
}

fn print_report(report: &BudgetReport) {
    println!(
        "Budget for {}: {} of {} spent, {} remaining",
        report.date, report.spent, report.cap, report.remaining
    );
    if report.halted {
        println!(
            "  HALTED: {}",
            report.halt_reason.as_deref().unwrap_or("no reason recorded")
        );
    } else if report.warning {
        println!("  Warning: spend has reached the warning threshold");
    }

    if report.entries.is_empty() {
        println!("  No usage recorded today");
        return;
    }
    println!("  Usage:");
    for entry in &report.entries {
        println!(
            "    {} {:<10} {:<16} {:>8}{}",
            entry.timestamp.format("%H:%M:%S"),
            entry.provider,
            entry.purpose,
            entry.cost.to_string(),
            if entry.success { "" } else { "  (failed)" }
        );
    }
}
