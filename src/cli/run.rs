//! CLI entry point and dispatch
//!
//! `run()` parses arguments, discovers configuration, builds the tokio runtime,
//! dispatches to a command, and prints every error itself.

use clap::Parser;

use shipwright_config::{CliArgs, Config};
use shipwright_utils::logging::init_tracing;
use shipwright_utils::redaction::redact_secrets;
use shipwright_utils::{ExitCode, ShipwrightError};

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after the error has been printed; `main` only exits.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        verbose: cli.verbose.then_some(true),
        prefer_secondary: cli.prefer_secondary.then_some(true),
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration error: {}", redact_secrets(&format!("{err:#}")));
            return Err(ExitCode::INVALID_INPUT);
        }
    };

    if let Err(e) = init_tracing(config.defaults.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(dispatch(cli.command, &config));

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            eprint!("{}", err.display_for_user());
            Err(err.to_exit_code())
        }
    }
}

async fn dispatch(command: Commands, config: &Config) -> Result<(), ShipwrightError> {
    match command {
        Commands::Start {
            issue,
            spec,
            dry_run,
            reset,
        } => {
            let engine = commands::build_engine(config);
            commands::execute_start_command(&engine, issue, spec, dry_run, reset).await
        }
        Commands::Resume { stage, dry_run } => {
            let engine = commands::build_engine(config);
            commands::execute_resume_command(&engine, stage, dry_run).await
        }
        Commands::Status { json } => {
            commands::execute_status_command(&commands::build_engine(config), json)
        }
        Commands::Reset => commands::execute_reset_command(&commands::build_engine(config)),
        Commands::Budget(budget) => {
            let guard = commands::build_guard(config);
            commands::execute_budget_command(&guard, budget).await
        }
    }
}
