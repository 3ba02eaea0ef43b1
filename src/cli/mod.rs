//! Command-line interface for shipwright
//!
//! - `args`: clap definitions
//! - `run`: entry point, config discovery, and dispatch
//! - `commands`: one module per subcommand plus the shared wiring

pub mod args;
mod commands;
mod run;

pub use args::{BudgetCommands, Cli, Commands};
pub use run::run;
