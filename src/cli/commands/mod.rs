//! CLI command implementations.

mod budget;
mod common;
mod pipeline;
mod status;

pub use budget::execute_budget_command;
pub use common::{build_engine, build_guard};
pub use pipeline::{execute_resume_command, execute_start_command};
pub use status::{execute_reset_command, execute_status_command};
