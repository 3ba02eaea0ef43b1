pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod redaction;

pub use error::{ErrorKind, PipelineError, ShipwrightError, UserFriendlyError};
pub use exit_codes::ExitCode;
