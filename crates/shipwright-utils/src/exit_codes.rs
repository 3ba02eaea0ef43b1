//! Exit code constants for shipwright.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Stage 8 completed, or a read-only command succeeded |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `INVALID_INPUT` | Invalid CLI arguments or configuration |
//! | 3 | `SOURCE_UNAVAILABLE` | Requirements could not be fetched |
//! | 4 | `BUDGET_EXCEEDED` | Budget guard denied a stage or the pipeline is halted |
//! | 9 | `ALREADY_RUNNING` | Another run owns the pipeline state |
//! | 10 | `TIMEOUT` | A polling bound was escalated to a failure |
//! | 70 | `GENERATION_FAILED` | Every generation provider was exhausted |

/// Exit codes matching the documented exit code table.
///
/// Use the named constants, or [`as_i32()`](Self::as_i32) for `std::process::exit()`.
///
/// ```rust
/// use shipwright_utils::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::ALREADY_RUNNING, ExitCode::from_i32(9));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid input - bad CLI usage or configuration
    pub const INVALID_INPUT: ExitCode = ExitCode(2);

    /// Requirements source unavailable
    pub const SOURCE_UNAVAILABLE: ExitCode = ExitCode(3);

    /// Budget guard denial or sticky halt
    pub const BUDGET_EXCEEDED: ExitCode = ExitCode(4);

    /// Another run is already in progress
    pub const ALREADY_RUNNING: ExitCode = ExitCode(9);

    /// Polling timeout escalated to failure
    pub const TIMEOUT: ExitCode = ExitCode(10);

    /// Generation providers exhausted
    pub const GENERATION_FAILED: ExitCode = ExitCode(70);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
