//! The eight fixed stages and their terminal outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the eight pipeline stages, numbered 1 through 8.
///
/// Persisted as its number so `workflow.json` reads `"current_stage": 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StageId {
    Requirements = 1,
    Specification = 2,
    CodeGeneration = 3,
    Testing = 4,
    VisualTesting = 5,
    Preview = 6,
    CostCheck = 7,
    Completion = 8,
}

impl StageId {
    pub const ALL: [StageId; 8] = [
        StageId::Requirements,
        StageId::Specification,
        StageId::CodeGeneration,
        StageId::Testing,
        StageId::VisualTesting,
        StageId::Preview,
        StageId::CostCheck,
        StageId::Completion,
    ];

    pub const FIRST: StageId = StageId::Requirements;

    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Specification => "specification",
            Self::CodeGeneration => "code-generation",
            Self::Testing => "testing",
            Self::VisualTesting => "visual-testing",
            Self::Preview => "preview",
            Self::CostCheck => "cost-check",
            Self::Completion => "completion",
        }
    }

    #[must_use]
    pub fn from_number(n: u8) -> Option<Self> {
        n.checked_sub(1)
            .and_then(|i| Self::ALL.get(usize::from(i)).copied())
    }

    /// The following stage; `None` after completion.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

impl From<StageId> for u8 {
    fn from(stage: StageId) -> u8 {
        stage.number()
    }
}

impl TryFrom<u8> for StageId {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n).ok_or_else(|| format!("stage must be between 1 and 8, got {n}"))
    }
}

/// Accepts a number (`3`) or a stage name (`code-generation`).
impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Self::try_from(n);
        }
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// Terminal outcome of a stage that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    /// Finished in a degraded way; the run continues
    Warning(String),
    /// Not applicable in this environment
    Skipped(String),
}

impl StageOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Warning(_) => "warning",
            Self::Skipped(_) => "skipped",
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Completed => None,
            Self::Warning(reason) | Self::Skipped(reason) => Some(reason),
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {reason}", self.label()),
            None => f.write_str(self.label()),
        }
    }
}
