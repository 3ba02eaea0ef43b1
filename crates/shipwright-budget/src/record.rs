use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::UsageEntry;
use crate::money::Money;

/// Operator and guard actions recorded against a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Warn,
    Halt,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: String,
    pub reason: String,
}

/// Persisted spend for one UTC calendar day.
///
/// `spent` never decreases within a day. `halted` stays true until a `clear`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub date: NaiveDate,
    pub spent: Money,
    pub cap: Money,
    pub halted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    /// Whether the warning notification already went out today
    #[serde(default)]
    pub warned: bool,
    #[serde(default)]
    pub entries: Vec<UsageEntry>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetRecord {
    #[must_use]
    pub fn new(date: NaiveDate, cap: Money, now: DateTime<Utc>) -> Self {
        Self {
            date,
            spent: Money::ZERO,
            cap,
            halted: false,
            halt_reason: None,
            warned: false,
            entries: Vec::new(),
            audit: Vec::new(),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Money {
        self.cap.saturating_remaining(self.spent)
    }

    #[must_use]
    pub fn cap_reached(&self) -> bool {
        self.spent >= self.cap
    }
}

/// Read-only snapshot of a day's budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub date: NaiveDate,
    pub spent: Money,
    pub cap: Money,
    pub remaining: Money,
    /// Spend has reached the warning ratio of the cap
    pub warning: bool,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub entries: Vec<UsageEntry>,
}
