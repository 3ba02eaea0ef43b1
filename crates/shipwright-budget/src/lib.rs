//! Budget guard: the single authority on whether the pipeline may keep spending.
//!
//! Spend is tracked per UTC day in integer cents. Crossing the warning ratio
//! notifies; reaching the cap trips a sticky halt that only an explicit
//! operator `clear` lifts.

pub mod guard;
pub mod ledger;
pub mod money;
pub mod notifier;
pub mod pricing;
pub mod record;
pub mod store;

pub use guard::{BudgetGuard, Clock, SystemClock};
pub use ledger::{UsageEntry, UsageKind, UsageLedger};
pub use money::Money;
pub use notifier::{BudgetEvent, LogNotifier, Notifier, WebhookNotifier};
pub use pricing::{Pricing, TokenPrice, estimate_tokens};
pub use record::{AuditAction, AuditEntry, BudgetRecord, BudgetReport};
pub use store::{BudgetStore, FileBudgetStore, MemoryBudgetStore};
