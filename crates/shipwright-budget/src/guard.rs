use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use shipwright_config::BudgetConfig;
use shipwright_utils::{PipelineError, ShipwrightError};

use crate::ledger::{UsageEntry, UsageKind, UsageLedger};
use crate::money::Money;
use crate::notifier::{BudgetEvent, LogNotifier, Notifier};
use crate::pricing::Pricing;
use crate::record::{AuditAction, AuditEntry, BudgetRecord, BudgetReport};
use crate::store::{BudgetStore, MemoryBudgetStore};

const GUARD_ACTOR: &str = "budget-guard";

/// Source of "now"; budget days are UTC calendar days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tracks spend against the daily cap and owns the sticky halt flag.
///
/// Every method re-reads the store, so two guards over the same store (or a
/// guard in a restarted process) always agree on the halt state.
pub struct BudgetGuard {
    store: Arc<dyn BudgetStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cap: Money,
    warn_ratio: f64,
    pricing: Pricing,
    // Serializes read-modify-write of the day's record within this process.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for BudgetGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGuard")
            .field("cap", &self.cap)
            .field("warn_ratio", &self.warn_ratio)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

impl BudgetGuard {
    pub fn new(
        store: Arc<dyn BudgetStore>,
        notifier: Arc<dyn Notifier>,
        cap: Money,
        warn_ratio: f64,
    ) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            cap,
            warn_ratio,
            pricing: Pricing {
                browser_minute_usd: 0.0,
                snapshot_usd: 0.0,
            },
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(
        config: &BudgetConfig,
        store: Arc<dyn BudgetStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(
            store,
            notifier,
            Money::from_usd(config.daily_cap_usd),
            config.warn_ratio,
        )
        .with_pricing(Pricing::from(config))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    #[must_use]
    pub fn cap(&self) -> Money {
        self.cap
    }

    #[must_use]
    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    #[must_use]
    pub fn warn_ratio(&self) -> f64 {
        self.warn_ratio
    }

    /// Every record held by the store for today and earlier days it inherits from.
    ///
    /// Used to seed an in-memory copy for dry runs.
    pub fn snapshot_records(&self) -> Result<Vec<BudgetRecord>, ShipwrightError> {
        let today = self.today();
        let mut records = Vec::new();
        if let Some(prev) = self.store.latest_before(today)? {
            records.push(prev);
        }
        if let Some(current) = self.store.load(today)? {
            records.push(current);
        }
        Ok(records)
    }

    /// In-memory guard seeded with this guard's records, cap, and pricing.
    ///
    /// Notifications only go to the log, so a dry run can exercise every
    /// budget path without touching disk or webhooks.
    pub fn dry_run_copy(&self) -> Result<BudgetGuard, ShipwrightError> {
        let store = MemoryBudgetStore::with_records(self.snapshot_records()?);
        Ok(BudgetGuard::new(
            Arc::new(store),
            Arc::new(LogNotifier),
            self.cap,
            self.warn_ratio,
        )
        .with_clock(self.clock.clone())
        .with_pricing(self.pricing))
    }

    /// Add `cost` to today's spend.
    ///
    /// Emits a warning notification the first time spend reaches the warning
    /// ratio, and halts when spend reaches the cap. Not deduplicated.
    pub async fn record_usage(&self, cost: Money) -> Result<BudgetReport, ShipwrightError> {
        self.apply_spend(cost, None).await
    }

    /// Append a ledger entry and add its cost to today's spend.
    pub async fn record_entry(&self, entry: UsageEntry) -> Result<BudgetReport, ShipwrightError> {
        let cost = entry.cost;
        self.apply_spend(cost, Some(entry)).await
    }

    pub async fn record_browser_minutes(
        &self,
        provider: &str,
        minutes: f64,
    ) -> Result<BudgetReport, ShipwrightError> {
        let cost = self.pricing.browser_minutes(minutes);
        self.record_entry(UsageEntry::metered(
            UsageKind::BrowserMinutes,
            provider,
            "browser automation",
            minutes,
            cost,
        ))
        .await
    }

    pub async fn record_snapshots(
        &self,
        provider: &str,
        count: u32,
    ) -> Result<BudgetReport, ShipwrightError> {
        let cost = self.pricing.snapshots(count);
        self.record_entry(UsageEntry::metered(
            UsageKind::VisualSnapshots,
            provider,
            "visual snapshots",
            f64::from(count),
            cost,
        ))
        .await
    }

    /// False when the pipeline is halted or today's spend has reached the cap.
    ///
    /// Reaching the cap trips the halt, so the denial outlives the day.
    pub async fn check_allowed(&self) -> Result<bool, ShipwrightError> {
        let record = self.load_today()?;
        if record.halted {
            debug!(reason = ?record.halt_reason, "Budget guard denied: halted");
            return Ok(false);
        }
        if record.cap_reached() {
            let reason = format!("daily cap reached: {} of {}", record.spent, record.cap);
            self.halt_as(GUARD_ACTOR, &reason).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Read-only snapshot of today
    pub async fn report_daily(&self) -> Result<BudgetReport, ShipwrightError> {
        let record = self.load_today()?;
        Ok(self.report(&record))
    }

    pub async fn is_halted(&self) -> Result<bool, ShipwrightError> {
        Ok(self.load_today()?.halted)
    }

    /// Operator kill-switch: set the sticky halt.
    pub async fn halt(&self, reason: &str) -> Result<BudgetReport, ShipwrightError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PipelineError::InvalidInput("a halt reason is required".into()).into());
        }
        self.halt_as("operator", reason).await
    }

    /// Operator action lifting the halt. Never called implicitly.
    pub async fn clear(&self, operator: &str) -> Result<BudgetReport, ShipwrightError> {
        let operator = operator.trim();
        if operator.is_empty() {
            return Err(PipelineError::InvalidInput(
                "clearing a halt requires an operator name".into(),
            )
            .into());
        }

        let (record, events) = self.mutate(|record, events, now| {
            let previous = record.halt_reason.take();
            record.halted = false;
            record.audit.push(AuditEntry {
                timestamp: now,
                action: AuditAction::Clear,
                actor: operator.to_string(),
                reason: previous.unwrap_or_else(|| "not halted".to_string()),
            });
            events.push(BudgetEvent::Cleared {
                operator: operator.to_string(),
            });
        })?;

        warn!(operator = %operator, spent = %record.spent, cap = %record.cap, "Budget halt cleared");
        self.dispatch(events).await;
        Ok(self.report(&record))
    }

    async fn halt_as(&self, actor: &str, reason: &str) -> Result<BudgetReport, ShipwrightError> {
        let (record, events) = self.mutate(|record, events, now| {
            let was_halted = record.halted;
            Self::set_halt(record, actor, reason, now);
            if !was_halted {
                events.push(BudgetEvent::Halted {
                    reason: reason.to_string(),
                    spent: record.spent,
                    cap: record.cap,
                });
            }
        })?;

        warn!(actor = %actor, reason = %reason, "Pipeline halted");
        self.dispatch(events).await;
        Ok(self.report(&record))
    }

    async fn apply_spend(
        &self,
        cost: Money,
        entry: Option<UsageEntry>,
    ) -> Result<BudgetReport, ShipwrightError> {
        let warn_at = self.cap.scale(self.warn_ratio);

        let (record, events) = self.mutate(|record, events, now| {
            // Spend never decreases.
            record.spent += cost.max(Money::ZERO);
            if let Some(entry) = entry {
                record.entries.push(entry);
            }

            if !record.warned && record.spent >= warn_at {
                record.warned = true;
                record.audit.push(AuditEntry {
                    timestamp: now,
                    action: AuditAction::Warn,
                    actor: GUARD_ACTOR.to_string(),
                    reason: format!("spend {} reached warning threshold {}", record.spent, warn_at),
                });
                events.push(BudgetEvent::Warning {
                    spent: record.spent,
                    cap: record.cap,
                });
            }

            if record.cap_reached() && !record.halted {
                let reason = format!("daily cap reached: {} of {}", record.spent, record.cap);
                Self::set_halt(record, GUARD_ACTOR, &reason, now);
                events.push(BudgetEvent::Halted {
                    reason,
                    spent: record.spent,
                    cap: record.cap,
                });
            }
        })?;

        debug!(cost = %cost, spent = %record.spent, cap = %record.cap, "Recorded usage");
        self.dispatch(events).await;
        Ok(self.report(&record))
    }

    fn set_halt(record: &mut BudgetRecord, actor: &str, reason: &str, now: DateTime<Utc>) {
        record.halted = true;
        record.halt_reason = Some(reason.to_string());
        record.audit.push(AuditEntry {
            timestamp: now,
            action: AuditAction::Halt,
            actor: actor.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Load, modify, and save today's record under the write lock.
    fn mutate<F>(&self, f: F) -> Result<(BudgetRecord, Vec<BudgetEvent>), ShipwrightError>
    where
        F: FnOnce(&mut BudgetRecord, &mut Vec<BudgetEvent>, DateTime<Utc>),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.clock.now();
        let mut record = self.load_today()?;
        let mut events = Vec::new();
        f(&mut record, &mut events, now);
        record.updated_at = now;
        self.store.save(&record)?;
        Ok((record, events))
    }

    async fn dispatch(&self, events: Vec<BudgetEvent>) {
        for event in &events {
            self.notifier.notify(event).await;
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Today's record, or a fresh one that inherits the halt from the latest earlier day.
    fn load_today(&self) -> Result<BudgetRecord, ShipwrightError> {
        let now = self.clock.now();
        let date = now.date_naive();

        let mut record = match self.store.load(date)? {
            Some(record) => record,
            None => {
                let mut record = BudgetRecord::new(date, self.cap, now);
                if let Some(prev) = self.store.latest_before(date)?
                    && prev.halted
                {
                    info!(from = %prev.date, "Carrying halt over into a new budget day");
                    record.halted = true;
                    record.halt_reason = prev.halt_reason.clone();
                }
                record
            }
        };
        // The configured cap is authoritative; the record keeps it for history.
        record.cap = self.cap;
        Ok(record)
    }

    fn report(&self, record: &BudgetRecord) -> BudgetReport {
        BudgetReport {
            date: record.date,
            spent: record.spent,
            cap: record.cap,
            remaining: record.remaining(),
            warning: record.spent >= record.cap.scale(self.warn_ratio),
            halted: record.halted,
            halt_reason: record.halt_reason.clone(),
            entries: record.entries.clone(),
        }
    }
}

#[async_trait]
impl UsageLedger for BudgetGuard {
    async fn record(&self, entry: UsageEntry) {
        if let Err(e) = self.record_entry(entry).await {
            warn!(error = %e, "Failed to record usage entry");
        }
    }
}
