//! Bounded polling that stays responsive to the budget kill-switch.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use shipwright_budget::BudgetGuard;
use shipwright_utils::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult<T> {
    Ready(T),
    TimedOut,
}

/// Call `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The halt flag is checked before every probe; a halt observed mid-poll ends
/// the loop with `BudgetExceeded`. Guard read errors are treated as a halt.
pub async fn poll_until<T, F, Fut>(
    guard: &BudgetGuard,
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<PollResult<T>, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        let halted = guard.is_halted().await.unwrap_or(true);
        if halted {
            return Err(PipelineError::BudgetExceeded {
                reason: format!("pipeline halted while waiting for {what}"),
            });
        }

        attempt += 1;
        if let Some(value) = probe().await {
            debug!(what = what, attempt = attempt, "Poll satisfied");
            return Ok(PollResult::Ready(value));
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(what = what, attempt = attempt, "Poll timed out");
            return Ok(PollResult::TimedOut);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_budget::{LogNotifier, MemoryBudgetStore, Money};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn guard() -> BudgetGuard {
        BudgetGuard::new(
            Arc::new(MemoryBudgetStore::new()),
            Arc::new(LogNotifier),
            Money::from_usd(5.0),
            0.8,
        )
    }

    #[tokio::test]
    async fn test_ready_after_a_few_probes() {
        let guard = guard();
        let calls = AtomicU32::new(0);

        let result = poll_until(&guard, "ci", Duration::from_secs(5), Duration::from_millis(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { (n >= 3).then_some(n) }
        })
        .await
        .unwrap();

        assert_eq!(result, PollResult::Ready(3));
    }

    #[tokio::test]
    async fn test_times_out() {
        let guard = guard();
        let result: PollResult<()> = poll_until(
            &guard,
            "preview",
            Duration::from_millis(30),
            Duration::from_millis(10),
            || async { None },
        )
        .await
        .unwrap();
        assert_eq!(result, PollResult::TimedOut);
    }

    #[tokio::test]
    async fn test_halt_stops_polling() {
        let guard = guard();
        let calls = AtomicU32::new(0);

        let err = poll_until(&guard, "ci", Duration::from_secs(5), Duration::from_millis(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            let guard = &guard;
            async move {
                guard.halt("operator kill").await.unwrap();
                None::<()>
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::BudgetExceeded { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
