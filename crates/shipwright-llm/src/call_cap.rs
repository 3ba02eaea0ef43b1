//! Per-run call cap around any backend.
//!
//! The cap counts attempted calls, not successful ones: a failing backend still
//! consumes its slot. Hitting the cap is an ordinary provider failure, so the
//! provider client simply falls back.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use shipwright_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Default cap on provider calls per run
pub const DEFAULT_MAX_CALLS_PER_RUN: u32 = 20;

pub struct CallCappedBackend {
    inner: Arc<dyn LlmBackend>,
    calls: AtomicU32,
    limit: u32,
}

impl CallCappedBackend {
    pub fn new(inner: Arc<dyn LlmBackend>, limit: u32) -> Self {
        debug!(provider = inner.name(), limit = limit, "Creating CallCappedBackend");
        Self {
            inner,
            calls: AtomicU32::new(0),
            limit,
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl LlmBackend for CallCappedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        // Count before calling so failures consume a slot too.
        let current = self.calls.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(
                provider = self.inner.name(),
                limit = self.limit,
                attempted = attempted,
                "Per-run call cap reached"
            );
            return Err(LlmError::CallCapExceeded {
                limit: self.limit,
                attempted,
            });
        }

        self.inner.invoke(inv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct CountingBackend {
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LlmError::Transport("boom".into()))
            } else {
                Ok(LlmResult::new("ok", "counting", "m"))
            }
        }
    }

    fn inv() -> LlmInvocation {
        LlmInvocation::new("test", Duration::from_secs(1), vec![])
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let inner = Arc::new(CountingBackend {
            fail: false,
            calls: AtomicU32::new(0),
        });
        let capped = CallCappedBackend::new(inner.clone(), 2);

        assert!(capped.invoke(inv()).await.is_ok());
        assert!(capped.invoke(inv()).await.is_ok());
        match capped.invoke(inv()).await {
            Err(LlmError::CallCapExceeded { limit, attempted }) => {
                assert_eq!(limit, 2);
                assert_eq!(attempted, 3);
            }
            other => panic!("Expected CallCapExceeded, got {other:?}"),
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(capped.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failures_consume_slots() {
        let inner = Arc::new(CountingBackend {
            fail: true,
            calls: AtomicU32::new(0),
        });
        let capped = CallCappedBackend::new(inner, 1);

        assert!(matches!(capped.invoke(inv()).await, Err(LlmError::Transport(_))));
        assert!(matches!(
            capped.invoke(inv()).await,
            Err(LlmError::CallCapExceeded { .. })
        ));
        assert_eq!(capped.name(), "counting");
    }
}
