//! Deterministic backend for dry runs: answers by invocation purpose.

use async_trait::async_trait;
use std::collections::HashMap;

use shipwright_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    responses: HashMap<String, String>,
    fallback: String,
}

impl StubBackend {
    #[must_use]
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            responses: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    #[must_use]
    pub fn with_response(mut self, purpose: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(purpose.into(), text.into());
        self
    }
}

#[async_trait]
impl LlmBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let text = self
            .responses
            .get(&inv.purpose)
            .unwrap_or(&self.fallback)
            .clone();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse("stub".to_string()));
        }
        Ok(LlmResult::new(text, "stub", "stub").with_tokens(0, 0))
    }
}
