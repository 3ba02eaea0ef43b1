//! Secondary provider: a local Ollama server (`/api/generate`, non-streaming)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shipwright_config::SecondaryProviderConfig;
use shipwright_utils::error::LlmError;

use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Role};

#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: HttpClient,
    base_url: String,
    default_model: String,
}

impl OllamaBackend {
    pub fn from_config(config: &SecondaryProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: config.base_url.clone(),
            default_model: config.model.clone(),
        })
    }

    /// `/api/generate` takes one prompt plus an optional system string.
    fn build_request(&self, inv: &LlmInvocation) -> OllamaRequest {
        let system: Vec<&str> = inv
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let prompt: Vec<&str> = inv
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect();

        OllamaRequest {
            model: if inv.model.is_empty() {
                self.default_model.clone()
            } else {
                inv.model.clone()
            },
            prompt: prompt.join("\n\n"),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            stream: false,
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let body = self.build_request(&inv);
        debug!(
            provider = "ollama",
            model = %body.model,
            purpose = %inv.purpose,
            "Invoking Ollama backend"
        );

        let request = self.client.post(&self.base_url).json(&body);
        let response = self.client.execute(request, inv.timeout, "ollama").await?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse Ollama response: {e}")))?;

        let text = parsed.response.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse("ollama".to_string()));
        }

        let mut result = LlmResult::new(text, "ollama", body.model);
        if let (Some(input), Some(output)) = (parsed.prompt_eval_count, parsed.eval_count) {
            result = result.with_tokens(input, output);
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaResponse {
    response: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::time::Duration;

    #[test]
    fn test_build_request_splits_system() {
        let backend = OllamaBackend::from_config(&SecondaryProviderConfig::default()).unwrap();
        let inv = LlmInvocation::new(
            "code",
            Duration::from_secs(60),
            vec![Message::system("Return JSON only."), Message::user("Build it.")],
        );

        let req = backend.build_request(&inv);

        assert_eq!(req.model, "codellama");
        assert_eq!(req.prompt, "Build it.");
        assert_eq!(req.system.as_deref(), Some("Return JSON only."));
        assert!(!req.stream);
    }

    #[test]
    fn test_null_response_is_empty() {
        let parsed: OllamaResponse = serde_json::from_str(r#"{"response": null}"#).unwrap();
        assert!(parsed.response.unwrap_or_default().is_empty());
    }
}
