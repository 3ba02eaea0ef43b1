//! Primary provider: Anthropic Messages API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shipwright_config::PrimaryProviderConfig;
use shipwright_utils::error::LlmError;

use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicBackend {
    pub fn new(api_key: String, config: &PrimaryProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: config.base_url.clone(),
            api_key,
            default_model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build from config, reading the key from `api_key_env`.
    ///
    /// # Errors
    ///
    /// `LlmError::Misconfiguration` when the variable is unset or empty.
    pub fn from_config(config: &PrimaryProviderConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "Anthropic API key not found in environment variable '{}'",
                    config.api_key_env
                ))
            })?;
        Self::new(api_key, config)
    }

    /// System messages go into the top-level `system` field; the rest stay in order.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => match system_prompt.as_mut() {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    }
                    None => system_prompt = Some(msg.content.clone()),
                },
                Role::User => converted.push(AnthropicMessage {
                    role: "user",
                    content: msg.content.clone(),
                }),
                Role::Assistant => converted.push(AnthropicMessage {
                    role: "assistant",
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, converted)
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .map_or(self.max_tokens, |v| v as u32);

        debug!(
            provider = "anthropic",
            model = %model,
            purpose = %inv.purpose,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let body = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens,
            temperature: self.temperature,
            system,
        };

        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self.client.execute(request, inv.timeout, "anthropic").await?;

        let response_body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse Anthropic response: {e}")))?;

        let content: String = response_body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse("anthropic".to_string()));
        }

        let mut result = LlmResult::new(content, "anthropic", model);
        if let Some(usage) = response_body.usage {
            result = result.with_tokens(usage.input_tokens, usage.output_tokens);
        }

        debug!(
            provider = "anthropic",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Anthropic invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_separates_system() {
        let messages = vec![
            Message::system("You are a product manager."),
            Message::system("Answer in markdown."),
            Message::user("Write a spec."),
        ];

        let (system, converted) = AnthropicBackend::convert_messages(&messages);

        assert_eq!(
            system.as_deref(),
            Some("You are a product manager.\n\nAnswer in markdown.")
        );
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
    }

    #[test]
    fn test_request_omits_empty_system() {
        let body = AnthropicRequest {
            model: "m".into(),
            messages: vec![],
            max_tokens: 10,
            temperature: 0.2,
            system: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "{\"files\":"}, {"type": "text", "text": "[]}"}],
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(text, "{\"files\":[]}");
        assert_eq!(parsed.usage.unwrap().output_tokens, 7);
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = PrimaryProviderConfig {
            api_key_env: "SHIPWRIGHT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..PrimaryProviderConfig::default()
        };
        assert!(matches!(
            AnthropicBackend::from_config(&config),
            Err(LlmError::Misconfiguration(_))
        ));
    }
}
