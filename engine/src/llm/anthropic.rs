use super::{
    http_client, map_status_error, map_transport_error, LLMError, LLMProvider, Message,
    MessageRole,
};
use crate::config::AnthropicConfig;
use crate::secrets::SecretManager;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const API_KEY: &str = "anthropic_api_key";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    config: AnthropicConfig,
    secrets: Arc<SecretManager>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig, secrets: Arc<SecretManager>, timeout: Duration) -> Self {
        Self {
            config,
            secrets,
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn check_health(&self) -> bool {
        self.secrets.has_secret(API_KEY)
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<String> {
        let api_key = self
            .secrets
            .get_secret(API_KEY)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let base_url = self.config.base_url.trim_end_matches('/');
        let url = format!("{}/messages", base_url);

        let mut system_prompt = String::new();
        let mut api_messages = Vec::new();
        for msg in messages {
            if msg.role == MessageRole::System {
                system_prompt.push_str(&msg.content);
                system_prompt.push('\n');
                continue;
            }
            api_messages.push(json!({
                "role": if msg.role == MessageRole::Assistant { "assistant" } else { "user" },
                "content": msg.content
            }));
        }

        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": MAX_TOKENS,
            "messages": api_messages,
        });
        if !system_prompt.is_empty() {
            payload["system"] = json!(system_prompt);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error("Anthropic", base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error("Anthropic", status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let mut full_content = String::new();
        for item in content_arr {
            if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                full_content.push_str(text);
            }
        }

        Ok(full_content)
    }
}
