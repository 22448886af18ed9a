use super::{http_client, map_status_error, map_transport_error, LLMError, LLMProvider, Message};
use crate::config::OpenAIConfig;
use crate::secrets::SecretManager;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const API_KEY: &str = "openai_api_key";

pub struct OpenAIProvider {
    config: OpenAIConfig,
    secrets: Arc<SecretManager>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, secrets: Arc<SecretManager>, timeout: Duration) -> Self {
        Self {
            config,
            secrets,
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
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
        let url = format!("{}/chat/completions", base_url);

        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.config.model,
            "messages": api_messages,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error("OpenAI", base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error("OpenAI", status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }
}
