//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the model providers the
//! planner can talk to (Ollama, OpenAI, Anthropic). The planner treats a
//! provider as a black-box request/response function: messages in,
//! free text out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sdk::EngineError;

use crate::config::LLMConfig;
use crate::secrets::SecretManager;

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Timeout => EngineError::LLMTimeout,
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai", "anthropic")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Generate a completion for the given conversation.
    ///
    /// Returns the raw text of the model's reply; interpreting it is the
    /// caller's job.
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the shared HTTP client used by the remote providers.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport error from reqwest onto an [`LLMError`].
pub(crate) fn map_transport_error(provider: &str, base_url: &str, e: reqwest::Error) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else if e.is_connect() {
        LLMError::ProviderUnavailable(format!("Cannot connect to {} at {}", provider, base_url))
    } else {
        LLMError::NetworkError(e.to_string())
    }
}

/// Map a non-success HTTP status onto an [`LLMError`].
pub(crate) fn map_status_error(provider: &str, status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(format!("{} rejected credentials", provider)),
        429 => LLMError::RateLimitExceeded,
        _ => LLMError::ProviderUnavailable(format!("{} API error ({}): {}", provider, status, body)),
    }
}

/// Build the provider named by `llm.default_provider`.
///
/// # Errors
///
/// `EngineError::Config` for an unknown provider name.
pub fn build_provider(
    config: &LLMConfig,
    secrets: Arc<SecretManager>,
) -> std::result::Result<Arc<dyn LLMProvider>, EngineError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let provider: Arc<dyn LLMProvider> = match config.default_provider.as_str() {
        "ollama" => Arc::new(OllamaProvider::from_config(&config.ollama, timeout)),
        "openai" => Arc::new(OpenAIProvider::new(config.openai.clone(), secrets, timeout)),
        "anthropic" => Arc::new(AnthropicProvider::new(
            config.anthropic.clone(),
            secrets,
            timeout,
        )),
        other => {
            return Err(EngineError::Config(format!(
                "Unknown LLM provider '{}'",
                other
            )))
        }
    };
    tracing::info!(
        "Using {} provider ({})",
        provider.name(),
        if provider.is_local() { "local" } else { "remote" }
    );
    Ok(provider)
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "rust\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Strip a surrounding code fence from generated file content, if any.
pub fn strip_code_fence(content: &str) -> String {
    match extract_fenced_block(content) {
        Some(body) => body.to_string(),
        None => content.trim().to_string(),
    }
}

/// Extract the first balanced JSON object in `s`.
///
/// Scans for the first `{`, then counts `{` / `}` depth, respecting string
/// literals and escapes, to find the matching close brace.
pub fn extract_balanced_json(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let s = &s[start..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"test"}"#);
    }

    #[test]
    fn test_extract_balanced_json_skips_prose() {
        let text = r#"Sure! {"action": {"name": "READ_FILE"}} hope that helps {"x": 1}"#;
        assert_eq!(
            extract_balanced_json(text),
            Some(r#"{"action": {"name": "READ_FILE"}}"#)
        );
    }

    #[test]
    fn test_extract_balanced_json_respects_strings() {
        let text = r#"{"prompt": "use } and { freely \" ok", "n": 1}"#;
        assert_eq!(extract_balanced_json(text), Some(text));
    }

    #[test]
    fn test_extract_balanced_json_unbalanced() {
        assert_eq!(extract_balanced_json(r#"{"action": {"#), None);
        assert_eq!(extract_balanced_json("no json here"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```rust\nfn main() {}\n```\n"), "fn main() {}\n");
        assert_eq!(strip_code_fence("  plain text  "), "plain text");
    }

    #[test]
    fn test_build_provider_by_name() {
        let mut config = crate::config::Config::default_config().llm;
        let secrets = Arc::new(SecretManager::new("waypoint-test"));

        let provider = build_provider(&config, Arc::clone(&secrets)).unwrap();
        assert_eq!(provider.name(), "ollama");

        config.default_provider = "gemini".to_string();
        assert!(matches!(
            build_provider(&config, secrets),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_llm_error_maps_to_engine_error() {
        assert!(matches!(EngineError::from(LLMError::Timeout), EngineError::LLMTimeout));
        assert!(matches!(
            EngineError::from(LLMError::RateLimitExceeded),
            EngineError::LLMProvider(_)
        ));
    }
}
