//! Integration tests for the Ollama provider
//!
//! A wiremock server stands in for Ollama, so no local model is needed.

use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sdk::errors::EngineError;
use waypoint_engine::agent::Session;
use waypoint_engine::config::Config;
use waypoint_engine::coordinator::confirm::AutoConfirmer;
use waypoint_engine::external::ExternalGateway;
use waypoint_engine::llm::{ollama::OllamaProvider, LLMError, LLMProvider, Message};

const TIMEOUT: Duration = Duration::from_secs(5);

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.1:8b",
        "message": { "role": "assistant", "content": content },
        "done": true
    }))
}

#[tokio::test]
async fn test_generate_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "llama3.1:8b", "stream": false })))
        .respond_with(chat_reply("hello there"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b", TIMEOUT);
    let content = provider.generate(&[Message::user("hi")]).await.unwrap();

    assert_eq!(content, "hello there");
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b", TIMEOUT);
    let err = provider.generate(&[Message::user("hi")]).await.unwrap_err();

    match err {
        LLMError::ProviderUnavailable(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("model not loaded"));
        }
        other => panic!("Expected ProviderUnavailable, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_garbled_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b", TIMEOUT);
    let err = provider.generate(&[Message::user("hi")]).await.unwrap_err();

    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;

    let healthy = OllamaProvider::new(server.uri(), "llama3.1:8b", TIMEOUT);
    assert!(healthy.check_health().await);

    let unreachable = OllamaProvider::new("http://127.0.0.1:9", "llama3.1:8b", TIMEOUT);
    assert!(!unreachable.check_health().await);
}

#[tokio::test]
async fn test_episode_against_mock_server() {
    let server = MockServer::start().await;
    // Requests after the first READ carry the file content.
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(wiremock::matchers::body_string_contains("Content of package.json"))
        .respond_with(chat_reply(r#"{"action": null}"#))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply(
            "Sure! ```json\n{\"action\": {\"name\": \"READ_FILE\", \"filePath\": \"package.json\", \"prompt\": \"look\"}}\n```",
        ))
        .with_priority(2)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("package.json"), r#"{"name": "demo"}"#).unwrap();

    let mut config = Config::default_config();
    config.set_workspace(temp.path()).unwrap();
    let provider = Arc::new(OllamaProvider::new(server.uri(), "llama3.1:8b", TIMEOUT));
    let mut session = Session::from_config(
        &config,
        provider,
        Arc::new(AutoConfirmer),
        Arc::new(ExternalGateway::new()),
    )
    .unwrap();

    let outcome = session.run_episode("what is this project called").await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.operations, 1);
}

#[tokio::test]
async fn test_provider_failure_aborts_episode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = Config::default_config();
    config.set_workspace(temp.path()).unwrap();
    let provider = Arc::new(OllamaProvider::new(server.uri(), "llama3.1:8b", TIMEOUT));
    let mut session = Session::from_config(
        &config,
        provider,
        Arc::new(AutoConfirmer),
        Arc::new(ExternalGateway::new()),
    )
    .unwrap();

    let err = session.run_episode("anything").await.unwrap_err();
    assert!(matches!(err, EngineError::LLMProvider(_)));
}
