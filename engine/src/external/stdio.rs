//! Stdio transport for external tool servers.
//!
//! Spawns the configured command and exchanges newline-delimited JSON-RPC
//! 2.0 messages over its stdin/stdout. The process is started lazily on the
//! first request and restarted after a transport failure.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{ExternalClient, ResourceDescriptor, ToolDescriptor, DEFAULT_REQUEST_TIMEOUT};
use crate::config::ExternalClientConfig;

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

struct Connection {
    // Held so the process is killed when the connection drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// External client backed by a child process.
pub struct StdioClient {
    config: ExternalClientConfig,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl StdioClient {
    pub fn new(config: ExternalClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    async fn spawn(&self) -> Result<Connection, EngineError> {
        tracing::info!(
            "Starting external client {}: {} {}",
            self.config.name,
            self.config.command,
            self.config.args.join(" ")
        );

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::ExternalTool(format!(
                    "Failed to start external client {}: {}",
                    self.config.name, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::ExternalTool("Failed to open client stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::ExternalTool("Failed to open client stdout".to_string()))?;

        let mut connection = Connection {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "waypoint", "version": env!("CARGO_PKG_VERSION") }
        });
        self.exchange(&mut connection, id, "initialize", init_params)
            .await?;
        write_message(
            &mut connection.stdin,
            &JsonRpcRequest {
                jsonrpc: "2.0",
                id: None,
                method: "notifications/initialized",
                params: json!({}),
            },
        )
        .await?;

        Ok(connection)
    }

    /// Send one request and wait for the response with the same id.
    async fn exchange(
        &self,
        connection: &mut Connection,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<Value, EngineError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };
        write_message(&mut connection.stdin, &request).await?;

        let read = async {
            loop {
                let line = connection
                    .stdout
                    .next_line()
                    .await
                    .map_err(EngineError::Io)?
                    .ok_or_else(|| {
                        EngineError::ExternalTool(format!(
                            "External client {} closed its output",
                            self.config.name
                        ))
                    })?;

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Server notifications and unrelated lines are skipped.
                let Ok(response) = serde_json::from_str::<JsonRpcResponse>(line) else {
                    continue;
                };
                if response.id.as_ref().and_then(Value::as_u64) != Some(id) {
                    continue;
                }
                return response_result(response);
            }
        };

        tokio::time::timeout(self.timeout, read).await.map_err(|_| {
            EngineError::ExternalTool(format!(
                "External client {} did not answer {} within {}s",
                self.config.name,
                method,
                self.timeout.as_secs()
            ))
        })?
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, EngineError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn().await?);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let outcome = match guard.as_mut() {
            Some(connection) => self.exchange(connection, id, method, params).await,
            None => Err(EngineError::ExternalTool("connection unavailable".to_string())),
        };

        // A protocol-level error keeps the process; a transport failure drops it.
        if let Err(e) = &outcome {
            if !is_rpc_error(e) {
                *guard = None;
            }
        }
        outcome
    }
}

#[async_trait]
impl ExternalClient for StdioClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, EngineError> {
        let result = self.request("tools/list", json!({})).await?;
        parse_list(result, "tools")
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, EngineError> {
        let result = self.request("resources/list", json!({})).await?;
        parse_list(result, "resources")
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, EngineError> {
        self.request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, EngineError> {
        self.request("resources/read", json!({ "uri": uri })).await
    }
}

async fn write_message(stdin: &mut ChildStdin, request: &JsonRpcRequest<'_>) -> Result<(), EngineError> {
    let mut line = serde_json::to_string(request)
        .map_err(|e| EngineError::ExternalTool(format!("Failed to encode request: {}", e)))?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

const RPC_ERROR_PREFIX: &str = "JSON-RPC error";

fn response_result(response: JsonRpcResponse) -> Result<Value, EngineError> {
    if let Some(error) = response.error {
        return Err(EngineError::ExternalTool(format!(
            "{} {}: {}",
            RPC_ERROR_PREFIX, error.code, error.message
        )));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

fn is_rpc_error(error: &EngineError) -> bool {
    matches!(error, EngineError::ExternalTool(msg) if msg.starts_with(RPC_ERROR_PREFIX))
}

fn parse_list<T: serde::de::DeserializeOwned>(result: Value, key: &str) -> Result<Vec<T>, EngineError> {
    match result.get(key) {
        Some(items) => serde_json::from_value(items.clone())
            .map_err(|e| EngineError::ExternalTool(format!("Malformed {} list: {}", key, e))),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(3),
            method: "tools/call",
            params: json!({ "name": "add" }),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": { "name": "add" } })
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method: "notifications/initialized",
            params: json!({}),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert!(encoded.get("id").is_none());
    }

    #[test]
    fn test_error_response_is_rpc_error() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "Method not found" }
        }))
        .unwrap();
        let err = response_result(response).unwrap_err();
        assert!(is_rpc_error(&err));
        assert!(err.to_string().contains("Method not found"));
    }

    #[test]
    fn test_parse_tool_list() {
        let tools: Vec<ToolDescriptor> = parse_list(
            json!({ "tools": [{ "name": "add", "description": "Add numbers", "inputSchema": { "type": "object" } }] }),
            "tools",
        )
        .unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");
        assert!(tools[0].input_schema.is_some());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_recoverable() {
        let client = StdioClient::new(ExternalClientConfig {
            name: "missing".to_string(),
            command: "/nonexistent/waypoint-external-client".to_string(),
            args: vec![],
            env: Default::default(),
        });
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, EngineError::ExternalTool(_)));
    }
}
