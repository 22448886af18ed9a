//! External tool gateway
//!
//! A named-client dispatch table for capability providers that live outside
//! the workspace (tool invocation or resource read). Each client speaks the
//! external tool protocol; [`stdio::StdioClient`] is the process-backed one.
//!
//! Looking up a client that is not registered is a fatal error for the
//! episode. Everything else that goes wrong during a call is recoverable.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{ExternalOperation, ExternalToolRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExternalClientConfig;

pub mod stdio;

pub use stdio::StdioClient;

/// Per-request timeout for external clients
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A tool advertised by an external client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// A resource advertised by an external client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything one client offers, as shown to the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientCatalog {
    pub client: String,
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
}

/// A named external capability provider.
#[async_trait]
pub trait ExternalClient: Send + Sync {
    /// The name the model uses as `clientName`.
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, EngineError>;

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, EngineError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, EngineError>;

    async fn read_resource(&self, uri: &str) -> Result<Value, EngineError>;
}

/// Dispatch table from client name to client.
#[derive(Clone, Default)]
pub struct ExternalGateway {
    clients: BTreeMap<String, Arc<dyn ExternalClient>>,
}

impl ExternalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gateway with one stdio client per configured server.
    ///
    /// Processes are not spawned until a client is first used.
    pub fn from_config(clients: &[ExternalClientConfig]) -> Self {
        let mut gateway = Self::new();
        for config in clients {
            gateway.register(Arc::new(StdioClient::new(config.clone())));
        }
        gateway
    }

    pub fn register(&mut self, client: Arc<dyn ExternalClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    /// Route a request to its client.
    ///
    /// # Errors
    ///
    /// `EngineError::UnknownExternalClient` (fatal) when no client has that
    /// name; `EngineError::ExternalTool` when the request is missing the
    /// parameter its operation needs or the client call fails.
    pub async fn call(&self, request: &ExternalToolRequest) -> Result<Value, EngineError> {
        let client = self
            .clients
            .get(&request.client_name)
            .ok_or_else(|| EngineError::UnknownExternalClient(request.client_name.clone()))?;

        tracing::info!(
            "External call: client={} operation={}",
            request.client_name,
            request.operation
        );

        match request.operation {
            ExternalOperation::InvokeTool => {
                let name = request.params.name.as_deref().ok_or_else(|| {
                    EngineError::ExternalTool("invoke-tool requires params.name".to_string())
                })?;
                let arguments = request
                    .params
                    .arguments
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                client.call_tool(name, arguments).await
            }
            ExternalOperation::ReadResource => {
                let uri = request.params.uri.as_deref().ok_or_else(|| {
                    EngineError::ExternalTool("read-resource requires params.uri".to_string())
                })?;
                client.read_resource(uri).await
            }
        }
    }

    /// Query every client for its tools and resources.
    ///
    /// A client that fails to answer is listed with whatever it did return.
    pub async fn catalog(&self) -> Vec<ClientCatalog> {
        let mut catalog = Vec::with_capacity(self.clients.len());
        for (name, client) in &self.clients {
            let tools = client.list_tools().await.unwrap_or_else(|e| {
                tracing::warn!("Failed to list tools for external client {}: {}", name, e);
                Vec::new()
            });
            let resources = client.list_resources().await.unwrap_or_else(|e| {
                tracing::debug!("No resources for external client {}: {}", name, e);
                Vec::new()
            });
            catalog.push(ClientCatalog {
                client: name.clone(),
                tools,
                resources,
            });
        }
        catalog
    }
}

/// Flatten a tool result into text.
///
/// Results shaped like `{content: [{type: "text", text}]}` (or resource
/// reads with `contents`) become their joined text; anything else is
/// rendered as JSON.
pub fn result_text(result: &Value) -> String {
    for key in ["content", "contents"] {
        if let Some(items) = result.get(key).and_then(Value::as_array) {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            if !texts.is_empty() {
                return texts.join("\n");
            }
        }
    }
    serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
}
