//! CALL_TOOL: route a request through the external tool gateway.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{Action, ActionKind, ExternalOperation, HandlerResult};
use serde_json::Value;
use std::sync::Arc;

use super::{ActionHandler, Classification};
use crate::external::{result_text, ExternalGateway};

pub struct CallToolHandler {
    gateway: Arc<ExternalGateway>,
}

impl CallToolHandler {
    pub fn new(gateway: Arc<ExternalGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ActionHandler for CallToolHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::CallTool
    }

    fn classification(&self) -> Classification {
        Classification::External
    }

    fn description(&self) -> &'static str {
        "Call an external tool client. Fill externalToolRequest with clientName, operation (invoke-tool or read-resource) and params {name, arguments} or {uri}."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let mut context = action.context.clone();

        let Some(request) = &action.external_request else {
            return Ok(HandlerResult::failure(
                context,
                "CALL_TOOL requires an externalToolRequest",
            ));
        };

        // Unknown clients propagate as fatal errors.
        let response = self.gateway.call(request).await?;

        let tool_name = match request.operation {
            ExternalOperation::InvokeTool => request.params.name.clone().unwrap_or_default(),
            ExternalOperation::ReadResource => request.params.uri.clone().unwrap_or_default(),
        };

        context.push_note(format!(
            "Called external client {}. Response: {}",
            request.client_name, response
        ));

        // Tool-level failures arrive as a normal response flagged `isError`.
        if response.get("isError").and_then(Value::as_bool) == Some(true) {
            let message = format!(
                "{} on {} failed: {}",
                tool_name,
                request.client_name,
                result_text(&response)
            );
            return Ok(HandlerResult::failure(context, message).with_tool_name(tool_name));
        }

        let message = format!(
            "{} on {} returned: {}",
            tool_name,
            request.client_name,
            result_text(&response)
        );
        Ok(HandlerResult::success(context, message).with_tool_name(tool_name))
    }
}
