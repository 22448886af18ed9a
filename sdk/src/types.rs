//! Action and episode types shared between the planner, the coordinator
//! and the action handlers.
//!
//! Wire names follow the JSON the model is asked to produce
//! (`name`, `filePath`, `prompt`, `code`, `externalToolRequest`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Message carried by the failed result of a declined action.
pub const CANCELLED_MESSAGE: &str = "Action cancelled by user.";

/// Estimate the token cost of a piece of text (~4 chars per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The closed set of action kinds the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    ReadFile,
    SearchFiles,
    CreateFile,
    EditFile,
    DeleteFile,
    MoveFile,
    #[serde(alias = "CALL_MCP")]
    CallTool,
}

impl ActionKind {
    /// Every kind, in the order they are described to the model.
    pub const ALL: [ActionKind; 7] = [
        ActionKind::ReadFile,
        ActionKind::SearchFiles,
        ActionKind::CreateFile,
        ActionKind::EditFile,
        ActionKind::DeleteFile,
        ActionKind::MoveFile,
        ActionKind::CallTool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFile => "READ_FILE",
            Self::SearchFiles => "SEARCH_FILES",
            Self::CreateFile => "CREATE_FILE",
            Self::EditFile => "EDIT_FILE",
            Self::DeleteFile => "DELETE_FILE",
            Self::MoveFile => "MOVE_FILE",
            Self::CallTool => "CALL_TOOL",
        }
    }

    /// The operation type recorded in the episode journal for this kind.
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::ReadFile => OperationType::Read,
            Self::SearchFiles => OperationType::Search,
            Self::CreateFile => OperationType::Create,
            Self::EditFile => OperationType::Edit,
            Self::DeleteFile => OperationType::Delete,
            Self::MoveFile => OperationType::Move,
            Self::CallTool => OperationType::External,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "READ_FILE" => Ok(Self::ReadFile),
            "SEARCH_FILES" => Ok(Self::SearchFiles),
            "CREATE_FILE" => Ok(Self::CreateFile),
            "EDIT_FILE" => Ok(Self::EditFile),
            "DELETE_FILE" => Ok(Self::DeleteFile),
            "MOVE_FILE" => Ok(Self::MoveFile),
            "CALL_TOOL" | "CALL_MCP" => Ok(Self::CallTool),
            other => Err(EngineError::UnknownAction(other.to_string())),
        }
    }
}

/// Coarse operation category stored in an [`OperationRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Read,
    Search,
    Create,
    Edit,
    Delete,
    Move,
    External,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Search => "search",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::External => "external",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal entry describing an attempted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    #[serde(alias = "type")]
    pub kind: OperationType,
    #[serde(alias = "filePath")]
    pub target_path: String,
    pub description: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub token_cost: usize,
}

/// Free-form journal note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub content: String,
    #[serde(default)]
    pub token_cost: usize,
}

impl Note {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let token_cost = estimate_tokens(&content);
        Self {
            content,
            token_cost,
        }
    }
}

/// Outcome of the most recent action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastResult {
    pub success: bool,
    pub message: String,
}

/// Everything the engine remembers about the current episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeContext {
    #[serde(default, alias = "fileOperations")]
    pub operations: Vec<OperationRecord>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default, alias = "lastActionResult", skip_serializing_if = "Option::is_none")]
    pub last_result: Option<LastResult>,
}

impl EpisodeContext {
    /// Append a note, computing its token cost.
    pub fn push_note(&mut self, content: impl Into<String>) {
        self.notes.push(Note::new(content));
    }

    /// Set `last_result` and append the matching note.
    pub fn record_result(&mut self, success: bool, message: impl Into<String>) {
        let message = message.into();
        self.push_note(last_result_note(success, &message));
        self.last_result = Some(LastResult { success, message });
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.notes.is_empty() && self.last_result.is_none()
    }
}

/// Note text derived from a result.
pub fn last_result_note(success: bool, message: &str) -> String {
    format!(
        "Last action result: {} - {}",
        if success { "SUCCESS" } else { "FAILURE" },
        message
    )
}

/// Operation requested from an external tool client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalOperation {
    #[serde(rename = "invoke-tool", alias = "callTool")]
    InvokeTool,
    #[serde(rename = "read-resource", alias = "readResource")]
    ReadResource,
}

impl fmt::Display for ExternalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvokeTool => f.write_str("invoke-tool"),
            Self::ReadResource => f.write_str("read-resource"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalToolParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Request routed through the external tool gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalToolRequest {
    pub client_name: String,
    pub operation: ExternalOperation,
    #[serde(default)]
    pub params: ExternalToolParams,
}

/// An action exactly as the model proposed it.
///
/// `name` stays a string so an unknown kind survives parsing and is
/// rejected by the registry, and `context` stays raw JSON until the
/// coordinator normalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    pub name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tool_request: Option<ExternalToolRequest>,
}

impl ProposedAction {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            prompt: prompt.into(),
            code: None,
            context: serde_json::Value::Null,
            external_tool_request: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(serde_json::Value::String(code.into()));
        self
    }

    pub fn with_external_request(mut self, request: ExternalToolRequest) -> Self {
        self.external_tool_request = Some(request);
        self
    }
}

/// A normalized action, ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "name")]
    pub kind: ActionKind,
    #[serde(rename = "filePath")]
    pub target_path: String,
    #[serde(rename = "prompt")]
    pub instruction: String,
    #[serde(rename = "code", skip_serializing_if = "Option::is_none")]
    pub generated_content: Option<String>,
    #[serde(rename = "externalToolRequest", skip_serializing_if = "Option::is_none")]
    pub external_request: Option<ExternalToolRequest>,
    pub context: EpisodeContext,
}

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResult {
    pub success: bool,
    pub context: EpisodeContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl HandlerResult {
    /// Successful result; records `message` as the context's last result.
    pub fn success(mut context: EpisodeContext, message: impl Into<String>) -> Self {
        let message = message.into();
        context.record_result(true, message.clone());
        Self {
            success: true,
            context,
            message: Some(message),
            tool_name: None,
        }
    }

    /// Failed result; records `message` as the context's last result.
    pub fn failure(mut context: EpisodeContext, message: impl Into<String>) -> Self {
        let message = message.into();
        context.record_result(false, message.clone());
        Self {
            success: false,
            context,
            message: Some(message),
            tool_name: None,
        }
    }

    /// The result of an action the user declined.
    pub fn cancelled(context: EpisodeContext) -> Self {
        Self::failure(context, CANCELLED_MESSAGE)
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }
}
