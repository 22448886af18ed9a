//! Action Registry
//!
//! The closed set of action kinds the engine can execute. Each kind maps to
//! one handler behind the [`ActionHandler`] capability trait and to a
//! [`Classification`] that decides whether the coordinator asks the user
//! before running it.
//!
//! The registry is the single source of truth for what actions exist: the
//! planner describes exactly [`ActionRegistry::kinds`] to the model, and any
//! other name is rejected by [`ActionRegistry::resolve`] as a fatal error.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{Action, ActionKind, HandlerResult};
use std::fmt;
use std::sync::Arc;

use crate::external::ExternalGateway;
use crate::fs_guard::FileSystemGuard;
use crate::llm::LLMProvider;

pub mod external;
pub mod filesystem;
pub mod search;

pub use external::CallToolHandler;
pub use filesystem::{
    CreateFileHandler, DeleteFileHandler, EditFileHandler, MoveFileHandler, ReadFileHandler,
};
pub use search::SearchFilesHandler;

/// How an action interacts with the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Only reads the workspace; runs without confirmation
    ReadOnly,
    /// Changes the workspace; needs confirmation
    Mutating,
    /// Talks to an external client; needs confirmation
    External,
}

impl Classification {
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, Classification::ReadOnly)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::ReadOnly => write!(f, "readonly"),
            Classification::Mutating => write!(f, "mutating"),
            Classification::External => write!(f, "external"),
        }
    }
}

/// Capability shared by every action handler.
///
/// Handlers return a [`HandlerResult`] for expected failures (missing file,
/// bad parameters) and an `Err` for everything else. The coordinator turns
/// recoverable errors into failed results; non-recoverable ones end the
/// episode.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn kind(&self) -> ActionKind;

    fn classification(&self) -> Classification;

    /// One-line description used in the planner request.
    fn description(&self) -> &'static str;

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError>;
}

/// One handler per action kind.
pub struct ActionRegistry {
    read: ReadFileHandler,
    search: SearchFilesHandler,
    create: CreateFileHandler,
    edit: EditFileHandler,
    delete: DeleteFileHandler,
    move_file: MoveFileHandler,
    call_tool: CallToolHandler,
}

impl ActionRegistry {
    /// Build the registry for a workspace.
    ///
    /// `provider` is used by create/edit when the action carries no content;
    /// `gateway` serves external tool calls.
    pub fn new(
        guard: FileSystemGuard,
        provider: Arc<dyn LLMProvider>,
        gateway: Arc<ExternalGateway>,
    ) -> Self {
        Self {
            read: ReadFileHandler::new(guard.clone()),
            search: SearchFilesHandler::new(guard.clone()),
            create: CreateFileHandler::new(guard.clone(), Arc::clone(&provider)),
            edit: EditFileHandler::new(guard.clone(), provider),
            delete: DeleteFileHandler::new(guard.clone()),
            move_file: MoveFileHandler::new(guard),
            call_tool: CallToolHandler::new(gateway),
        }
    }

    /// Every kind this registry can execute.
    pub fn kinds(&self) -> &'static [ActionKind] {
        &ActionKind::ALL
    }

    /// Look up an action kind by its wire name.
    ///
    /// # Errors
    ///
    /// `EngineError::UnknownAction`, which is fatal for the episode.
    pub fn resolve(&self, name: &str) -> Result<ActionKind, EngineError> {
        name.parse()
    }

    pub fn handler(&self, kind: ActionKind) -> &dyn ActionHandler {
        match kind {
            ActionKind::ReadFile => &self.read,
            ActionKind::SearchFiles => &self.search,
            ActionKind::CreateFile => &self.create,
            ActionKind::EditFile => &self.edit,
            ActionKind::DeleteFile => &self.delete,
            ActionKind::MoveFile => &self.move_file,
            ActionKind::CallTool => &self.call_tool,
        }
    }

    pub fn classify(&self, kind: ActionKind) -> Classification {
        self.handler(kind).classification()
    }

    pub async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        self.handler(action.kind).execute(action).await
    }

    /// The action list embedded in planner requests.
    pub fn describe(&self) -> String {
        self.kinds()
            .iter()
            .map(|kind| {
                let handler = self.handler(*kind);
                format!(
                    "- {} ({}): {}",
                    kind,
                    handler.classification(),
                    handler.description()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::llm::{LLMProvider, Message, Result};
    use async_trait::async_trait;

    /// Provider that always answers with the same text.
    pub struct FixedProvider(pub String);

    #[async_trait]
    impl LLMProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, _messages: &[Message]) -> Result<String> {
            Ok(self.0.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FixedProvider;
    use super::*;
    use tempfile::TempDir;

    fn registry(temp: &TempDir) -> ActionRegistry {
        ActionRegistry::new(
            FileSystemGuard::new(temp.path().to_path_buf()).unwrap(),
            Arc::new(FixedProvider(String::new())),
            Arc::new(ExternalGateway::new()),
        )
    }

    #[test]
    fn test_every_kind_has_matching_handler() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        for kind in registry.kinds() {
            assert_eq!(registry.handler(*kind).kind(), *kind);
        }
    }

    #[test]
    fn test_classifications() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);

        assert_eq!(registry.classify(ActionKind::ReadFile), Classification::ReadOnly);
        assert_eq!(registry.classify(ActionKind::SearchFiles), Classification::ReadOnly);
        assert_eq!(registry.classify(ActionKind::CreateFile), Classification::Mutating);
        assert_eq!(registry.classify(ActionKind::EditFile), Classification::Mutating);
        assert_eq!(registry.classify(ActionKind::DeleteFile), Classification::Mutating);
        assert_eq!(registry.classify(ActionKind::MoveFile), Classification::Mutating);
        assert_eq!(registry.classify(ActionKind::CallTool), Classification::External);
    }

    #[test]
    fn test_resolve_unknown_is_fatal() {
        let temp = TempDir::new().unwrap();
        let err = registry(&temp).resolve("EXPLAIN_FILE").unwrap_err();
        assert!(matches!(err, EngineError::UnknownAction(_)));
    }

    #[test]
    fn test_describe_lists_every_kind() {
        let temp = TempDir::new().unwrap();
        let description = registry(&temp).describe();
        for kind in ActionKind::ALL {
            assert!(description.contains(kind.as_str()), "missing {}", kind);
        }
        assert_eq!(description.lines().count(), ActionKind::ALL.len());
    }
}
