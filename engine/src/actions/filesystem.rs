//! File system action handlers: read, create, edit, delete, move.
//!
//! Every path goes through [`FileSystemGuard`] before it is touched. Paths
//! in notes and messages are written the way the model wrote them.

use async_trait::async_trait;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::{Action, ActionKind, HandlerResult};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use super::{ActionHandler, Classification};
use crate::fs_guard::FileSystemGuard;
use crate::llm::{strip_code_fence, LLMProvider, Message};

/// Maximum characters of a preview line kept in notes
const PREVIEW_CHARS: usize = 120;

static MOVE_DESTINATION: OnceLock<Option<Regex>> = OnceLock::new();

/// Find the destination in an instruction like `move it to src/lib.rs`.
pub fn destination_from_instruction(instruction: &str) -> Option<String> {
    let pattern = MOVE_DESTINATION
        .get_or_init(|| Regex::new(r#"(?i)\bto\s+["']?([^"'\s]+)["']?"#).ok())
        .as_ref()?;
    pattern
        .captures(instruction)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
        .filter(|dest| !dest.is_empty())
}

/// First non-empty line of `content`, shortened for notes.
pub fn first_line_preview(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    if line.chars().count() > PREVIEW_CHARS {
        let short: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", short)
    } else {
        line.to_string()
    }
}

/// Ask the model for full file content when an action carries none.
async fn generate_content(
    provider: &dyn LLMProvider,
    path: &str,
    instruction: &str,
    original: Option<&str>,
) -> Result<String, EngineError> {
    let mut request = format!("File: {}\nInstruction: {}\n", path, instruction);
    if let Some(original) = original {
        request.push_str(&format!("\nCurrent content:\n```\n{}\n```\n", original));
    }

    let messages = vec![
        Message::system(
            "You write source files. Reply with the complete file content only, \
             without explanations. A single fenced code block is allowed.",
        ),
        Message::user(request),
    ];

    tracing::debug!("Generating content for {} with {}", path, provider.name());
    let reply = provider.generate(&messages).await?;
    Ok(strip_code_fence(&reply))
}

pub struct ReadFileHandler {
    guard: FileSystemGuard,
}

impl ReadFileHandler {
    pub fn new(guard: FileSystemGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ActionHandler for ReadFileHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadFile
    }

    fn classification(&self) -> Classification {
        Classification::ReadOnly
    }

    fn description(&self) -> &'static str {
        "Read a file. filePath is the file to read."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let mut context = action.context.clone();
        let path = self.guard.resolve(&action.target_path);

        if !path.is_file() {
            let message = format!("File {} does not exist.", action.target_path);
            return Ok(HandlerResult::failure(context, message));
        }

        let path = self.guard.validate_path(&path)?;
        let content = tokio::fs::read_to_string(&path).await?;

        context.push_note(format!(
            "Read file {} ({} bytes)",
            action.target_path,
            content.len()
        ));
        context.push_note(format!("Content of {}:\n{}", action.target_path, content));

        Ok(HandlerResult::success(
            context,
            format!("Successfully read {}", action.target_path),
        ))
    }
}

pub struct CreateFileHandler {
    guard: FileSystemGuard,
    provider: Arc<dyn LLMProvider>,
}

impl CreateFileHandler {
    pub fn new(guard: FileSystemGuard, provider: Arc<dyn LLMProvider>) -> Self {
        Self { guard, provider }
    }
}

#[async_trait]
impl ActionHandler for CreateFileHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateFile
    }

    fn classification(&self) -> Classification {
        Classification::Mutating
    }

    fn description(&self) -> &'static str {
        "Create a new file. filePath is the new file, code is its full content."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let mut context = action.context.clone();
        let path = self
            .guard
            .validate_new_path(&self.guard.resolve(&action.target_path))?;

        let content = match &action.generated_content {
            Some(content) => content.clone(),
            None => {
                generate_content(
                    self.provider.as_ref(),
                    &action.target_path,
                    &action.instruction,
                    None,
                )
                .await?
            }
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;

        context.push_note(format!(
            "Created file {} ({} bytes). First line: {}",
            action.target_path,
            content.len(),
            first_line_preview(&content)
        ));

        Ok(HandlerResult::success(
            context,
            format!("Successfully created {}", action.target_path),
        ))
    }
}

pub struct EditFileHandler {
    guard: FileSystemGuard,
    provider: Arc<dyn LLMProvider>,
}

impl EditFileHandler {
    pub fn new(guard: FileSystemGuard, provider: Arc<dyn LLMProvider>) -> Self {
        Self { guard, provider }
    }
}

#[async_trait]
impl ActionHandler for EditFileHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::EditFile
    }

    fn classification(&self) -> Classification {
        Classification::Mutating
    }

    fn description(&self) -> &'static str {
        "Replace the content of an existing file. filePath is the file, code is the complete new content."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let mut context = action.context.clone();
        let path = self.guard.resolve(&action.target_path);

        if !path.is_file() {
            let message = format!("File {} does not exist for editing", action.target_path);
            return Ok(HandlerResult::failure(context, message));
        }

        let path = self.guard.validate_path(&path)?;
        let original = tokio::fs::read_to_string(&path).await?;

        let content = match &action.generated_content {
            Some(content) => content.clone(),
            None => {
                generate_content(
                    self.provider.as_ref(),
                    &action.target_path,
                    &action.instruction,
                    Some(&original),
                )
                .await?
            }
        };

        tokio::fs::write(&path, &content).await?;

        context.push_note(format!(
            "Edited file {} ({} -> {} bytes)",
            action.target_path,
            original.len(),
            content.len()
        ));

        Ok(HandlerResult::success(
            context,
            format!("Successfully edited {}", action.target_path),
        ))
    }
}

pub struct DeleteFileHandler {
    guard: FileSystemGuard,
}

impl DeleteFileHandler {
    pub fn new(guard: FileSystemGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ActionHandler for DeleteFileHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::DeleteFile
    }

    fn classification(&self) -> Classification {
        Classification::Mutating
    }

    fn description(&self) -> &'static str {
        "Delete a file. filePath is the file to delete."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let mut context = action.context.clone();
        let path = self.guard.resolve(&action.target_path);

        if !path.is_file() {
            let message = format!("File {} does not exist.", action.target_path);
            return Ok(HandlerResult::failure(context, message));
        }

        let path = self.guard.validate_path(&path)?;
        // Binary files have no preview.
        let preview = tokio::fs::read_to_string(&path)
            .await
            .map(|content| first_line_preview(&content))
            .unwrap_or_default();

        tokio::fs::remove_file(&path).await?;

        context.push_note(format!(
            "Deleted file {}. First line was: {}",
            action.target_path, preview
        ));

        Ok(HandlerResult::success(
            context,
            format!("Successfully deleted {}", action.target_path),
        ))
    }
}

pub struct MoveFileHandler {
    guard: FileSystemGuard,
}

impl MoveFileHandler {
    pub fn new(guard: FileSystemGuard) -> Self {
        Self { guard }
    }

    fn destination(action: &Action) -> Option<String> {
        action
            .generated_content
            .as_deref()
            .map(str::trim)
            .filter(|dest| !dest.is_empty())
            .map(String::from)
            .or_else(|| destination_from_instruction(&action.instruction))
    }
}

#[async_trait]
impl ActionHandler for MoveFileHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::MoveFile
    }

    fn classification(&self) -> Classification {
        Classification::Mutating
    }

    fn description(&self) -> &'static str {
        "Move or rename a file. filePath is the source; put the destination in code or write 'to <destination>' in the prompt."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let context = action.context.clone();

        let Some(destination) = Self::destination(action) else {
            let message = format!(
                "Could not determine destination for {}. Specify 'to <destination>' in the prompt.",
                action.target_path
            );
            return Ok(HandlerResult::failure(context, message));
        };

        let source = self.guard.resolve(&action.target_path);
        if !source.is_file() {
            let message = format!("Source file {} does not exist.", action.target_path);
            return Ok(HandlerResult::failure(context, message));
        }

        let source = self.guard.validate_path(&source)?;
        let target = self
            .guard
            .validate_new_path(&self.guard.resolve(&destination))?;

        if target.exists() {
            let message = format!("Destination {} already exists.", destination);
            return Ok(HandlerResult::failure(context, message));
        }

        move_file(&source, &target).await?;

        let mut context = context;
        context.push_note(format!("Moved {} to {}", action.target_path, destination));

        Ok(HandlerResult::success(
            context,
            format!(
                "Successfully moved file from {} to {}",
                action.target_path, destination
            ),
        ))
    }
}

async fn move_file(source: &Path, target: &Path) -> Result<(), EngineError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(source, target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::FixedProvider;
    use sdk::types::EpisodeContext;
    use std::fs;
    use tempfile::TempDir;

    fn action(kind: ActionKind, path: &str, prompt: &str, code: Option<&str>) -> Action {
        Action {
            kind,
            target_path: path.to_string(),
            instruction: prompt.to_string(),
            generated_content: code.map(String::from),
            external_request: None,
            context: EpisodeContext::default(),
        }
    }

    fn guard(temp: &TempDir) -> FileSystemGuard {
        FileSystemGuard::new(temp.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_read_existing_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("package.json"), "{\"name\": \"demo\"}").unwrap();

        let handler = ReadFileHandler::new(guard(&temp));
        let result = handler
            .execute(&action(ActionKind::ReadFile, "package.json", "read it", None))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("Successfully read package.json"));
        assert!(result
            .context
            .notes
            .iter()
            .any(|n| n.content.contains("\"name\": \"demo\"")));
        assert!(result.context.operations.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file_fails_softly() {
        let temp = TempDir::new().unwrap();
        let handler = ReadFileHandler::new(guard(&temp));
        let result = handler
            .execute(&action(ActionKind::ReadFile, "nope.txt", "", None))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("File nope.txt does not exist."));
    }

    #[tokio::test]
    async fn test_read_outside_workspace_is_error() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        fs::create_dir(&workspace).unwrap();
        fs::write(temp.path().join("secret.txt"), "s").unwrap();

        let handler = ReadFileHandler::new(FileSystemGuard::new(workspace).unwrap());
        let err = handler
            .execute(&action(ActionKind::ReadFile, "../secret.txt", "", None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PathOutsideWorkspace(_)));
    }

    #[tokio::test]
    async fn test_create_with_content() {
        let temp = TempDir::new().unwrap();
        let handler = CreateFileHandler::new(guard(&temp), Arc::new(FixedProvider(String::new())));
        let result = handler
            .execute(&action(
                ActionKind::CreateFile,
                "src/hello.rs",
                "create hello",
                Some("fn hello() {}\n"),
            ))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            fs::read_to_string(temp.path().join("src/hello.rs")).unwrap(),
            "fn hello() {}\n"
        );
    }

    #[tokio::test]
    async fn test_create_generates_missing_content() {
        let temp = TempDir::new().unwrap();
        let provider = FixedProvider("```rust\nfn generated() {}\n```".to_string());
        let handler = CreateFileHandler::new(guard(&temp), Arc::new(provider));
        let result = handler
            .execute(&action(ActionKind::CreateFile, "gen.rs", "write a function", None))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            fs::read_to_string(temp.path().join("gen.rs")).unwrap(),
            "fn generated() {}\n"
        );
    }

    #[tokio::test]
    async fn test_edit_missing_file() {
        let temp = TempDir::new().unwrap();
        let handler = EditFileHandler::new(guard(&temp), Arc::new(FixedProvider(String::new())));
        let result = handler
            .execute(&action(ActionKind::EditFile, "gone.rs", "", Some("x")))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.message.as_deref(),
            Some("File gone.rs does not exist for editing")
        );
    }

    #[tokio::test]
    async fn test_edit_replaces_content() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "old").unwrap();
        let handler = EditFileHandler::new(guard(&temp), Arc::new(FixedProvider(String::new())));
        let result = handler
            .execute(&action(ActionKind::EditFile, "a.txt", "update", Some("new")))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_delete_records_preview() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("old.md"), "# Title\nbody").unwrap();
        let handler = DeleteFileHandler::new(guard(&temp));
        let result = handler
            .execute(&action(ActionKind::DeleteFile, "old.md", "remove", None))
            .await
            .unwrap();

        assert!(result.success);
        assert!(!temp.path().join("old.md").exists());
        assert!(result
            .context
            .notes
            .iter()
            .any(|n| n.content == "Deleted file old.md. First line was: # Title"));
    }

    #[tokio::test]
    async fn test_move_using_instruction() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let handler = MoveFileHandler::new(guard(&temp));
        let result = handler
            .execute(&action(
                ActionKind::MoveFile,
                "a.txt",
                "move a.txt to 'archive/a.txt'",
                None,
            ))
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.message);
        assert!(!temp.path().join("a.txt").exists());
        assert!(temp.path().join("archive/a.txt").exists());
    }

    #[tokio::test]
    async fn test_move_without_destination_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let handler = MoveFileHandler::new(guard(&temp));
        let result = handler
            .execute(&action(ActionKind::MoveFile, "a.txt", "rename it", None))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(temp.path().join("a.txt").exists());
    }

    #[test]
    fn test_destination_from_instruction() {
        assert_eq!(
            destination_from_instruction("Move the file to src/utils.ts"),
            Some("src/utils.ts".to_string())
        );
        assert_eq!(
            destination_from_instruction("rename to \"docs/guide.md\"."),
            Some("docs/guide.md".to_string())
        );
        assert_eq!(destination_from_instruction("tidy up"), None);
    }

    #[test]
    fn test_first_line_preview() {
        assert_eq!(first_line_preview("\n\n  hello  \nworld"), "hello");
        assert_eq!(first_line_preview(""), "");
        let long = "x".repeat(200);
        assert_eq!(first_line_preview(&long).len(), PREVIEW_CHARS + 3);
    }
}
