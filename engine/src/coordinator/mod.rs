//! Execution Coordinator
//!
//! Takes actions proposed by the planner through
//! `PROPOSED -> LOGGED -> {AUTO_EXECUTE | AWAIT_CONFIRMATION} -> EXECUTED -> FOLDED`.
//!
//! The intended operation is written to the [`ContextStore`] before any
//! confirmation so the journal reflects attempted work, not only completed
//! work. Read-only actions run straight away; mutating and external actions
//! go through the [`Confirmer`]. Recoverable handler errors become failed
//! results, while unknown action kinds and unknown external clients abort
//! the episode.

pub mod confirm;
pub mod diff;

use sdk::errors::{EngineError, WaypointErrorExt};
use sdk::types::{Action, ActionKind, EpisodeContext, HandlerResult, Note, ProposedAction};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actions::{ActionRegistry, Classification};
use crate::agent::context_store::ContextStore;
use crate::fs_guard::FileSystemGuard;
use confirm::{Confirmer, Decision, Proposal};

/// Instruction text kept in an operation description
const DESCRIPTION_PROMPT_CHARS: usize = 100;

pub struct ExecutionCoordinator {
    registry: Arc<ActionRegistry>,
    confirmer: Arc<dyn Confirmer>,
    guard: FileSystemGuard,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<ActionRegistry>,
        confirmer: Arc<dyn Confirmer>,
        guard: FileSystemGuard,
    ) -> Self {
        Self {
            registry,
            confirmer,
            guard,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn confirmer(&self) -> &Arc<dyn Confirmer> {
        &self.confirmer
    }

    /// Turn a proposed action into an executable one.
    ///
    /// # Errors
    ///
    /// `EngineError::UnknownAction` when the name is not a registered kind.
    pub fn normalize(&self, proposed: ProposedAction) -> Result<Action, EngineError> {
        let kind = self.registry.resolve(&proposed.name)?;
        Ok(Action {
            kind,
            target_path: proposed.file_path,
            instruction: proposed.prompt,
            generated_content: proposed.code.and_then(code_text),
            external_request: proposed.external_tool_request,
            context: normalize_context(proposed.context),
        })
    }

    /// Run one proposed action and fold its result into `store`.
    ///
    /// Only fatal errors are returned as `Err`; every other failure is a
    /// `HandlerResult` with `success == false`.
    pub async fn execute(
        &self,
        proposed: ProposedAction,
        store: &mut ContextStore,
    ) -> Result<HandlerResult, EngineError> {
        let mut action = self.normalize(proposed)?;

        store.add_operation(
            action.kind.operation_type(),
            &action.target_path,
            &operation_description(&action),
        );

        let classification = self.registry.classify(action.kind);
        let result = if classification.requires_confirmation() {
            self.execute_gated(&mut action, classification).await?
        } else {
            debug!("Auto-executing {} on {}", action.kind, action.target_path);
            self.run_handler(&action).await?
        };

        if result.success {
            info!("{} on {} succeeded", action.kind, action.target_path);
        } else {
            warn!(
                "{} on {} failed: {}",
                action.kind,
                action.target_path,
                result.message.as_deref().unwrap_or("no message")
            );
        }

        store.merge_from(result.context.clone());
        Ok(result)
    }

    /// Run a batch in order, stopping after the first failed action.
    ///
    /// The returned results cover only the actions that were executed.
    pub async fn execute_batch(
        &self,
        batch: Vec<ProposedAction>,
        store: &mut ContextStore,
    ) -> Result<Vec<HandlerResult>, EngineError> {
        let total = batch.len();
        let mut results = Vec::with_capacity(total);

        for (index, proposed) in batch.into_iter().enumerate() {
            let result = self.execute(proposed, store).await?;
            let failed = !result.success;
            results.push(result);

            if failed {
                let skipped = total - index - 1;
                if skipped > 0 {
                    warn!(
                        "Batch item {} of {} failed; skipping {} remaining action(s)",
                        index + 1,
                        total,
                        skipped
                    );
                }
                break;
            }
        }

        Ok(results)
    }

    async fn execute_gated(
        &self,
        action: &mut Action,
        classification: Classification,
    ) -> Result<HandlerResult, EngineError> {
        loop {
            let proposal = self.proposal(action, classification).await;
            match self.confirmer.confirm(&proposal).await? {
                Decision::Proceed => return self.run_handler(action).await,
                Decision::Decline => {
                    warn!("{} on {} declined", action.kind, action.target_path);
                    return Ok(HandlerResult::cancelled(action.context.clone()));
                }
                Decision::Modify(instruction) => {
                    debug!("Instruction for {} modified", action.kind);
                    action.instruction = instruction;
                }
            }
        }
    }

    /// Invoke the handler, converting recoverable errors into a failed result.
    async fn run_handler(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        match self.registry.execute(action).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_recoverable() => {
                Ok(HandlerResult::failure(action.context.clone(), e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn proposal(&self, action: &Action, classification: Classification) -> Proposal {
        let diff = match (action.kind, action.generated_content.as_deref()) {
            (ActionKind::CreateFile, Some(content)) => Some(diff::create_diff(content)),
            (ActionKind::EditFile, Some(content)) => {
                let resolved = self.guard.resolve(&action.target_path);
                Some(match self.guard.validate_path(&resolved) {
                    Ok(path) => diff::edit_preview(&path, &action.target_path, content).await,
                    Err(_) => format!("File {} does not exist for editing", action.target_path),
                })
            }
            _ => None,
        };

        let external = action.external_request.as_ref().map(|request| {
            let target = request
                .params
                .name
                .as_deref()
                .or(request.params.uri.as_deref())
                .unwrap_or("");
            format!("{} {} {}", request.client_name, request.operation, target)
                .trim_end()
                .to_string()
        });

        Proposal {
            kind: action.kind,
            classification,
            target_path: action.target_path.clone(),
            instruction: action.instruction.clone(),
            diff,
            external,
        }
    }
}

/// `"{NAME}: {instruction}"` with the instruction cut at 100 characters.
fn operation_description(action: &Action) -> String {
    let mut prompt: String = action
        .instruction
        .chars()
        .take(DESCRIPTION_PROMPT_CHARS)
        .collect();
    if action.instruction.chars().count() > DESCRIPTION_PROMPT_CHARS {
        prompt.push_str("...");
    }
    format!("{}: {}", action.kind, prompt)
}

fn code_text(code: Value) -> Option<String> {
    match code {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Coerce whatever the model put in `context` into an [`EpisodeContext`].
///
/// A missing value becomes an empty context and a bare string becomes a
/// single note. Notes given as plain strings are accepted.
fn normalize_context(raw: Value) -> EpisodeContext {
    match raw {
        Value::Null => EpisodeContext::default(),
        Value::String(text) => {
            let mut context = EpisodeContext::default();
            context.push_note(text);
            context
        }
        Value::Object(mut map) => {
            if let Some(Value::Array(notes)) = map.get_mut("notes") {
                for note in notes.iter_mut() {
                    if let Value::String(text) = note {
                        let converted =
                            serde_json::to_value(Note::new(text.as_str())).unwrap_or(Value::Null);
                        *note = converted;
                    }
                }
            }
            let object = Value::Object(map);
            serde_json::from_value(object.clone()).unwrap_or_else(|e| {
                debug!("Unusable action context ({}); keeping it as a note", e);
                let mut context = EpisodeContext::default();
                context.push_note(object.to_string());
                context
            })
        }
        other => {
            let mut context = EpisodeContext::default();
            context.push_note(other.to_string());
            context
        }
    }
}
