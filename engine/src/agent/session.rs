//! Episode loop
//!
//! One top-level user request is one episode:
//!
//! 1. Reset the context store
//! 2. Ask the planner for the next action (or batch)
//! 3. Run it through the execution coordinator, which folds results back
//! 4. On failure, ask the confirmer whether to keep going
//! 5. Repeat until the planner reports completion
//!
//! Termination relies on the model eventually answering `null`. The only
//! ceiling is the opt-in `agent.max_planner_calls` setting.

use serde::Serialize;
use sdk::errors::EngineError;
use sdk::types::HandlerResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context_store::ContextStore;
use crate::actions::ActionRegistry;
use crate::config::Config;
use crate::coordinator::confirm::Confirmer;
use crate::coordinator::ExecutionCoordinator;
use crate::external::ExternalGateway;
use crate::fs_guard::FileSystemGuard;
use crate::llm::LLMProvider;
use crate::planner::{Planner, PlannerReply};

pub const COMPLETED_MESSAGE: &str = "All tasks completed";
pub const ACTION_FAILED_MESSAGE: &str = "Action failed";
pub const BATCH_FAILED_MESSAGE: &str = "Some actions failed";
pub const CALL_LIMIT_MESSAGE: &str = "Planner call limit reached";

/// How an episode ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeOutcome {
    pub episode_id: String,
    pub success: bool,
    pub message: String,
    /// Human-facing summary of the episode's context
    pub summary: String,
    /// Planner calls made
    pub steps: usize,
    /// Operation records left in the context store
    pub operations: usize,
}

/// Owns the context store and drives episodes.
pub struct Session {
    planner: Planner,
    coordinator: ExecutionCoordinator,
    store: ContextStore,
    max_planner_calls: Option<usize>,
}

impl Session {
    pub fn new(
        planner: Planner,
        coordinator: ExecutionCoordinator,
        max_planner_calls: Option<usize>,
    ) -> Self {
        Self {
            planner,
            coordinator,
            store: ContextStore::new(),
            max_planner_calls,
        }
    }

    /// Wire a session for the configured workspace.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn LLMProvider>,
        confirmer: Arc<dyn Confirmer>,
        gateway: Arc<ExternalGateway>,
    ) -> Result<Self, EngineError> {
        let guard = FileSystemGuard::new(config.core.workspace.clone())?;
        let registry = Arc::new(ActionRegistry::new(
            guard.clone(),
            Arc::clone(&provider),
            Arc::clone(&gateway),
        ));

        let planner = Planner::new(
            provider,
            Arc::clone(&registry),
            gateway,
            guard.workspace().to_path_buf(),
            config.planner.clone(),
            config.memory.clone(),
        );
        let coordinator = ExecutionCoordinator::new(registry, confirmer, guard);

        Ok(Self::new(planner, coordinator, config.agent.max_planner_calls))
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Run one episode for `request`.
    ///
    /// # Errors
    ///
    /// Fatal conditions only: an unknown action kind or external client, a
    /// model transport failure, or a broken confirmation prompt. Failed
    /// actions end up in the outcome instead.
    pub async fn run_episode(&mut self, request: &str) -> Result<EpisodeOutcome, EngineError> {
        let episode_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        info!("Starting episode {}: {}", episode_id, request);

        self.store.reset();
        self.planner.begin_episode();

        let mut steps = 0;
        let result = self.episode_loop(request, &mut steps).await;

        match result {
            Ok((success, message)) => {
                info!(
                    "Episode {} finished in {:.1}s after {} planner calls: {}",
                    episode_id,
                    start.elapsed().as_secs_f64(),
                    steps,
                    message
                );
                Ok(EpisodeOutcome {
                    episode_id,
                    success,
                    message: message.to_string(),
                    summary: self.store.human_summary(),
                    steps,
                    operations: self.store.operations().len(),
                })
            }
            Err(e) => {
                error!("Episode {} aborted: {}", episode_id, e);
                Err(e)
            }
        }
    }

    async fn episode_loop(
        &mut self,
        request: &str,
        steps: &mut usize,
    ) -> Result<(bool, &'static str), EngineError> {
        loop {
            if let Some(limit) = self.max_planner_calls {
                if *steps >= limit {
                    warn!("Stopping after {} planner calls", limit);
                    return Ok((false, CALL_LIMIT_MESSAGE));
                }
            }
            *steps += 1;

            let reply = self
                .planner
                .choose_next_action(request, &mut self.store)
                .await?;

            let failure = match reply {
                PlannerReply::Done => return Ok((true, COMPLETED_MESSAGE)),
                PlannerReply::Single(action) => {
                    let result = self.coordinator.execute(action, &mut self.store).await?;
                    failure_message(std::slice::from_ref(&result))
                        .map(|detail| (ACTION_FAILED_MESSAGE, detail))
                }
                PlannerReply::Batch(actions) => {
                    let results = self
                        .coordinator
                        .execute_batch(actions, &mut self.store)
                        .await?;
                    failure_message(&results).map(|detail| (BATCH_FAILED_MESSAGE, detail))
                }
            };

            if let Some((outcome, detail)) = failure {
                let keep_going = self
                    .coordinator
                    .confirmer()
                    .continue_after_failure(&detail)
                    .await?;
                if !keep_going {
                    return Ok((false, outcome));
                }
                info!("Continuing after failure: {}", detail);
            }
        }
    }
}

/// Message of the first failed result, if any.
fn failure_message(results: &[HandlerResult]) -> Option<String> {
    results.iter().find(|r| !r.success).map(|r| {
        r.message
            .clone()
            .unwrap_or_else(|| "Action failed without a message".to_string())
    })
}
