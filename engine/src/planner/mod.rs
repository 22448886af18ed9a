//! Planner
//!
//! Builds one request per call (codebase manifest, registered actions,
//! external tool catalog, the user's request and the episode history), asks
//! the model for the next step and parses the reply.
//!
//! A reply that cannot be parsed never ends the episode: the planner answers
//! with a fixed read of the fallback file instead so the loop can recover.

pub mod parse;
pub mod prompt;

use sdk::errors::EngineError;
use sdk::types::{ActionKind, ProposedAction};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actions::ActionRegistry;
use crate::agent::context_store::ContextStore;
use crate::codebase::Codebase;
use crate::config::{MemoryConfig, PlannerConfig};
use crate::external::{ClientCatalog, ExternalGateway};
use crate::llm::{LLMProvider, Message};
use crate::secrets::scrub_secrets;
pub use parse::{parse, ParseError, PlannerReply};
use prompt::PlannerRequest;

const FALLBACK_PROMPT: &str =
    "Reading README.md file to understand codebase structure due to error in previous action generation";

pub struct Planner {
    provider: Arc<dyn LLMProvider>,
    registry: Arc<ActionRegistry>,
    gateway: Arc<ExternalGateway>,
    workspace: PathBuf,
    config: PlannerConfig,
    memory: MemoryConfig,
    /// External catalog, fetched once per episode
    catalog: Option<Vec<ClientCatalog>>,
}

impl Planner {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        registry: Arc<ActionRegistry>,
        gateway: Arc<ExternalGateway>,
        workspace: PathBuf,
        config: PlannerConfig,
        memory: MemoryConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            gateway,
            workspace,
            config,
            memory,
            catalog: None,
        }
    }

    /// Forget per-episode state. The external catalog is queried again on
    /// the next request.
    pub fn begin_episode(&mut self) {
        self.catalog = None;
    }

    /// The action used whenever a reply cannot be parsed.
    pub fn fallback_action(&self) -> ProposedAction {
        let prompt = if self.config.fallback_path == "README.md" {
            FALLBACK_PROMPT.to_string()
        } else {
            format!(
                "Reading {} file to understand codebase structure due to error in previous action generation",
                self.config.fallback_path
            )
        };
        ProposedAction::new(
            ActionKind::ReadFile.as_str(),
            self.config.fallback_path.clone(),
            prompt,
        )
    }

    /// Ask the model for the next step of the episode.
    ///
    /// Trims `store` to the token budget as a side effect.
    ///
    /// # Errors
    ///
    /// Only model transport failures. Unparseable replies yield the fallback
    /// action.
    pub async fn choose_next_action(
        &mut self,
        user_request: &str,
        store: &mut ContextStore,
    ) -> Result<PlannerReply, EngineError> {
        let request = self.build_request(user_request, store).await;
        debug!("Planner request is {} chars", request.len());

        let reply = self
            .provider
            .generate(&[Message::user(request)])
            .await
            .map_err(EngineError::from)?;

        Ok(self.interpret(&reply))
    }

    /// Map a raw reply to a decision, substituting the fallback on parse errors.
    pub fn interpret(&self, reply: &str) -> PlannerReply {
        match parse(reply) {
            Ok(PlannerReply::Done) => {
                info!("Planner reports the request is complete");
                PlannerReply::Done
            }
            Ok(PlannerReply::Single(action)) => {
                info!("Planner proposed {} on {}", action.name, action.file_path);
                PlannerReply::Single(action)
            }
            Ok(PlannerReply::Batch(actions)) => {
                info!("Planner proposed a batch of {} actions", actions.len());
                PlannerReply::Batch(actions)
            }
            Err(e) => {
                warn!("Unusable planner reply ({}); falling back", e);
                debug!("Raw planner reply: {}", scrub_secrets(reply));
                PlannerReply::Single(self.fallback_action())
            }
        }
    }

    async fn build_request(&mut self, user_request: &str, store: &mut ContextStore) -> String {
        let root = self.workspace.clone();
        let config = self.config.clone();
        let codebase = tokio::task::spawn_blocking(move || Codebase::scan(&root, &config))
            .await
            .unwrap_or_else(|e| {
                warn!("Codebase scan failed: {}", e);
                Codebase::default()
            });

        if self.catalog.is_none() {
            self.catalog = Some(self.gateway.catalog().await);
        }
        let actions = self.registry.describe();
        let trim = store.bounded_summary(self.memory.token_budget).report;
        debug!("Context store {}", trim);
        let recent = store.windowed_summary(self.memory.window);
        let history = store.history_before_window(self.memory.window);

        PlannerRequest {
            codebase: &codebase,
            actions: &actions,
            catalog: self.catalog.as_deref().unwrap_or_default(),
            user_request,
            recent: &recent,
            history: &history,
            protected_paths: &self.config.protected_paths,
        }
        .render()
    }
}
