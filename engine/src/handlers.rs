//! Command handlers for CLI operations
//!
//! - run: one episode for a single request
//! - repl: one episode per input line
//! - actions: list action kinds
//! - tools: list external tool clients and their catalog
//! - config show / config path

use anyhow::{Context, Result};
use sdk::WaypointErrorExt;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::actions::ActionRegistry;
use crate::agent::{EpisodeOutcome, Session};
use crate::config::Config;
use crate::coordinator::confirm::{AutoConfirmer, Confirmer, Terminal, TerminalConfirmer};
use crate::external::ExternalGateway;
use crate::fs_guard::FileSystemGuard;
use crate::llm::{build_provider, LLMProvider};
use crate::secrets::SecretManager;

/// Keychain service name for API keys
const KEYRING_SERVICE: &str = "waypoint";

const REPL_PROMPT: &str = "waypoint> ";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let secrets = Arc::new(SecretManager::new(KEYRING_SERVICE));
    build_provider(&config.llm, secrets).context("Failed to set up the model provider")
}

fn session(config: &Config, confirmer: Arc<dyn Confirmer>) -> Result<Session> {
    let gateway = Arc::new(ExternalGateway::from_config(&config.external.clients));
    Session::from_config(config, provider(config)?, confirmer, gateway)
        .context("Failed to set up the session")
}

fn print_outcome(outcome: &EpisodeOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", outcome.summary.trim_end());
            println!();
            let mark = if outcome.success { "✓" } else { "✗" };
            println!("{} {}", mark, outcome.message);
            println!("  Planner calls: {}", outcome.steps);
            println!("  Operations: {}", outcome.operations);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
    }
    Ok(())
}

/// Run a single request to completion.
///
/// Fails when the episode aborts or ends unsuccessfully, so the process
/// exits non-zero.
pub async fn handle_run(
    request: String,
    config: &Config,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    let confirmer: Arc<dyn Confirmer> = if yes {
        Arc::new(AutoConfirmer)
    } else {
        Arc::new(TerminalConfirmer::new(Arc::new(Terminal::new())))
    };
    let mut session = session(config, confirmer)?;

    if let OutputFormat::Text = format {
        println!("Request: {}", request);
    }

    let outcome = session
        .run_episode(&request)
        .await
        .context("Episode aborted")?;
    print_outcome(&outcome, format)?;

    if !outcome.success {
        anyhow::bail!("{}", outcome.message);
    }
    Ok(())
}

/// Read requests from stdin until `exit`, `quit` or end of input.
///
/// A fatal episode error is reported and the loop goes on.
pub async fn handle_repl(config: &Config, format: OutputFormat) -> Result<()> {
    let terminal = Arc::new(Terminal::new());
    let mut session = session(config, Arc::new(TerminalConfirmer::new(Arc::clone(&terminal))))?;

    println!("Workspace: {}", config.core.workspace.display());
    println!("Type a request, or 'exit' to quit.");

    while let Some(line) = terminal.read_line(REPL_PROMPT).await? {
        let request = line.trim();
        match request {
            "" => continue,
            "exit" | "quit" => break,
            _ => {}
        }

        match session.run_episode(request).await {
            Ok(outcome) => print_outcome(&outcome, format)?,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Hint: {}", e.user_hint());
            }
        }
    }

    Ok(())
}

/// List the action kinds the planner may propose.
pub fn handle_actions(config: &Config, format: OutputFormat) -> Result<()> {
    let guard = FileSystemGuard::new(config.core.workspace.clone())?;
    let registry = ActionRegistry::new(guard, provider(config)?, Arc::new(ExternalGateway::new()));

    match format {
        OutputFormat::Text => {
            println!("Actions:");
            for kind in registry.kinds() {
                let handler = registry.handler(*kind);
                println!(
                    "  {:<14} {:<9} {}",
                    kind.as_str(),
                    handler.classification().to_string(),
                    handler.description()
                );
            }
        }
        OutputFormat::Json => {
            let actions: Vec<_> = registry
                .kinds()
                .iter()
                .map(|kind| {
                    let handler = registry.handler(*kind);
                    json!({
                        "name": kind.as_str(),
                        "classification": handler.classification().to_string(),
                        "description": handler.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }
    }
    Ok(())
}

/// List configured external clients and what they offer.
pub async fn handle_tools(config: &Config, format: OutputFormat) -> Result<()> {
    let gateway = ExternalGateway::from_config(&config.external.clients);
    let catalog = gateway.catalog().await;

    match format {
        OutputFormat::Text => {
            if catalog.is_empty() {
                println!("No external tool clients configured.");
                println!("Add [[external.clients]] entries to the configuration file.");
                return Ok(());
            }
            for entry in &catalog {
                println!("{}", entry.client);
                if entry.tools.is_empty() {
                    println!("  (no tools)");
                }
                for tool in &entry.tools {
                    println!(
                        "  {} {}",
                        tool.name,
                        tool.description.as_deref().unwrap_or("")
                    );
                }
                for resource in &entry.resources {
                    println!("  resource {}", resource.uri);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }
    }
    Ok(())
}

pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = toml::to_string_pretty(config).context("Failed to render configuration")?;
            println!("{}", text);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

pub fn handle_config_path(path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", path.display()),
        OutputFormat::Json => println!("{}", json!({ "path": path })),
    }
    Ok(())
}
