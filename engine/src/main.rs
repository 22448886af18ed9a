// Waypoint
// Main entry point for the waypoint binary

use anyhow::Context;
use clap::Parser;
use waypoint_engine::cli::{Cli, Command, ConfigAction};
use waypoint_engine::config::Config;
use waypoint_engine::handlers::{
    handle_actions, handle_config_path, handle_config_show, handle_repl, handle_run, handle_tools,
    OutputFormat,
};
use waypoint_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };

    if let Command::Config {
        action: ConfigAction::Path,
    } = &cli.command
    {
        return handle_config_path(&config_path, format);
    }

    let mut config = if cli.config.is_some() {
        Config::load_from_path(&config_path)?
    } else {
        Config::load_or_create()?
    };

    if let Some(level) = &cli.log {
        config.core.log_level = level.clone();
    }
    if let Some(provider) = &cli.provider {
        config.llm.default_provider = provider.clone();
    }
    if let Some(workspace) = &cli.workspace {
        config
            .set_workspace(workspace)
            .context("Invalid --workspace")?;
    }
    config
        .validate_and_process()
        .context("Invalid configuration")?;

    // RUST_LOG still wins over the configured level.
    init_telemetry_with_level(&config.core.log_level);
    tracing::info!("Waypoint v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run { request, yes } => handle_run(request, &config, yes, format).await,
        Command::Repl => handle_repl(&config, format).await,
        Command::Actions => handle_actions(&config, format),
        Command::Tools => handle_tools(&config, format).await,
        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Path => handle_config_path(&config_path, format),
        },
    }
}
