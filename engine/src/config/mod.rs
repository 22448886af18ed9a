//! Configuration management
//!
//! This module handles loading, validation, and management of the Waypoint configuration.
//! Configuration is stored in TOML format at ~/.waypoint/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level
//! - **llm**: LLM provider settings
//! - **memory**: Context store token budget and prompt window
//! - **planner**: Protected paths, fallback file, manifest scanning limits
//! - **agent**: Optional episode limits
//! - **external**: External tool clients (stdio JSON-RPC servers)
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Canonicalizes paths to resolve symlinks and .. patterns
//! - Verifies workspace is a directory
//!
//! # Examples
//!
//! ```no_run
//! use waypoint_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! // Access configuration values
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::context_store::DEFAULT_TOKEN_BUDGET;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// LLM provider configuration
    pub llm: LLMConfig,

    /// Context store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Planner configuration
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Episode limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// External tool clients
    #[serde(default)]
    pub external: ExternalConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace directory path (supports ~ expansion)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (ollama, openai, anthropic)
    pub default_provider: String,

    /// Per-request timeout for model calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,
    // Note: API key read from OPENAI_API_KEY or the OS keychain, not from config
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    // Note: API key read from ANTHROPIC_API_KEY or the OS keychain, not from config
}

/// Context store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget for the remembered episode history
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Number of recent operations and notes embedded in each planner request
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            window: default_window(),
        }
    }
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Paths the model is told never to target
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,

    /// File read by the fallback action when a reply cannot be parsed
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,

    /// Directory and file names skipped by the codebase manifest
    #[serde(default = "default_manifest_ignore")]
    pub manifest_ignore: Vec<String>,

    /// Files larger than this are left out of the manifest
    #[serde(default = "default_max_manifest_file_bytes")]
    pub max_manifest_file_bytes: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            protected_paths: default_protected_paths(),
            fallback_path: default_fallback_path(),
            manifest_ignore: default_manifest_ignore(),
            max_manifest_file_bytes: default_max_manifest_file_bytes(),
        }
    }
}

/// Episode limits
///
/// By default an episode only ends when the model reports completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Optional cap on planner calls per episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_planner_calls: Option<usize>,
}

/// External tool client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default)]
    pub clients: Vec<ExternalClientConfig>,
}

/// One stdio external tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalClientConfig {
    /// Name the model uses as `clientName`
    pub name: String,

    /// Executable to spawn
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

// Default value functions
fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_token_budget() -> usize {
    DEFAULT_TOKEN_BUDGET
}

fn default_window() -> usize {
    15
}

fn default_protected_paths() -> Vec<String> {
    [
        "*lock.yml",
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        ".npmrc",
        ".yarnrc",
        ".pnpmrc",
        "node_modules/**/*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fallback_path() -> String {
    "README.md".to_string()
}

fn default_manifest_ignore() -> Vec<String> {
    ["node_modules", "dist", "target", ".git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_manifest_file_bytes() -> u64 {
    200_000
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.waypoint/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (invalid paths, unknown provider, bad limits)
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    ///
    /// The file is written before path processing so the saved workspace
    /// stays relative to wherever waypoint is started.
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.waypoint/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".waypoint").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                workspace: default_workspace(),
                log_level: default_log_level(),
            },
            llm: LLMConfig {
                default_provider: "ollama".to_string(),
                request_timeout_secs: default_request_timeout_secs(),
                ollama: OllamaConfig::default(),
                openai: OpenAIConfig::default(),
                anthropic: AnthropicConfig::default(),
            },
            memory: MemoryConfig::default(),
            planner: PlannerConfig::default(),
            agent: AgentConfig::default(),
            external: ExternalConfig::default(),
        }
    }

    /// Point the configuration at a different workspace directory.
    ///
    /// The path is expanded and canonicalized; it must be an existing directory.
    pub fn set_workspace(&mut self, path: &Path) -> Result<(), EngineError> {
        let expanded = expand_path(path)?;
        let canonical = expanded
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(expanded.clone(), e.to_string()))?;

        if !canonical.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                canonical
            )));
        }

        self.core.workspace = canonical;
        Ok(())
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, provider and limits
    /// - Validates external client entries
    /// - Expands ~ in the workspace path and canonicalizes it
    /// - Verifies workspace is a directory
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai", "anthropic"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.memory.token_budget == 0 {
            return Err(EngineError::Config(
                "memory.token_budget must be greater than 0".to_string(),
            ));
        }
        if self.memory.window == 0 {
            return Err(EngineError::Config(
                "memory.window must be greater than 0".to_string(),
            ));
        }

        if self.planner.fallback_path.trim().is_empty() {
            return Err(EngineError::Config(
                "planner.fallback_path must not be empty".to_string(),
            ));
        }

        if self.agent.max_planner_calls == Some(0) {
            return Err(EngineError::Config(
                "agent.max_planner_calls must be greater than 0 when set".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for client in &self.external.clients {
            if client.name.trim().is_empty() || client.command.trim().is_empty() {
                return Err(EngineError::Config(
                    "external clients need a name and a command".to_string(),
                ));
            }
            if !seen.insert(client.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "Duplicate external client name '{}'",
                    client.name
                )));
            }
        }

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;

        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "ollama");
        assert_eq!(config.memory.token_budget, DEFAULT_TOKEN_BUDGET);
        assert_eq!(config.memory.window, 15);
        assert_eq!(config.planner.fallback_path, "README.md");
        assert!(config
            .planner
            .protected_paths
            .contains(&"package-lock.json".to_string()));
        assert!(config.agent.max_planner_calls.is_none());
        assert!(config.external.clients.is_empty());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_path_tilde_only() {
        let path = PathBuf::from("~");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.llm.default_provider,
            deserialized.llm.default_provider
        );
        assert_eq!(
            config.planner.protected_paths,
            deserialized.planner.protected_paths
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = Config::default_config();
        config.memory.window = 0;
        assert!(matches!(
            config.validate_and_process(),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_external_client_rejected() {
        let mut config = Config::default_config();
        let client = ExternalClientConfig {
            name: "calculator".to_string(),
            command: "node".to_string(),
            args: vec![],
            env: BTreeMap::new(),
        };
        config.external.clients = vec![client.clone(), client];
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("Duplicate external client"));
    }
}
