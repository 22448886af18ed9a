//! Error types and handling
//!
//! This module provides the error types used throughout the Waypoint engine.
//! All errors implement the `WaypointErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Recoverability
//!
//! Inside an episode, recoverable errors raised by an action handler are
//! converted into a failed `HandlerResult` and the user decides whether to
//! keep going. Non-recoverable errors (an unknown action kind or an unknown
//! external client) abort the episode immediately.

use thiserror::Error;

/// Trait for Waypoint error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait WaypointErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are folded into the episode as a failed action.
    /// Non-recoverable errors are lookup defects and end the episode.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **LLM Provider**: API failures, timeouts, authentication errors
/// - **Lookup**: Unknown action kinds and unknown external clients (fatal)
/// - **Handler**: Failures while executing an action
/// - **File System**: Path validation and access errors
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, WaypointErrorExt};
/// use std::path::PathBuf;
///
/// let error = EngineError::PathDenied(PathBuf::from(".ssh"));
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::UnknownAction("RUN_SHELL".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM call timed out")]
    LLMTimeout,

    // Lookup errors
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown external client: {0}")]
    UnknownExternalClient(String),

    // Action errors
    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("Handler error: {0}")]
    Handler(String),

    // File system security errors
    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Path outside workspace: {0:?}")]
    PathOutsideWorkspace(std::path::PathBuf),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Interactive prompt errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WaypointErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::LLMTimeout => "LLM provider took too long to respond. Try again",

            Self::UnknownAction(_) => "The model proposed an action that does not exist",
            Self::UnknownExternalClient(_) => {
                "No external client with that name is configured. Check [[external.clients]]"
            }

            Self::ExternalTool(_) => "External tool call failed",
            Self::Handler(_) => "Action failed",

            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::PathOutsideWorkspace(_) => "Operation must be within workspace",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            Self::Prompt(_) => "Could not read your answer from the terminal",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::UnknownAction(_) | Self::UnknownExternalClient(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
