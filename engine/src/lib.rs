//! Waypoint Engine Library
//!
//! Turns one natural-language request into a sequence of individually
//! approved operations against a codebase. Used by the `waypoint` binary and
//! by the integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// File system security module
pub mod fs_guard;

/// LLM provider abstraction layer
pub mod llm;

/// Codebase manifest scanner
pub mod codebase;

/// External tool gateway
pub mod external;

/// Action registry and handlers
pub mod actions;

/// Execution coordinator and confirmation gate
pub mod coordinator;

/// Next-action planner
pub mod planner;

/// Context store and episode loop
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
