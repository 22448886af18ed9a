//! Waypoint SDK
//!
//! Shared types and errors for the Waypoint engine: the action wire format,
//! the episode context journal entries and the engine error taxonomy.

/// Error types and handling
pub mod errors;

/// Action, episode context and handler result types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, WaypointErrorExt};
pub use types::{
    estimate_tokens, Action, ActionKind, EpisodeContext, ExternalOperation, ExternalToolParams,
    ExternalToolRequest, HandlerResult, LastResult, Note, OperationRecord, OperationType,
    ProposedAction, CANCELLED_MESSAGE,
};
