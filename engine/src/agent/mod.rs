//! Episode orchestration
//!
//! [`context_store`] is the bounded journal for one episode and
//! [`session`] drives the plan / execute / fold loop over it.

pub mod context_store;
pub mod session;

pub use context_store::{BoundedSummary, ContextStore, TrimReport, DEFAULT_TOKEN_BUDGET};
pub use session::{EpisodeOutcome, Session};
