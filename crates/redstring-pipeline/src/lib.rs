//! The Planner → Executor → Auditor → Committer pipeline.

pub mod auditor;
pub mod committer;
pub mod continuation;
pub mod executor;
pub mod graph_index;
pub mod hashing;
pub mod idempotency;
pub mod json_extract;
pub mod planner;
pub mod similarity;
pub mod tracer;

use redstring_types::ConversationTurn;

/// Keeps the last <= 3 conversation turns; the single place that
/// truncation happens so goal meta and continuation payloads agree.
pub fn last_conversation_turns(history: &[ConversationTurn]) -> Vec<ConversationTurn> {
    redstring_types::graph::last_turns(history, 3)
}
