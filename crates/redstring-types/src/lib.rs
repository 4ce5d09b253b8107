//! Wire-level value types shared by every Redstring crate, so no crate
//! depends on a handler crate just to name a plain data shape.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod api_config;
pub mod event;
pub mod goal;
pub mod graph;
pub mod op;
pub mod patch;
pub mod pending_action;
pub mod queue;
pub mod trace;

pub use api_config::ApiConfig;
pub use event::Event;
pub use goal::{Dag, Goal, GoalMeta, Task};
pub use graph::{ConversationTurn, GraphSnapshot};
pub use op::Op;
pub use patch::{Patch, Review, ReviewDecision};
pub use pending_action::{PendingAction, PendingActionMeta, PendingActionState};
pub use queue::{QueueItem, QueueMetrics, QueueStatus};
pub use trace::{Stage, StageRecord, StageStatus, Trace};

/// Milliseconds since the Unix epoch, clamped to 0 on a pre-epoch clock.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
