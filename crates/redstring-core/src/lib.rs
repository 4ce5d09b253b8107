//! Process-wide Core: configuration, prompt library, pending-action
//! broker, and the projected bridge-state mirror.

pub mod bridge_store;
pub mod config;
pub mod core;
pub mod pending_actions;
pub mod prompts;
pub mod storage_paths;

pub use bridge_store::{BridgeState, BridgeStatePush, BridgeStateView};
pub use config::{EngineConfig, HttpsConfig, MaxPerTick, NodeEnv, TrustProxy};
pub use core::Core;
pub use pending_actions::PendingActionBroker;
pub use prompts::PromptStore;
pub use storage_paths::StatePaths;
