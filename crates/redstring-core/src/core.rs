//! Process-wide `Core`: the one long-lived value every HTTP handler and
//! background task shares — a single struct of `Arc`/cheaply-clonable
//! handles assembled once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};

use redstring_eventlog::EventLog;
use redstring_pipeline::committer::Committer;
use redstring_pipeline::idempotency::IdRing;
use redstring_pipeline::planner::PromptLibrary;
use redstring_pipeline::tracer::Tracer;
use redstring_providers::Provider;
use redstring_queue::manager::QueueManager;
use redstring_types::GoalMeta;

use crate::bridge_store::{BridgeState, BridgeStatePush, BridgeStateView};
use crate::config::EngineConfig;
use crate::pending_actions::PendingActionBroker;
use crate::prompts::PromptStore;
use crate::storage_paths::StatePaths;

/// Everything a request handler needs, bundled so `State<Arc<Core>>`
/// (axum's idiom) is the only extractor any route uses.
pub struct Core {
    pub config: EngineConfig,
    pub queues: QueueManager,
    pub events: EventLog,
    pub tracer: Arc<Tracer>,
    pub committer: Arc<Committer>,
    pub pending_actions: PendingActionBroker,
    pub bridge_state: RwLock<BridgeState>,
    pub provider: Arc<dyn Provider>,
    prompt_store: PromptStore,
    /// Remembers the originating goal's `meta` per `cid` for agentic-loop
    /// goals, so the `action-completed` handler can re-invoke the
    /// continuation step in-process once the UI confirms an apply
    ///.
    pub agentic_goal_meta: Mutex<HashMap<String, GoalMeta>>,
    pub started_at_ms: u64,
}

impl Core {
    pub async fn bootstrap(config: EngineConfig, provider: Arc<dyn Provider>) -> Result<Arc<Self>> {
        let paths = StatePaths::resolve(&config.state_dir);
        paths.ensure_exists().await?;
        let prompt_store = PromptStore::load(&paths.prompts_dir).await?;

        let queues = QueueManager::new(config.queue_lease_ttl_ms, config.queue_max_attempts);
        let events = EventLog::new(config.event_log_capacity);
        let tracer = Arc::new(Tracer::new(config.tracer_max_traces));
        let committer = Arc::new(Committer::new(IdRing::new(config.committed_patch_ring_capacity)));

        Ok(Arc::new(Self {
            config,
            queues,
            events,
            tracer,
            committer,
            pending_actions: PendingActionBroker::new(),
            bridge_state: RwLock::new(BridgeState::new()),
            provider,
            prompt_store,
            agentic_goal_meta: Mutex::new(HashMap::new()),
            started_at_ms: redstring_types::now_ms(),
        }))
    }

    pub fn remember_agentic_goal(&self, cid: &str, meta: GoalMeta) {
        if meta.agentic_loop {
            self.agentic_goal_meta.lock().insert(cid.to_string(), meta);
        }
    }

    pub fn take_agentic_goal_meta(&self, cid: &str) -> Option<GoalMeta> {
        self.agentic_goal_meta.lock().remove(cid)
    }

    pub fn prompt_library(&self) -> PromptLibrary {
        self.prompt_store.library()
    }

    pub fn merge_bridge_state(&self, push: BridgeStatePush) {
        self.bridge_state.write().merge(push);
    }

    pub fn bridge_state_view(&self) -> BridgeStateView {
        self.bridge_state.read().view()
    }

    pub fn active_graph_id(&self) -> Option<String> {
        self.bridge_state.read().active_graph_id().map(str::to_string)
    }

    pub fn graph_snapshot(&self, graph_id: &str) -> Option<redstring_types::GraphSnapshot> {
        self.bridge_state.read().graph_snapshot(graph_id)
    }

    pub fn uptime_ms(&self) -> u64 {
        redstring_types::now_ms().saturating_sub(self.started_at_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstring_providers::ReqwestProvider;

    #[tokio::test]
    async fn bootstrap_creates_state_dir_and_loads_default_prompts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::from_env();
        config.state_dir = tmp.path().join("state");
        let provider: Arc<dyn Provider> = Arc::new(ReqwestProvider::new("test", "http://localhost"));
        let core = Core::bootstrap(config, provider).await.unwrap();
        assert!(core.config.state_dir.join("prompts").is_dir());
        assert!(!core.prompt_library().hidden_system_prompt.is_empty());
    }

    #[tokio::test]
    async fn agentic_goal_meta_is_remembered_once_and_consumed_on_take() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::from_env();
        config.state_dir = tmp.path().join("state");
        let provider: Arc<dyn Provider> = Arc::new(ReqwestProvider::new("test", "http://localhost"));
        let core = Core::bootstrap(config, provider).await.unwrap();

        let mut meta = GoalMeta::default();
        meta.iteration = 2;

        // Non-agentic goals are never remembered (action-completed has
        // nothing to re-invoke the continuation loop with).
        core.remember_agentic_goal("c1", meta.clone());
        assert!(core.take_agentic_goal_meta("c1").is_none());

        meta.agentic_loop = true;
        core.remember_agentic_goal("c1", meta);
        let taken = core.take_agentic_goal_meta("c1").unwrap();
        assert_eq!(taken.iteration, 2);
        assert!(core.take_agentic_goal_meta("c1").is_none());
    }
}
