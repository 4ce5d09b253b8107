//! Cadence-driven Scheduler. Each tick advances the
//! executor/auditor/committer stages within `maxPerTick` caps. The
//! Planner is invoked synchronously from the `/api/ai/agent` handler
//! rather than drained from a queue in this architecture (there is no
//! literal "plannerQueue" among the four named queues), so its
//! `maxPerTick` cap is given teeth through [`PlannerThrottle`]: a permit
//! pool refilled once per tick that handlers must acquire before calling
//! the model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use uuid::Uuid;

use redstring_core::Core;
use redstring_pipeline::auditor::{audit, AuditContext};
use redstring_pipeline::executor::task_to_ops;
use redstring_pipeline::graph_index::GraphIndex;
use redstring_queue::manager::{PullOptions, QueueName};
use redstring_types::{Event, Goal, Patch, Review, Stage, StageStatus, Task};

/// Refilled to `max_per_tick.planner` once per scheduler tick; HTTP
/// handlers `acquire` a permit before an in-process planner call and
/// release it when the call returns.
pub struct PlannerThrottle {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PlannerThrottle {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn handle(&self) -> Arc<Semaphore> {
        self.semaphore.clone()
    }

    /// Tops the pool back up to capacity; never exceeds it even if the
    /// previous tick left unused permits outstanding.
    fn refill(&self) {
        let available = self.semaphore.available_permits();
        if available < self.capacity {
            self.semaphore.add_permits(self.capacity - available);
        }
    }
}

#[derive(Default)]
struct DagProgress {
    /// `goalId -> toolNames already converted into a committed patch`.
    completed_tools: HashMap<String, HashSet<String>>,
    /// `patchId -> (goalId, toolName)`, so a committed patch can mark its
    /// originating task complete.
    provenance: HashMap<String, (String, String)>,
}

pub struct Scheduler {
    core: Arc<Core>,
    pub planner_throttle: PlannerThrottle,
    progress: Mutex<DagProgress>,
}

impl Scheduler {
    pub fn new(core: Arc<Core>) -> Self {
        let capacity = core.config.max_per_tick.planner;
        Self {
            core,
            planner_throttle: PlannerThrottle::new(capacity.max(1)),
            progress: Mutex::new(DagProgress::default()),
        }
    }

    pub async fn tick(&self) {
        self.planner_throttle.refill();
        self.run_executor_stage().await;
        self.run_auditor_stage().await;
        self.run_committer_stage().await;
        self.core.queues.sweep_expired_leases().await;
    }

    /// Drains `goalQueue` into `taskQueue`, then drains ready `taskQueue`
    /// items into `patchQueue` — both capped by `maxPerTick.executor`.
    async fn run_executor_stage(&self) {
        let cap = self.core.config.max_per_tick.executor;
        self.drain_goals_into_tasks(cap).await;
        self.drain_tasks_into_patches(cap).await;
    }

    async fn drain_goals_into_tasks(&self, max: usize) {
        let items = self.core.queues.pull(QueueName::Goal, PullOptions::new(max)).await;
        for item in items {
            let Ok(goal) = serde_json::from_value::<Goal>(item.payload.clone()) else {
                let _ = self.core.queues.nack(QueueName::Goal, item.lease_id.as_deref().unwrap_or_default(), false).await;
                continue;
            };
            self.core.remember_agentic_goal(&goal.thread_id, goal.meta.clone());
            for task in &goal.dag.tasks {
                let payload = json!({
                    "goalId": goal.id,
                    "toolName": task.tool_name,
                    "args": task.args,
                    "threadId": task.thread_id,
                    "dependsOn": task.depends_on,
                });
                self.core.queues.enqueue(QueueName::Task, "task", task.thread_id.clone(), payload).await;
            }
            self.core.events.append(Event::new("TASK_ENQUEUED", json!({ "goalId": goal.id, "count": goal.dag.tasks.len() })));
            if let Some(lease_id) = &item.lease_id {
                let _ = self.core.queues.ack(QueueName::Goal, lease_id).await;
            }
        }
    }

    async fn drain_tasks_into_patches(&self, max: usize) {
        let progress_snapshot = self.progress.lock().completed_tools.clone();
        let filter = move |item: &redstring_types::QueueItem| -> bool {
            let Some(goal_id) = item.payload.get("goalId").and_then(Value::as_str) else {
                return true;
            };
            let Some(depends_on) = item.payload.get("dependsOn").and_then(Value::as_array) else {
                return true;
            };
            let done = progress_snapshot.get(goal_id);
            depends_on.iter().all(|dep| dep.as_str().is_some_and(|dep| done.is_some_and(|d| d.contains(dep))))
        };
        let mut opts = PullOptions::new(max);
        opts.filter = Some(Box::new(filter));
        let items = self.core.queues.pull(QueueName::Task, opts).await;

        for item in items {
            let goal_id = item.payload.get("goalId").and_then(Value::as_str).unwrap_or_default().to_string();
            let Some(tool_name) = item.payload.get("toolName").and_then(Value::as_str).map(str::to_string) else {
                if let Some(lease_id) = &item.lease_id {
                    let _ = self.core.queues.nack(QueueName::Task, lease_id, false).await;
                }
                continue;
            };
            let task = Task {
                tool_name: tool_name.clone(),
                args: item.payload.get("args").cloned().unwrap_or(json!({})),
                thread_id: item.payload.get("threadId").and_then(Value::as_str).unwrap_or_default().to_string(),
                depends_on: None,
            };

            let index = self.build_graph_index();
            let ops = task_to_ops(&task, &index);
            let graph_id = ops.iter().find_map(|op| op.graph_id().map(str::to_string)).or_else(|| index.active_graph_id.clone()).unwrap_or_default();
            let base_hash = self.core.committer.current_head(&graph_id).await;
            let patch_id = Uuid::new_v4().to_string();
            let patch = Patch {
                patch_id: patch_id.clone(),
                graph_id,
                thread_id: task.thread_id.clone(),
                base_hash,
                ops,
            };

            self.progress.lock().provenance.insert(patch_id.clone(), (goal_id, tool_name));
            let payload = json!({ "patch": patch });
            self.core
                .queues
                .enqueue(QueueName::Patch, "patch", patch.thread_id.clone(), payload)
                .await;
            self.core.events.append(Event::new("PATCH_SUBMITTED", json!({ "patchId": patch.patch_id })));

            if let Some(lease_id) = &item.lease_id {
                let _ = self.core.queues.ack(QueueName::Task, lease_id).await;
            }
        }
    }

    async fn run_auditor_stage(&self) {
        let max = self.core.config.max_per_tick.auditor;
        let items = self.core.queues.pull(QueueName::Patch, PullOptions::new(max)).await;
        for item in items {
            let Some(patch) = item.payload.get("patch").cloned().and_then(|v| serde_json::from_value::<Patch>(v).ok()) else {
                if let Some(lease_id) = &item.lease_id {
                    let _ = self.core.queues.nack(QueueName::Patch, lease_id, false).await;
                }
                continue;
            };

            self.core.tracer.record_stage(&patch.thread_id, Stage::Auditor, None);
            let base_hash = self.core.committer.current_head(&patch.graph_id).await;
            let existing_names = self.core.bridge_state_view().node_prototypes.values().filter_map(|v| v.get("name").and_then(Value::as_str)).map(str::to_string).collect::<Vec<_>>();
            let ctx = AuditContext {
                current_base_hash: base_hash.as_deref(),
                existing_node_names: &existing_names,
                committed_patch_ids: self.core.committer.committed_patch_ids(),
            };
            let review = audit(&patch, &ctx);
            let status = if review.decision == redstring_types::ReviewDecision::Approved { StageStatus::Success } else { StageStatus::Error };
            self.core.tracer.complete_stage(&patch.thread_id, Stage::Auditor, status, review.reasons.clone().map(|r| json!({ "reasons": r })));

            // A rejected review carries no `patches`, so the Committer never
            // sees this patch id again — mark the originating task complete
            // here so a failed task doesn't permanently block a dependent
            // one's `dependsOn` filter.
            if review.decision != redstring_types::ReviewDecision::Approved {
                self.mark_tasks_complete(std::slice::from_ref(&patch.patch_id));
            }

            self.core.events.append(Event::new("REVIEW_ENQUEUED", json!({ "graphId": review.graph_id, "decision": review.decision })));
            let payload = json!({ "review": review });
            self.core.queues.enqueue(QueueName::Review, "review", patch.graph_id.clone(), payload).await;

            if let Some(lease_id) = &item.lease_id {
                let _ = self.core.queues.ack(QueueName::Patch, lease_id).await;
            }
        }
    }

    /// Uncapped: `maxPerTick` only bounds the
    /// planner/executor/auditor stages, so the Committer drains every
    /// approved review available each tick.
    async fn run_committer_stage(&self) {
        let items = self.core.queues.pull(QueueName::Review, PullOptions::new(usize::MAX / 2)).await;
        for item in items {
            let Some(review) = item.payload.get("review").cloned().and_then(|v| serde_json::from_value::<Review>(v).ok()) else {
                if let Some(lease_id) = &item.lease_id {
                    let _ = self.core.queues.nack(QueueName::Review, lease_id, false).await;
                }
                continue;
            };

            let active_graph_id = self.core.active_graph_id();
            let patch_ids: Vec<String> = review.patches.iter().map(|p| p.patch_id.clone()).collect();
            let actions = self.core.committer.commit(&review, active_graph_id.as_deref()).await;
            self.mark_tasks_complete(&patch_ids);

            if !actions.is_empty() {
                self.core.events.append(Event::new("PENDING_ACTIONS_ENQUEUED", json!({ "count": actions.len() })));
                for action in &actions {
                    if action.action == "applyMutations" {
                        self.core.events.append(Event::new("PATCH_APPLIED", json!({ "graphId": review.graph_id })));
                    }
                }
                self.core.pending_actions.enqueue_many(actions);
            }

            if let Some(lease_id) = &item.lease_id {
                let _ = self.core.queues.ack(QueueName::Review, lease_id).await;
            }
        }
    }

    fn mark_tasks_complete(&self, patch_ids: &[String]) {
        let mut progress = self.progress.lock();
        for patch_id in patch_ids {
            if let Some((goal_id, tool_name)) = progress.provenance.remove(patch_id) {
                progress.completed_tools.entry(goal_id).or_default().insert(tool_name);
            }
        }
    }

    fn build_graph_index(&self) -> GraphIndex {
        let view = self.core.bridge_state_view();
        let mut index = GraphIndex::new(view.active_graph_id.clone());
        for (id, proto) in &view.node_prototypes {
            if let Some(name) = proto.get("name").and_then(Value::as_str) {
                index.add_prototype(id.clone(), name.to_string());
            }
        }
        for (graph_id, graph) in &view.graphs {
            if let Some(instances) = graph.get("instances").and_then(Value::as_object) {
                for (instance_id, instance) in instances {
                    if let Some(prototype_id) = instance.get("prototypeId").and_then(Value::as_str) {
                        index.add_instance(graph_id.clone(), prototype_id.to_string(), instance_id.clone());
                    }
                }
            }
            if let Some(edges) = graph.get("edges").and_then(Value::as_object) {
                for (edge_id, edge) in edges {
                    let source = edge.get("sourceId").and_then(Value::as_str).unwrap_or_default();
                    let dest = edge.get("destId").and_then(Value::as_str).unwrap_or_default();
                    index.add_edge(graph_id.clone(), edge_id.clone(), source, dest);
                }
            }
        }
        index
    }
}
