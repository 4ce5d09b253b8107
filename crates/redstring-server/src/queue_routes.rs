//! Direct queue access and seed helpers. These bypass the agent HTTP
//! surface so a test harness can
//! drive goals/tasks/patches/reviews through the pipeline without a live
//! model provider, and exercise each Scheduler stage in isolation.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use redstring_pipeline::auditor::{audit, AuditContext};
use redstring_queue::manager::{PullOptions, QueueName};
use redstring_types::{Dag, Event, Goal, GoalMeta, Op, Patch, Review, ReviewDecision, Task};

use crate::error::ApiError;
use crate::state::AppState;

fn parse_queue_name(raw: &str) -> Result<QueueName, ApiError> {
    match raw {
        "goalQueue" => Ok(QueueName::Goal),
        "taskQueue" => Ok(QueueName::Task),
        "patchQueue" => Ok(QueueName::Patch),
        "reviewQueue" => Ok(QueueName::Review),
        other => Err(ApiError::Validation(format!("unknown queue {other:?}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsEnqueueRequest {
    pub goal: String,
    #[serde(default)]
    pub dag: Dag,
    pub thread_id: String,
    #[serde(default)]
    pub meta: GoalMeta,
}

/// `POST /queue/goals.enqueue { goal, dag, threadId }`.
pub async fn goals_enqueue(State(state): State<AppState>, Json(req): Json<GoalsEnqueueRequest>) -> Json<Value> {
    let goal = Goal {
        id: Uuid::new_v4().to_string(),
        goal: req.goal,
        dag: req.dag,
        thread_id: req.thread_id.clone(),
        meta: req.meta,
    };
    let id = goal.id.clone();
    state.core.queues.enqueue(QueueName::Goal, "goal", req.thread_id.clone(), serde_json::to_value(&goal).unwrap_or(Value::Null)).await;
    state.core.events.append(Event::new("GOAL_ENQUEUED", json!({ "goal": goal.goal, "goalId": id, "cid": req.thread_id })));
    Json(json!({ "success": true, "goalId": id }))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TasksPullRequest {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default = "default_pull_max")]
    pub max: usize,
}

fn default_pull_max() -> usize {
    10
}

/// `POST /queue/tasks.pull { threadId?, max } -> { items }`.
pub async fn tasks_pull(State(state): State<AppState>, Json(req): Json<TasksPullRequest>) -> Json<Value> {
    let mut opts = PullOptions::new(req.max);
    opts.partition_key = req.thread_id;
    let items = state.core.queues.pull(QueueName::Task, opts).await;
    Json(json!({ "items": items }))
}

#[derive(Debug, Deserialize)]
pub struct PatchesSubmitRequest {
    pub patch: Patch,
}

/// `POST /queue/patches.submit { patch }` — enqueues a patch directly,
/// as the Scheduler's executor stage normally would.
pub async fn patches_submit(State(state): State<AppState>, Json(req): Json<PatchesSubmitRequest>) -> Json<Value> {
    let patch_id = req.patch.patch_id.clone();
    let thread_id = req.patch.thread_id.clone();
    state.core.queues.enqueue(QueueName::Patch, "patch", thread_id, json!({ "patch": req.patch })).await;
    state.core.events.append(Event::new("PATCH_SUBMITTED", json!({ "patchId": patch_id })));
    Json(json!({ "success": true, "patchId": patch_id }))
}

#[derive(Debug, Deserialize, Default)]
pub struct ReviewsPullRequest {
    #[serde(default = "default_pull_max")]
    pub max: usize,
}

/// `POST /queue/reviews.pull { max }` — pulls patches awaiting an audit
/// decision (the Auditor's own input queue), leasing them for a caller
/// standing in for the Auditor stage.
pub async fn reviews_pull(State(state): State<AppState>, Json(req): Json<ReviewsPullRequest>) -> Json<Value> {
    let items = state.core.queues.pull(QueueName::Patch, PullOptions::new(req.max)).await;
    Json(json!({ "items": items }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsSubmitRequest {
    pub lease_id: String,
    pub decision: ReviewDecision,
    #[serde(default)]
    pub reasons: Option<Vec<String>>,
    pub graph_id: String,
    #[serde(default)]
    pub patch: Option<Patch>,
    #[serde(default)]
    pub patches: Vec<Patch>,
}

/// `POST /queue/reviews.submit { leaseId, decision, reasons?, graphId,
/// patch | patches[] }` — acks the leased patch-queue item and places the
/// resulting [`Review`] on `reviewQueue` for the Committer stage.
pub async fn reviews_submit(State(state): State<AppState>, Json(req): Json<ReviewsSubmitRequest>) -> Result<Json<Value>, ApiError> {
    let mut patches = req.patches;
    if let Some(patch) = req.patch {
        patches.push(patch);
    }
    let review = Review {
        decision: req.decision,
        reasons: req.reasons,
        graph_id: req.graph_id.clone(),
        patches,
    };
    state
        .core
        .queues
        .ack(QueueName::Patch, &req.lease_id)
        .await
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    state.core.events.append(Event::new("REVIEW_ENQUEUED", json!({ "graphId": review.graph_id, "decision": review.decision })));
    state.core.queues.enqueue(QueueName::Review, "review", req.graph_id, json!({ "review": review })).await;
    Ok(Json(json!({ "success": true })))
}

/// `POST /queue/patches.approve-next` — dev shortcut that runs the real
/// Auditor logic over the next patch-queue item rather than accepting a
/// caller-supplied decision.
pub async fn patches_approve_next(State(state): State<AppState>) -> Json<Value> {
    let items = state.core.queues.pull(QueueName::Patch, PullOptions::new(1)).await;
    let Some(item) = items.into_iter().next() else {
        return Json(json!({ "success": false, "error": "patchQueue is empty" }));
    };
    let Some(patch) = item.payload.get("patch").cloned().and_then(|v| serde_json::from_value::<Patch>(v).ok()) else {
        if let Some(lease_id) = &item.lease_id {
            let _ = state.core.queues.nack(QueueName::Patch, lease_id, false).await;
        }
        return Json(json!({ "success": false, "error": "malformed patch payload" }));
    };

    let base_hash = state.core.committer.current_head(&patch.graph_id).await;
    let existing_names = state.core.bridge_state_view().node_prototypes.values().filter_map(|v| v.get("name").and_then(Value::as_str)).map(str::to_string).collect::<Vec<_>>();
    let ctx = AuditContext {
        current_base_hash: base_hash.as_deref(),
        existing_node_names: &existing_names,
        committed_patch_ids: state.core.committer.committed_patch_ids(),
    };
    let review = audit(&patch, &ctx);

    if let Some(lease_id) = &item.lease_id {
        let _ = state.core.queues.ack(QueueName::Patch, lease_id).await;
    }
    state.core.events.append(Event::new("REVIEW_ENQUEUED", json!({ "graphId": review.graph_id, "decision": review.decision })));
    state.core.queues.enqueue(QueueName::Review, "review", review.graph_id.clone(), json!({ "review": review.clone() })).await;
    Json(json!({ "success": true, "review": review }))
}

#[derive(Debug, Deserialize)]
pub struct QueueNameQuery {
    pub name: String,
}

/// `GET /queue/metrics?name=<queueName>`.
pub async fn queue_metrics(State(state): State<AppState>, Query(query): Query<QueueNameQuery>) -> Result<Json<Value>, ApiError> {
    let name = parse_queue_name(&query.name)?;
    Ok(Json(serde_json::to_value(state.core.queues.metrics(name).await).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct QueuePeekQuery {
    pub name: String,
    #[serde(default = "default_peek_head")]
    pub head: usize,
}

fn default_peek_head() -> usize {
    20
}

/// `GET /queue/peek?name=&head=` — a read-only snapshot, never mutated
/// back into the queue.
pub async fn queue_peek(State(state): State<AppState>, Query(query): Query<QueuePeekQuery>) -> Result<Json<Value>, ApiError> {
    let name = parse_queue_name(&query.name)?;
    let items = state.core.queues.get_queue(name).await;
    Ok(Json(json!({ "items": items.into_iter().take(query.head).collect::<Vec<_>>() })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    pub thread_id: String,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,
}

/// `POST /test/create-task` — seed helper that drops a task straight onto
/// `taskQueue`, bypassing the Planner/Executor entirely.
pub async fn test_create_task(State(state): State<AppState>, Json(req): Json<CreateTaskRequest>) -> Json<Value> {
    let payload = json!({
        "goalId": req.goal_id.unwrap_or_default(),
        "toolName": req.tool_name,
        "args": req.args,
        "threadId": req.thread_id,
        "dependsOn": req.depends_on,
    });
    let id = state.core.queues.enqueue(QueueName::Task, "task", req.thread_id, payload).await;
    Json(json!({ "success": true, "id": id }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOpsRequest {
    pub graph_id: String,
    pub ops: Vec<Op>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// `POST /test/commit-ops` — seed helper that commits ops directly,
/// skipping Planner/Executor/Auditor; exercises only the Committer's
/// single-writer/idempotency machinery.
pub async fn test_commit_ops(State(state): State<AppState>, Json(req): Json<CommitOpsRequest>) -> Json<Value> {
    let review = Review {
        decision: ReviewDecision::Approved,
        reasons: None,
        graph_id: req.graph_id.clone(),
        patches: vec![Patch {
            patch_id: Uuid::new_v4().to_string(),
            graph_id: req.graph_id,
            thread_id: req.thread_id.unwrap_or_default(),
            base_hash: None,
            ops: req.ops,
        }],
    };
    let active_graph_id = state.core.active_graph_id();
    let actions = state.core.committer.commit(&review, active_graph_id.as_deref()).await;
    if !actions.is_empty() {
        state.core.events.append(Event::new("PENDING_ACTIONS_ENQUEUED", json!({ "count": actions.len() })));
        state.core.pending_actions.enqueue_many(actions.clone());
    }
    Json(json!({ "success": true, "actions": actions }))
}
