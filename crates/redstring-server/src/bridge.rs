//! `/api/bridge/*` — the projected bridge-state mirror and the
//! pending-action broker's client-facing lease surface.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use redstring_core::BridgeStatePush;
use redstring_types::{GraphSnapshot, PendingAction};

use crate::agent::{run_continuation, ContinueRequestBody};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/bridge/state` — the UI pushes a projected snapshot; the
/// server merges it into its own mirror.
pub async fn push_bridge_state(State(state): State<AppState>, Json(push): Json<BridgeStatePush>) -> Json<Value> {
    state.core.merge_bridge_state(push);
    Json(json!({ "success": true }))
}

/// `GET /api/bridge/state` — returns the current projection.
pub async fn get_bridge_state(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.core.bridge_state_view()).unwrap_or(Value::Null))
}

/// `GET /api/bridge/pending-actions`: returns the subset
/// of enqueued actions not currently leased, marking each returned action
/// as leased.
pub async fn pull_pending_actions(State(state): State<AppState>) -> Json<Value> {
    let actions = state.core.pending_actions.pull_available();
    Json(json!({ "actions": actions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCompletedRequest {
    pub action_id: String,
}

/// `POST /api/bridge/action-completed { actionId }` — removes the action
/// from the enqueued pool and releases the lease. If the completed action
/// was an `applyMutations` belonging to an agentic-loop goal, re-invokes
/// the continuation step in the background. The re-invocation is spawned rather than
/// awaited so this handler's response to the client isn't gated on
/// another model round-trip.
pub async fn action_completed(State(state): State<AppState>, Json(req): Json<ActionCompletedRequest>) -> Result<Json<Value>, ApiError> {
    let completed = state.core.pending_actions.complete(&req.action_id);
    let success = completed.is_some();

    if let Some(action) = completed {
        if action.action == "applyMutations" {
            maybe_reinvoke_continuation(&state, &action);
        }
    }

    Ok(Json(json!({ "success": success })))
}

/// Builds and spawns a continuation call for the goal that produced
/// `action`, iff that goal's `meta.agenticLoop` was true.
/// A no-op for actions whose `cid` never had an agentic goal recorded —
/// e.g. plain `qa` turns, or the non-agentic single-task `create_graph`
/// path from scenario S1.
fn maybe_reinvoke_continuation(state: &AppState, action: &PendingAction) {
    let Some(cid) = action.meta.as_ref().and_then(|m| m.cid.clone()) else {
        return;
    };
    let Some(meta) = state.core.take_agentic_goal_meta(&cid) else {
        return;
    };

    let graph_id = action
        .params
        .first()
        .and_then(|p| p.get("graphId"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let graph_state = graph_id
        .as_deref()
        .and_then(|id| state.core.graph_snapshot(id))
        .unwrap_or_else(|| GraphSnapshot::truncated(graph_id, None, &[], 0));

    let remaining_subgoals = meta
        .chain_state
        .as_ref()
        .and_then(|cs| cs.get("remainingSubgoals"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let req = ContinueRequestBody {
        cid,
        last_action: Some(action.action.clone()),
        graph_state,
        iteration: meta.iteration,
        read_result: None,
        remaining_subgoals,
        api_config: meta.api_config,
        api_key: meta.api_key,
        conversation_history: meta.conversation_history,
        original_message: meta.original_message,
    };

    let state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = run_continuation(&state, req).await {
            tracing::warn!(?err, "continuation re-invocation after action-completed failed");
        }
    });
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStartedRequest {
    pub action_id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// `POST /api/bridge/action-started { actionId, action, params }` —
/// records a start timestamp for latency tracing.
pub async fn action_started(State(state): State<AppState>, Json(req): Json<ActionStartedRequest>) -> Json<Value> {
    let ok = state.core.pending_actions.mark_started(&req.action_id);
    Json(json!({ "success": ok }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFeedbackRequest {
    pub action: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub action_id: Option<String>,
}

/// `POST /api/bridge/action-feedback { action, status, error?, params }`
/// — records status/error without changing lease state.
pub async fn action_feedback(State(state): State<AppState>, Json(req): Json<ActionFeedbackRequest>) -> Json<Value> {
    let ok = req.action_id.as_deref().is_some_and(|id| state.core.pending_actions.feedback(id));
    Json(json!({ "success": ok, "action": req.action }))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueActionInput {
    pub action: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PendingActionsEnqueueRequest {
    pub actions: Vec<EnqueueActionInput>,
}

/// `POST /api/bridge/pending-actions/enqueue { actions: [{action,
/// params}] }` — server-side producers inject actions directly; an
/// `openGraph` is automatically prepended for any `applyMutations` whose
/// `graphId` is not currently active.
pub async fn enqueue_pending_actions(State(state): State<AppState>, Json(req): Json<PendingActionsEnqueueRequest>) -> Json<Value> {
    let active_graph_id = state.core.active_graph_id();
    let mut actions = Vec::new();
    for input in req.actions {
        if input.action == "applyMutations" {
            let target_graph_id = input.params.iter().find_map(|p| p.get("graphId").and_then(Value::as_str));
            if target_graph_id.is_some() && target_graph_id != active_graph_id.as_deref() {
                actions.push(PendingAction::new(
                    Uuid::new_v4().to_string(),
                    "openGraph",
                    vec![json!({ "graphId": target_graph_id })],
                    None,
                ));
            }
        }
        actions.push(PendingAction::new(Uuid::new_v4().to_string(), input.action, input.params, None));
    }
    let count = actions.len();
    state.core.pending_actions.enqueue_many(actions);
    Json(json!({ "success": true, "count": count }))
}
