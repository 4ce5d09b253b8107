//! `/api/bridge/debug/*` — execution-tracer introspection. Read-only windows onto [`Tracer`](redstring_pipeline::tracer::Tracer)
//! state, useful for diagnosing a stuck `cid` without a debugger attached.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use redstring_types::Stage;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// `GET /api/bridge/debug/traces?limit=` — summaries, most recent first.
pub async fn recent_traces(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(50);
    Json(json!({ "traces": state.core.tracer.get_recent_traces(limit) }))
}

/// `GET /api/bridge/debug/trace/:cid` — the full trace.
pub async fn trace_by_cid(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Json<Value>, ApiError> {
    state
        .core
        .tracer
        .get_trace(&cid)
        .map(|trace| Json(serde_json::to_value(trace).unwrap_or(Value::Null)))
        .ok_or_else(|| ApiError::Validation(format!("no trace for cid {cid:?}")))
}

fn parse_stage(raw: &str) -> Option<Stage> {
    match raw.to_ascii_lowercase().as_str() {
        "planner" => Some(Stage::Planner),
        "executor" => Some(Stage::Executor),
        "auditor" => Some(Stage::Auditor),
        "committer" => Some(Stage::Committer),
        _ => None,
    }
}

/// `GET /api/bridge/debug/trace/:cid/stage/:stage` — one stage's record.
pub async fn trace_stage(State(state): State<AppState>, Path((cid, stage)): Path<(String, String)>) -> Result<Json<Value>, ApiError> {
    let stage = parse_stage(&stage).ok_or_else(|| ApiError::Validation(format!("unknown stage {stage:?}")))?;
    state
        .core
        .tracer
        .get_stage(&cid, stage)
        .map(|record| Json(serde_json::to_value(record).unwrap_or(Value::Null)))
        .ok_or_else(|| ApiError::Validation(format!("no {stage:?} record for cid {cid:?}")))
}

/// `GET /api/bridge/debug/stats`.
pub async fn trace_stats(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.core.tracer.get_stats()).unwrap_or(Value::Null))
}
