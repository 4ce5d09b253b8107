//! `GET /healthz` and the optional `GET /metrics`, trimmed to the fields
//! this core actually has.

use std::fmt::Write as _;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use redstring_queue::manager::QueueName;

use crate::state::AppState;

/// `GET /healthz`.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ready": true,
        "uptimeMs": state.core.uptime_ms(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /metrics`, gated by `REDSTRING_METRICS=1` at the router level.
/// Plain-text exposition of the per-queue counters;
/// no Prometheus client pulled in solely for this.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let mut body = String::new();
    for (label, name) in [
        ("goalQueue", QueueName::Goal),
        ("taskQueue", QueueName::Task),
        ("patchQueue", QueueName::Patch),
        ("reviewQueue", QueueName::Review),
    ] {
        let metrics = state.core.queues.metrics(name).await;
        let _ = writeln!(body, "queue_depth{{queue=\"{label}\"}} {}", metrics.depth);
        let _ = writeln!(body, "queue_done_total{{queue=\"{label}\"}} {}", metrics.done);
        let _ = writeln!(body, "queue_failed_total{{queue=\"{label}\"}} {}", metrics.failed);
    }
    let _ = writeln!(body, "pending_actions {}", state.core.pending_actions.len());

    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body).into_response()
}
