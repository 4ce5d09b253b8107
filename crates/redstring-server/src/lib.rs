//! HTTP surface for the Redstring agent core:
//! agent/chat endpoints, bridge state, pending-action broker, queue/dev
//! tooling, SSE streams, debug/trace introspection, and the MCP shim.
//! `serve(addr, state)` is the entry point: it spawns background loops
//! alongside the axum server and aborts them on graceful shutdown.

pub mod agent;
pub mod bridge;
pub mod debug;
pub mod error;
pub mod events;
pub mod health;
pub mod mcp;
pub mod queue_routes;
pub mod scheduler;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use state::AppState;

fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let mut router = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/bridge/state", get(bridge::get_bridge_state).post(bridge::push_bridge_state))
        .route("/api/bridge/pending-actions", get(bridge::pull_pending_actions))
        .route("/api/bridge/action-completed", post(bridge::action_completed))
        .route("/api/bridge/action-started", post(bridge::action_started))
        .route("/api/bridge/action-feedback", post(bridge::action_feedback))
        .route("/api/bridge/pending-actions/enqueue", post(bridge::enqueue_pending_actions))
        .route("/api/bridge/debug/traces", get(debug::recent_traces))
        .route("/api/bridge/debug/trace/{cid}", get(debug::trace_by_cid))
        .route("/api/bridge/debug/trace/{cid}/stage/{stage}", get(debug::trace_stage))
        .route("/api/bridge/debug/stats", get(debug::trace_stats))
        .route("/api/ai/agent", post(agent::agent))
        .route("/api/ai/agent/continue", post(agent::continue_agent))
        .route("/api/ai/agent/audit", post(agent::audit_agent))
        .route("/api/ai/chat", post(agent::chat))
        .route("/api/mcp/request", post(mcp::mcp_request))
        .route("/events/stream", get(events::events_stream))
        .route("/telemetry/stream", get(events::telemetry_stream))
        .route("/queue/goals.enqueue", post(queue_routes::goals_enqueue))
        .route("/queue/tasks.pull", post(queue_routes::tasks_pull))
        .route("/queue/patches.submit", post(queue_routes::patches_submit))
        .route("/queue/reviews.pull", post(queue_routes::reviews_pull))
        .route("/queue/reviews.submit", post(queue_routes::reviews_submit))
        .route("/queue/patches.approve-next", post(queue_routes::patches_approve_next))
        .route("/queue/metrics", get(queue_routes::queue_metrics))
        .route("/queue/peek", get(queue_routes::queue_peek))
        .route("/test/create-task", post(queue_routes::test_create_task))
        .route("/test/commit-ops", post(queue_routes::test_commit_ops));

    if state.core.config.metrics_enabled {
        router = router.route("/metrics", get(health::metrics));
    }

    router.layer(cors).with_state(state)
}

/// Boots the Scheduler's cadence-driven tick loop and, when
/// `REDSTRING_ACTION_LEASE_TTL_MS` is set, the pending-action lease
/// reaper. Both are plain `tokio::spawn`ed loops, aborted by [`serve`]
/// on shutdown.
fn spawn_background_tasks(state: AppState) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    let cadence = Duration::from_millis(state.core.config.scheduler_cadence_ms);
    let scheduler_state = state.clone();
    handles.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(cadence);
        loop {
            interval.tick().await;
            scheduler_state.scheduler.tick().await;
        }
    }));

    if let Some(ttl_ms) = state.core.config.action_lease_ttl_ms {
        let reaper_state = state.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(ttl_ms.max(1_000)));
            loop {
                interval.tick().await;
                let reaped = reaper_state.core.pending_actions.reap_expired_leases(ttl_ms);
                if reaped > 0 {
                    tracing::debug!(reaped, "reclaimed expired pending-action leases");
                }
            }
        }));
    }

    handles
}

/// Binds `addr` and serves the router until `Ctrl+C`/`SIGTERM`. Retries
/// on `AddrInUse` up to 3 times, 500ms apart.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state.clone());
    let handles = spawn_background_tasks(state);

    let mut attempt = 0;
    let listener = loop {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => break listener,
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && attempt < 3 => {
                attempt += 1;
                tracing::warn!(attempt, %addr, "port in use, retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(err) => {
                for handle in &handles {
                    handle.abort();
                }
                return Err(err.into());
            }
        }
    };

    tracing::info!(%addr, "redstring agent core listening");
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await;

    for handle in &handles {
        handle.abort();
    }
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use redstring_core::Core;
    use redstring_providers::{Provider, ProviderError};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    /// Returns a scripted JSON completion for every model call, ignoring
    /// which model/system-prompt it was asked for — exactly the seam
    /// the Planner calls through.
    struct ScriptedProvider {
        response: String,
    }

    impl ScriptedProvider {
        fn new(response: impl Into<String>) -> Self {
            Self { response: response.into() }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _system_prompt: &str, _user_message: &str, _model: &str, _api_key: &str) -> Result<String, ProviderError> {
            Ok(self.response.clone())
        }
    }

    async fn test_state(provider_response: &str) -> AppState {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = redstring_core::EngineConfig::from_env();
        config.state_dir = tmp.path().join("state");
        let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(provider_response));
        let core = Core::bootstrap(config, provider).await.expect("core bootstrap");
        AppState::new(core)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", "Bearer test-key")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    /// Scenario S1: a planner that returns `create_graph`
    /// enqueues exactly one goal and echoes a single queued tool call.
    #[tokio::test]
    async fn s1_create_empty_graph_enqueues_one_goal() {
        let plan = json!({
            "intent": "create_graph",
            "graph": { "name": "Solar System" },
            "response": "Creating Solar System.",
        });
        let state = test_state(&plan.to_string()).await;
        let app = app_router(state);

        let req = post(
            "/api/ai/agent",
            json!({ "message": "create a graph called \"Solar System\"", "cid": "c1" }),
        );
        let resp = app.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["cid"], "c1");
        assert!(body["goalId"].is_string());
        let tool_calls = body["toolCalls"].as_array().unwrap();
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0]["name"], "create_graph");
        assert_eq!(tool_calls[0]["status"], "queued");
        assert_eq!(tool_calls[0]["args"]["graphName"], "Solar System");
    }

    /// Scenario S2: a populated `graphSpec` produces a two-task DAG
    /// (`create_populated_graph` + `define_connections`) tagged agentic.
    #[tokio::test]
    async fn s2_populated_graph_produces_two_tool_calls() {
        let plan = json!({
            "intent": "create_graph",
            "graph": { "name": "Planets" },
            "graphSpec": {
                "nodes": [
                    { "name": "Sun", "color": "#FDB813" },
                    { "name": "Earth", "color": "#4A90E2" },
                ],
                "edges": [
                    { "source": "Sun", "target": "Earth", "directionality": "unidirectional", "definitionNode": { "name": "Orbits" } },
                ],
                "layoutAlgorithm": "radial",
            },
            "response": "Creating Planets.",
        });
        let state = test_state(&plan.to_string()).await;
        let app = app_router(state);

        let req = post("/api/ai/agent", json!({ "message": "create a populated graph", "cid": "c2" }));
        let resp = app.oneshot(req).await.expect("response");
        let body = json_body(resp).await;

        let tool_calls = body["toolCalls"].as_array().unwrap();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0]["name"], "create_populated_graph");
        assert_eq!(tool_calls[1]["name"], "define_connections");
    }

    /// Missing bearer token on `/api/ai/agent` is a 401 validation error,
    /// and the response body never contains the hidden system prompt
    /// text.
    #[tokio::test]
    async fn agent_without_bearer_token_is_unauthorized_and_never_leaks_the_prompt() {
        let state = test_state("{}").await;
        let hidden_prompt = state.core.prompt_library().hidden_system_prompt.to_string();
        let app = app_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/api/ai/agent")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": "hi" }).to_string()))
            .expect("request");
        let resp = app.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(!text.contains(hidden_prompt.as_str()));
    }

    /// Scenario S6: two concurrent `GET /api/bridge/pending-actions`
    /// calls over a pool of 3 actions return disjoint sets whose union is
    /// everything; each is released by `action-completed`.
    #[tokio::test]
    async fn s6_pending_action_leases_are_disjoint_across_concurrent_pulls() {
        let state = test_state("{}").await;
        state.core.pending_actions.enqueue_many(vec![
            redstring_types::PendingAction::new(Uuid::new_v4().to_string(), "openGraph", vec![json!({"graphId": "a"})], None),
            redstring_types::PendingAction::new(Uuid::new_v4().to_string(), "openGraph", vec![json!({"graphId": "b"})], None),
            redstring_types::PendingAction::new(Uuid::new_v4().to_string(), "openGraph", vec![json!({"graphId": "c"})], None),
        ]);

        let app_a = app_router(state.clone());
        let app_b = app_router(state.clone());
        let req_a = Request::builder().uri("/api/bridge/pending-actions").body(Body::empty()).unwrap();
        let req_b = Request::builder().uri("/api/bridge/pending-actions").body(Body::empty()).unwrap();
        let (resp_a, resp_b) = tokio::join!(app_a.oneshot(req_a), app_b.oneshot(req_b));
        let body_a = json_body(resp_a.unwrap()).await;
        let body_b = json_body(resp_b.unwrap()).await;

        let ids_a: std::collections::HashSet<String> = body_a["actions"].as_array().unwrap().iter().map(|a| a["id"].as_str().unwrap().to_string()).collect();
        let ids_b: std::collections::HashSet<String> = body_b["actions"].as_array().unwrap().iter().map(|a| a["id"].as_str().unwrap().to_string()).collect();

        assert!(ids_a.is_disjoint(&ids_b));
        assert_eq!(ids_a.len() + ids_b.len(), 3);

        let app = app_router(state);
        for id in ids_a.iter().chain(ids_b.iter()) {
            let req = post("/api/bridge/action-completed", json!({ "actionId": id }));
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let req = Request::builder().uri("/api/bridge/pending-actions").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = json_body(resp).await;
        assert!(body["actions"].as_array().unwrap().is_empty());
    }
}
