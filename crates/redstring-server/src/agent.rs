//! `/api/ai/*` — primary agent entry, continuation loop, audit trigger,
//! and the plain chat pass-through.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use redstring_pipeline::continuation::{
    apply_evaluation_decision, check_early_termination, ContinueOutcome, ContinueRequest, EvaluationDecision, MAX_PHASES,
};
use redstring_pipeline::executor::{dispatch, DispatchContext, ExecutorOutcome};
use redstring_pipeline::graph_index::GraphIndex;
use redstring_pipeline::planner::{run_planner, Plan, PlannerContext, PlannerError, PlannerInput};
use redstring_types::{ApiConfig, ConversationTurn, Dag, Event, Goal, GoalMeta, GraphSnapshot, Stage, StageStatus, Task};

use crate::error::ApiError;
use crate::state::AppState;

fn bearer_api_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::Unauthorized)
}

fn default_api_config() -> ApiConfig {
    ApiConfig {
        provider: "anthropic".to_string(),
        model: "claude-3-5-sonnet".to_string(),
        fallback_models: Vec::new(),
    }
}

fn build_graph_index(state: &AppState) -> GraphIndex {
    let view = state.core.bridge_state_view();
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

fn color_palette(state: &AppState) -> Vec<String> {
    state
        .core
        .bridge_state_view()
        .node_prototypes
        .values()
        .filter_map(|v| v.get("color").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

async fn call_planner(state: &AppState, cid: &str, message: &str, api_key: &str, api_config: &ApiConfig, history: &[ConversationTurn]) -> Result<Plan, PlannerError> {
    let _permit = state.scheduler.planner_throttle.handle().acquire_owned().await.expect("planner semaphore never closes");
    let ladder = api_config.model_ladder(&state.core.config.default_fallback_models);
    let input = PlannerInput {
        cid: cid.to_string(),
        message: message.to_string(),
        api_key: api_key.to_string(),
        context: PlannerContext {
            active_graph: state.core.bridge_state.read().active_graph_snapshot(),
            conversation_history: history.to_vec(),
            color_palette: color_palette(state),
            api_config: api_config.clone(),
        },
    };
    run_planner(state.core.provider.as_ref(), &state.core.prompt_library(), &ladder, &input).await
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    #[serde(default)]
    pub api_config: Option<ApiConfig>,
    #[serde(default)]
    pub is_test: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub message: String,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub context: Option<AgentContext>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub status: &'static str,
    pub args: Value,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub success: bool,
    pub response: String,
    pub tool_calls: Vec<ToolCall>,
    pub cid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
}

/// `POST /api/ai/agent`. A `decompose_goal`
/// plan recurses in-process, bounded by [`MAX_PHASES`] as a runaway backstop.
pub async fn agent(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<AgentRequest>) -> Result<Json<AgentResponse>, ApiError> {
    let api_key = bearer_api_key(&headers)?;
    let cid = req.cid.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = req.context.unwrap_or_default();
    let api_config = ctx.api_config.unwrap_or_else(default_api_config);
    let history = redstring_pipeline::last_conversation_turns(&req.conversation_history);
    let is_test = ctx.is_test;

    state.core.tracer.start_trace(&cid, &req.message, None);

    let mut message = req.message.clone();
    let mut chained_subgoals: Vec<String> = Vec::new();
    let mut hops = 0u32;

    let (plan, outcome) = loop {
        hops += 1;
        state.core.tracer.record_stage(&cid, Stage::Planner, None);
        let plan = match call_planner(&state, &cid, &message, &api_key, &api_config, &history).await {
            Ok(plan) => {
                state.core.tracer.complete_stage(&cid, Stage::Planner, StageStatus::Success, Some(json!({ "intent": plan.intent_name() })));
                plan
            }
            Err(err) => {
                state.core.tracer.complete_stage(&cid, Stage::Planner, StageStatus::Error, Some(json!({ "error": err.to_string() })));
                return Err(ApiError::ModelFailure("the model provider could not produce a plan".to_string()));
            }
        };

        state.core.tracer.record_stage(&cid, Stage::Executor, None);
        let index = build_graph_index(&state);
        let dctx = DispatchContext {
            cid: cid.clone(),
            index: &index,
            api_key: Some(api_key.clone()),
            api_config: Some(api_config.clone()),
            original_message: req.message.clone(),
            conversation_history: history.clone(),
        };
        match dispatch(&plan, &dctx) {
            ExecutorOutcome::Recurse { next_message, remaining_subgoals } if hops < MAX_PHASES => {
                message = next_message;
                chained_subgoals = remaining_subgoals;
                continue;
            }
            other => break (plan, other),
        }
    };

    match outcome {
        ExecutorOutcome::Respond(response) => {
            state.core.tracer.complete_stage(&cid, Stage::Executor, StageStatus::Success, None);
            Ok(Json(AgentResponse {
                success: true,
                response,
                tool_calls: Vec::new(),
                cid,
                goal_id: None,
            }))
        }
        ExecutorOutcome::Enqueue(mut goal) => {
            if !chained_subgoals.is_empty() {
                goal.meta.chain_state = Some(json!({ "remainingSubgoals": chained_subgoals }));
            }
            let tool_calls = goal
                .dag
                .tasks
                .iter()
                .map(|task| ToolCall {
                    name: task.tool_name.clone(),
                    status: "queued",
                    args: task.args.clone(),
                })
                .collect();

            state.core.queues.enqueue(redstring_queue::manager::QueueName::Goal, "goal", cid.clone(), serde_json::to_value(&goal).unwrap_or(Value::Null)).await;
            state.core.events.append(Event::new("GOAL_ENQUEUED", json!({ "goal": goal.goal, "goalId": goal.id, "cid": cid, "isTest": is_test })));
            state.core.tracer.complete_stage(&cid, Stage::Executor, StageStatus::Success, Some(json!({ "goalId": goal.id })));

            Ok(Json(AgentResponse {
                success: true,
                response: plan.response().to_string(),
                tool_calls,
                cid,
                goal_id: Some(goal.id),
            }))
        }
        ExecutorOutcome::Recurse { .. } => {
            // MAX_PHASES exhausted mid-recursion; surface what we have rather than loop forever.
            state.core.tracer.complete_stage(&cid, Stage::Executor, StageStatus::Error, Some(json!({ "reason": "decomposition_phase_cap" })));
            Ok(Json(AgentResponse {
                success: true,
                response: plan.response().to_string(),
                tool_calls: Vec::new(),
                cid,
                goal_id: None,
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequestBody {
    pub cid: String,
    #[serde(default)]
    pub last_action: Option<String>,
    pub graph_state: GraphSnapshot,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub read_result: Option<Value>,
    #[serde(default)]
    pub remaining_subgoals: Vec<String>,
    #[serde(default)]
    pub api_config: Option<ApiConfig>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default)]
    pub original_message: Option<String>,
}

/// Calls a dedicated evaluation prompt for continuation step 4. A distinct system-prompt addendum, same model ladder as the
/// main Planner call.
async fn evaluate_continuation(state: &AppState, req: &ContinueRequestBody, api_key: &str, api_config: &ApiConfig) -> Result<EvaluationDecision, ApiError> {
    let ladder = api_config.model_ladder(&state.core.config.default_fallback_models);
    let system_prompt = format!(
        "{}\n\nYou are deciding whether to continue expanding a graph across another phase. Respond with JSON: {{\"decision\": \"continue\"|\"complete\", \"response\": string}}.",
        state.core.prompt_library().hidden_system_prompt
    );
    let user_message = format!(
        "cid: {}\niteration: {}\nlastAction: {:?}\ngraphState: {} nodes, {} edges\nreadResult: {:?}",
        req.cid, req.iteration, req.last_action, req.graph_state.node_count, req.graph_state.edge_count, req.read_result
    );
    let completion = redstring_providers::call_with_fallback(state.core.provider.as_ref(), &ladder, &system_prompt, &user_message, api_key)
        .await
        .map_err(|err| ApiError::ModelFailure(err.to_string()))?;

    let extracted = redstring_pipeline::json_extract::extract_plan_json(&completion.text).ok_or_else(|| ApiError::ModelFailure("no extractable evaluation decision".to_string()))?;
    match extracted.value.get("decision").and_then(Value::as_str) {
        Some("complete") => Ok(EvaluationDecision::Complete),
        _ => Ok(EvaluationDecision::Continue),
    }
}

/// `POST /api/ai/agent/continue`. Thin HTTP
/// wrapper over [`run_continuation`], which is also the re-invocation
/// point the Committer calls in-process after `action-completed` —
/// bypassing HTTP the same way the decompose-goal self-recursion does.
pub async fn continue_agent(State(state): State<AppState>, Json(req): Json<ContinueRequestBody>) -> Result<Json<Value>, ApiError> {
    run_continuation(&state, req).await.map(Json)
}

pub async fn run_continuation(state: &AppState, req: ContinueRequestBody) -> Result<Value, ApiError> {
    let early = check_early_termination(&ContinueRequest {
        cid: req.cid.clone(),
        graph_state: req.graph_state.clone(),
        iteration: req.iteration,
        remaining_subgoals: req.remaining_subgoals.clone(),
    });

    match early {
        ContinueOutcome::Recurse { next_message, remaining_subgoals } => {
            let api_key = req.api_key.clone().ok_or(ApiError::Unauthorized)?;
            let api_config = req.api_config.clone().unwrap_or_else(default_api_config);
            let history = redstring_pipeline::last_conversation_turns(&req.conversation_history);
            let plan = call_planner(state, &req.cid, &next_message, &api_key, &api_config, &history)
                .await
                .map_err(|err| ApiError::ModelFailure(err.to_string()))?;
            let index = build_graph_index(state);
            let dctx = DispatchContext {
                cid: req.cid.clone(),
                index: &index,
                api_key: Some(api_key),
                api_config: Some(api_config),
                original_message: req.original_message.clone().unwrap_or_default(),
                conversation_history: history,
            };
            let goal_id = match dispatch(&plan, &dctx) {
                ExecutorOutcome::Enqueue(mut goal) => {
                    if !remaining_subgoals.is_empty() {
                        goal.meta.chain_state = Some(json!({ "remainingSubgoals": remaining_subgoals }));
                    }
                    let id = goal.id.clone();
                    state.core.queues.enqueue(redstring_queue::manager::QueueName::Goal, "goal", req.cid.clone(), serde_json::to_value(&goal).unwrap_or(Value::Null)).await;
                    state.core.events.append(Event::new("GOAL_ENQUEUED", json!({ "goal": goal.goal, "goalId": id, "cid": req.cid })));
                    Some(id)
                }
                _ => None,
            };
            Ok(json!({ "success": true, "completed": false, "goalId": goal_id }))
        }
        ContinueOutcome::CompletedPhasesExhausted => Ok(json!({
            "success": true,
            "completed": true,
            "reason": "phases_complete",
            "response": format!("Stopping after {} phases.", MAX_PHASES),
        })),
        ContinueOutcome::CompletedNodeLimit => Ok(json!({
            "success": true,
            "completed": true,
            "reason": "node_limit",
            "response": format!("Stopping: the graph reached {} nodes.", req.graph_state.node_count),
        })),
        ContinueOutcome::NeedsEvaluation => {
            let api_key = req.api_key.clone().ok_or(ApiError::Unauthorized)?;
            let api_config = req.api_config.clone().unwrap_or_else(default_api_config);
            let decision = evaluate_continuation(state, &req, &api_key, &api_config).await?;
            let result = apply_evaluation_decision(decision.clone(), req.iteration);

            if result.completed {
                return Ok(json!({ "success": true, "completed": true }));
            }

            let next_iteration = result.next_iteration.unwrap_or(req.iteration + 1);
            let goal = Goal {
                id: Uuid::new_v4().to_string(),
                goal: "create_subgraph".to_string(),
                dag: Dag {
                    tasks: vec![
                        Task {
                            tool_name: "create_subgraph".to_string(),
                            args: json!({ "graphId": req.graph_state.graph_id }),
                            thread_id: req.cid.clone(),
                            depends_on: None,
                        },
                        Task {
                            tool_name: "define_connections".to_string(),
                            args: json!({ "graphId": req.graph_state.graph_id, "edges": [] }),
                            thread_id: req.cid.clone(),
                            depends_on: Some(vec!["create_subgraph".to_string()]),
                        },
                    ],
                },
                thread_id: req.cid.clone(),
                meta: GoalMeta {
                    iteration: next_iteration,
                    agentic_loop: true,
                    api_key: Some(api_key),
                    api_config: Some(api_config),
                    original_message: req.original_message.clone(),
                    conversation_history: redstring_pipeline::last_conversation_turns(&req.conversation_history),
                    chain_state: None,
                },
            };
            let goal_id = goal.id.clone();
            state.core.queues.enqueue(redstring_queue::manager::QueueName::Goal, "goal", req.cid.clone(), serde_json::to_value(&goal).unwrap_or(Value::Null)).await;
            state.core.events.append(Event::new("GOAL_ENQUEUED", json!({ "goal": goal.goal, "goalId": goal_id, "cid": req.cid })));
            Ok(json!({ "success": true, "completed": false, "goalId": goal_id, "iteration": next_iteration }))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub cid: String,
    pub graph_id: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub action: String,
}

/// `POST /api/ai/agent/audit` — enqueues an `audit_graph` goal.
pub async fn audit_agent(State(state): State<AppState>, Json(req): Json<AuditRequest>) -> Result<Json<Value>, ApiError> {
    let goal = Goal {
        id: Uuid::new_v4().to_string(),
        goal: "audit_graph".to_string(),
        dag: Dag {
            tasks: vec![Task {
                tool_name: "audit_graph".to_string(),
                args: json!({ "graphId": req.graph_id, "nodeCount": req.node_count, "edgeCount": req.edge_count, "action": req.action }),
                thread_id: req.cid.clone(),
                depends_on: None,
            }],
        },
        thread_id: req.cid.clone(),
        meta: GoalMeta::default(),
    };
    let goal_id = goal.id.clone();
    state.core.queues.enqueue(redstring_queue::manager::QueueName::Goal, "goal", req.cid.clone(), serde_json::to_value(&goal).unwrap_or(Value::Null)).await;
    state.core.events.append(Event::new("GOAL_ENQUEUED", json!({ "goal": "audit_graph", "goalId": goal_id, "cid": req.cid })));
    Ok(Json(json!({ "success": true, "goalId": goal_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub cid: Option<String>,
}

/// `POST /api/ai/chat` — single-turn pass-through, no mutation.
pub async fn chat(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ChatRequest>) -> Result<Json<Value>, ApiError> {
    let api_key = bearer_api_key(&headers)?;
    let cid = req.cid.unwrap_or_else(|| Uuid::new_v4().to_string());
    let ladder = vec!["claude-3-5-haiku"];
    let completion = redstring_providers::call_with_fallback(state.core.provider.as_ref(), &ladder, &state.core.prompt_library().hidden_system_prompt, &req.message, &api_key)
        .await
        .map_err(|err| ApiError::ModelFailure(err.to_string()))?;

    state.core.events.append(Event::new("CHAT", json!({ "cid": cid, "message": req.message, "response": completion.text })));
    Ok(Json(json!({ "success": true, "response": completion.text, "cid": cid })))
}
