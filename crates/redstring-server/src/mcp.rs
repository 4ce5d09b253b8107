//! `POST /api/mcp/request` — a minimal JSON-RPC 2.0 shim exposing the
//! projected bridge state as a handful of read-only MCP tools. This core does not run an MCP client/server pair of
//! its own; it only speaks the wire protocol far enough for an external
//! MCP-aware client to query graph state.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn rpc_error(id: Option<Value>, code: i64, message: impl Into<String>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    }))
}

fn rpc_result(id: Option<Value>, result: Value) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn tool_schemas() -> Value {
    json!([
        {
            "name": "verify_state",
            "description": "Checks whether a graphId is present in the current projected bridge state.",
            "inputSchema": { "type": "object", "properties": { "graphId": { "type": "string" } }, "required": ["graphId"] },
        },
        {
            "name": "list_available_graphs",
            "description": "Lists every graph id currently known to the projected bridge state.",
            "inputSchema": { "type": "object", "properties": {} },
        },
        {
            "name": "search_nodes",
            "description": "Case-insensitive substring search over node prototype names.",
            "inputSchema": { "type": "object", "properties": { "query": { "type": "string" } }, "required": ["query"] },
        },
    ])
}

fn call_tool(state: &AppState, name: &str, params: &Value) -> Result<Value, (i64, String)> {
    match name {
        "verify_state" => {
            let graph_id = params.get("graphId").and_then(Value::as_str).ok_or((INVALID_PARAMS, "missing graphId".to_string()))?;
            let view = state.core.bridge_state_view();
            Ok(json!({ "exists": view.graphs.contains_key(graph_id) }))
        }
        "list_available_graphs" => {
            let view = state.core.bridge_state_view();
            Ok(json!({ "graphIds": view.graphs.keys().cloned().collect::<Vec<_>>() }))
        }
        "search_nodes" => {
            let query = params.get("query").and_then(Value::as_str).ok_or((INVALID_PARAMS, "missing query".to_string()))?;
            if query.trim().is_empty() {
                return Err((INTERNAL_ERROR, "query must not be blank".to_string()));
            }
            let needle = query.to_lowercase();
            let view = state.core.bridge_state_view();
            let matches: Vec<Value> = view
                .node_prototypes
                .iter()
                .filter(|(_, proto)| {
                    proto
                        .get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
                })
                .map(|(id, proto)| json!({ "id": id, "name": proto.get("name") }))
                .collect();
            Ok(json!({ "matches": matches }))
        }
        other => Err((METHOD_NOT_FOUND, format!("unknown tool {other:?}"))),
    }
}

/// `POST /api/mcp/request`.
pub async fn mcp_request(State(state): State<AppState>, Json(req): Json<JsonRpcRequest>) -> Json<Value> {
    match req.method.as_str() {
        "initialize" => rpc_result(
            req.id,
            json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": { "name": "redstring-core", "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
            }),
        ),
        "tools/list" => rpc_result(req.id, json!({ "tools": tool_schemas() })),
        "tools/call" => {
            let Some(name) = req.params.get("name").and_then(Value::as_str) else {
                return rpc_error(req.id, INVALID_PARAMS, "missing tool name");
            };
            let params = req.params.get("arguments").cloned().unwrap_or(json!({}));
            match call_tool(&state, name, &params) {
                Ok(result) => rpc_result(req.id, json!({ "content": [{ "type": "text", "text": result.to_string() }] })),
                Err((code, message)) => rpc_error(req.id, code, message),
            }
        }
        other => rpc_error(req.id, METHOD_NOT_FOUND, format!("unknown method {other:?}")),
    }
}
