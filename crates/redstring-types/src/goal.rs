use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ApiConfig;
use crate::graph::ConversationTurn;

/// `thread_id` defaults to the owning conversation's
/// `cid`; `meta` carries the stateless-on-the-network context the Planner
/// and continuation loop need to resume without server-side session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub goal: String,
    pub dag: Dag,
    pub thread_id: String,
    pub meta: GoalMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Dag {
    pub tasks: Vec<Task>,
}

/// `depends_on` references sibling tasks by `toolName`,
/// not by an opaque id — tool names are unique within one goal's DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub tool_name: String,
    pub args: Value,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoalMeta {
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub agentic_loop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_config: Option<ApiConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_state: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_depends_on_omitted_when_absent() {
        let task = Task {
            tool_name: "addNodePrototype".to_string(),
            args: Value::Null,
            thread_id: "cid-1".to_string(),
            depends_on: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("dependsOn").is_none());
    }
}
