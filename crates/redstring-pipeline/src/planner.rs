//! Calls the external model and returns a validated intent plan.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use redstring_providers::{call_with_fallback, Provider, ProviderError};
use redstring_types::{ApiConfig, ConversationTurn, GraphSnapshot};

use crate::json_extract::extract_plan_json;

/// The hidden system prompt, domain appendix, and planner prompt, loaded
/// once at startup and never exposed on any response path. `Arc<str>` so cloning the library is cheap and the
/// content is never mutated after load.
#[derive(Clone)]
pub struct PromptLibrary {
    pub hidden_system_prompt: Arc<str>,
    pub domain_appendix: Arc<str>,
    pub planner_prompt: Arc<str>,
}

impl PromptLibrary {
    pub fn system_prompt(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.hidden_system_prompt, self.domain_appendix, self.planner_prompt)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            hidden_system_prompt: Arc::from(
                "You are the Redstring planning model. Respond with a single JSON object describing an intent.",
            ),
            domain_appendix: Arc::from(
                "The domain is a knowledge graph of node prototypes, instances, and edges between them.",
            ),
            planner_prompt: Arc::from(
                "Choose exactly one intent from: qa, create_graph, create_node, analyze, update_node, \
                 delete_node, delete_graph, update_edge, delete_edge, create_edge, bulk_delete, enrich_node, \
                 decompose_goal, define_connections.",
            ),
        }
    }
}

pub struct PlannerContext {
    pub active_graph: Option<GraphSnapshot>,
    pub conversation_history: Vec<ConversationTurn>,
    pub color_palette: Vec<String>,
    pub api_config: ApiConfig,
}

pub struct PlannerInput {
    pub cid: String,
    pub message: String,
    pub api_key: String,
    pub context: PlannerContext,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("all models failed: {0}")]
    AllModelsFailed(#[from] ProviderError),
    #[error("model response contained no extractable JSON")]
    NoJson,
}

/// Planner output: `{ intent, response, ...intent-specific fields }`.
/// Parsed strictly per intent, then dispatched.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Plan {
    Qa {
        response: String,
    },
    CreateGraph {
        response: String,
        graph: GraphMeta,
        #[serde(default, rename = "graphSpec")]
        graph_spec: Option<GraphSpec>,
    },
    CreateNode {
        response: String,
        node: NodeSpec,
        #[serde(default, rename = "graphId")]
        graph_id: Option<String>,
    },
    Analyze {
        response: String,
    },
    UpdateNode {
        response: String,
        #[serde(rename = "nodeName")]
        node_name: String,
        #[serde(default)]
        updates: Value,
    },
    DeleteNode {
        response: String,
        #[serde(rename = "nodeName")]
        node_name: String,
    },
    DeleteGraph {
        response: String,
        #[serde(default, rename = "graphId")]
        graph_id: Option<String>,
        #[serde(default, rename = "graphName")]
        graph_name: Option<String>,
    },
    UpdateEdge {
        response: String,
        source: String,
        target: String,
        #[serde(default)]
        updates: Value,
    },
    DeleteEdge {
        response: String,
        source: String,
        target: String,
    },
    CreateEdge {
        response: String,
        source: String,
        target: String,
        directionality: Directionality,
        #[serde(default, rename = "definitionNode")]
        definition_node: Option<NodeSpec>,
    },
    BulkDelete {
        response: String,
        names: Vec<String>,
    },
    EnrichNode {
        response: String,
        #[serde(rename = "nodeName")]
        node_name: String,
    },
    DecomposeGoal {
        response: String,
        subgoals: Vec<String>,
    },
    DefineConnections {
        response: String,
        edges: Vec<EdgeSpec>,
    },
}

impl Plan {
    pub fn response(&self) -> &str {
        match self {
            Plan::Qa { response }
            | Plan::CreateGraph { response, .. }
            | Plan::CreateNode { response, .. }
            | Plan::Analyze { response }
            | Plan::UpdateNode { response, .. }
            | Plan::DeleteNode { response, .. }
            | Plan::DeleteGraph { response, .. }
            | Plan::UpdateEdge { response, .. }
            | Plan::DeleteEdge { response, .. }
            | Plan::CreateEdge { response, .. }
            | Plan::BulkDelete { response, .. }
            | Plan::EnrichNode { response, .. }
            | Plan::DecomposeGoal { response, .. }
            | Plan::DefineConnections { response, .. } => response,
        }
    }

    pub fn intent_name(&self) -> &'static str {
        match self {
            Plan::Qa { .. } => "qa",
            Plan::CreateGraph { .. } => "create_graph",
            Plan::CreateNode { .. } => "create_node",
            Plan::Analyze { .. } => "analyze",
            Plan::UpdateNode { .. } => "update_node",
            Plan::DeleteNode { .. } => "delete_node",
            Plan::DeleteGraph { .. } => "delete_graph",
            Plan::UpdateEdge { .. } => "update_edge",
            Plan::DeleteEdge { .. } => "delete_edge",
            Plan::CreateEdge { .. } => "create_edge",
            Plan::BulkDelete { .. } => "bulk_delete",
            Plan::EnrichNode { .. } => "enrich_node",
            Plan::DecomposeGoal { .. } => "decompose_goal",
            Plan::DefineConnections { .. } => "define_connections",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphMeta {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default, rename = "layoutAlgorithm")]
    pub layout_algorithm: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub directionality: Directionality,
    #[serde(default, rename = "definitionNode")]
    pub definition_node: Option<NodeSpec>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directionality {
    #[default]
    Unidirectional,
    Bidirectional,
    None,
    Undirected,
    Reverse,
}

impl Directionality {
    /// The UI contract: which endpoint name(s) the arrowhead points
    /// toward.
    pub fn arrows_toward<'a>(&self, source: &'a str, target: &'a str) -> Vec<&'a str> {
        match self {
            Directionality::Unidirectional => vec![target],
            Directionality::Bidirectional => vec![source, target],
            Directionality::None | Directionality::Undirected => vec![],
            Directionality::Reverse => vec![source],
        }
    }
}

/// Falls back to a friendly conversational [`Plan::Qa`] when the model's
/// JSON doesn't parse into a known intent shape.
pub fn parse_plan(value: Value, raw_text: &str) -> Plan {
    match serde_json::from_value::<Plan>(value.clone()) {
        Ok(plan) => plan,
        Err(err) => {
            tracing::debug!(error = %err, "planner response did not match a known intent shape");
            let response = value
                .get("response")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| raw_text.trim().to_string());
            Plan::Qa { response }
        }
    }
}

pub async fn run_planner(provider: &dyn Provider, prompts: &PromptLibrary, ladder: &[&str], input: &PlannerInput) -> Result<Plan, PlannerError> {
    let system_prompt = prompts.system_prompt();
    let user_message = render_user_message(input);

    let completion = call_with_fallback(provider, ladder, &system_prompt, &user_message, &input.api_key).await?;

    let extracted = extract_plan_json(&completion.text).ok_or(PlannerError::NoJson)?;
    let mut plan = parse_plan(extracted.value.clone(), &completion.text);

    if let Some(preamble) = extracted.preamble {
        prepend_preamble(&mut plan, &preamble);
    }

    Ok(plan)
}

fn prepend_preamble(plan: &mut Plan, preamble: &str) {
    let response = match plan {
        Plan::Qa { response }
        | Plan::CreateGraph { response, .. }
        | Plan::CreateNode { response, .. }
        | Plan::Analyze { response }
        | Plan::UpdateNode { response, .. }
        | Plan::DeleteNode { response, .. }
        | Plan::DeleteGraph { response, .. }
        | Plan::UpdateEdge { response, .. }
        | Plan::DeleteEdge { response, .. }
        | Plan::CreateEdge { response, .. }
        | Plan::BulkDelete { response, .. }
        | Plan::EnrichNode { response, .. }
        | Plan::DecomposeGoal { response, .. }
        | Plan::DefineConnections { response, .. } => response,
    };
    if !response.contains(preamble) {
        *response = format!("{preamble}\n\n{response}");
    }
}

fn render_user_message(input: &PlannerInput) -> String {
    let graph = input
        .context
        .active_graph
        .as_ref()
        .map(|g| format!("active graph {:?} with {} nodes: {:?}", g.name, g.node_count, g.node_names))
        .unwrap_or_else(|| "no active graph".to_string());
    let history: Vec<String> = input
        .context
        .conversation_history
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect();
    format!(
        "cid: {}\nmessage: {}\ncontext: {}\ncolors in use: {:?}\nprior turns: {:?}",
        input.cid, input.message, graph, input.context.color_palette, history
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_create_graph_intent() {
        let value = json!({"intent": "create_graph", "response": "ok", "graph": {"name": "Solar System"}});
        let plan = parse_plan(value, "");
        assert_eq!(plan.intent_name(), "create_graph");
    }

    #[test]
    fn unknown_intent_falls_back_to_qa() {
        let value = json!({"intent": "teleport", "response": "can't do that"});
        let plan = parse_plan(value, "raw");
        assert_eq!(plan.intent_name(), "qa");
        assert_eq!(plan.response(), "can't do that");
    }

    #[test]
    fn directionality_maps_per_ui_contract() {
        assert_eq!(Directionality::Unidirectional.arrows_toward("a", "b"), vec!["b"]);
        assert_eq!(Directionality::Bidirectional.arrows_toward("a", "b"), vec!["a", "b"]);
        assert_eq!(Directionality::None.arrows_toward("a", "b"), Vec::<&str>::new());
        assert_eq!(Directionality::Reverse.arrows_toward("a", "b"), vec!["a"]);
    }
}
