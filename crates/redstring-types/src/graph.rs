use serde::{Deserialize, Serialize};

pub const MAX_CONTEXT_NODE_NAMES: usize = 15;

/// The active-graph snapshot handed to the Planner as context, and the `graphState` shape posted back into the continuation
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub graph_id: Option<String>,
    pub name: Option<String>,
    pub node_names: Vec<String>,
    pub node_count: usize,
    pub edge_count: usize,
}

impl GraphSnapshot {
    pub fn truncated(
        graph_id: Option<String>,
        name: Option<String>,
        all_node_names: &[String],
        edge_count: usize,
    ) -> Self {
        let node_count = all_node_names.len();
        let node_names = all_node_names
            .iter()
            .take(MAX_CONTEXT_NODE_NAMES)
            .cloned()
            .collect();
        Self {
            graph_id,
            name,
            node_names,
            node_count,
            edge_count,
        }
    }
}

/// One turn of prior conversation, truncated to the last three by callers
///.C4 ("prior conversation turns (last ≤ 3)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

pub fn last_turns(history: &[ConversationTurn], max: usize) -> Vec<ConversationTurn> {
    let start = history.len().saturating_sub(max);
    history[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_caps_node_names_but_keeps_full_count() {
        let names: Vec<String> = (0..20).map(|i| format!("node-{i}")).collect();
        let snapshot = GraphSnapshot::truncated(Some("g1".to_string()), None, &names, 5);
        assert_eq!(snapshot.node_names.len(), MAX_CONTEXT_NODE_NAMES);
        assert_eq!(snapshot.node_count, 20);
    }

    #[test]
    fn last_turns_keeps_most_recent() {
        let history: Vec<ConversationTurn> = (0..5)
            .map(|i| ConversationTurn {
                role: "user".to_string(),
                content: format!("turn {i}"),
            })
            .collect();
        let kept = last_turns(&history, 3);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].content, "turn 2");
        assert_eq!(kept[2].content, "turn 4");
    }
}
