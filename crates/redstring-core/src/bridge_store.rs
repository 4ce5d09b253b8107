//! The projected bridge-state mirror between the UI and this core. The
//! UI owns the authoritative graph data; this core only keeps a merged
//! projection good enough to answer Planner context queries and resolve
//! names for the Executor/Auditor. Graph bodies are kept as opaque
//! [`serde_json::Value`] objects — this core never interprets their
//! shape beyond the few normalized fields it names, and never defines
//! its own storage format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use redstring_types::GraphSnapshot;

/// Body of `POST /api/bridge/state`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatePush {
    #[serde(default)]
    pub graphs: HashMap<String, Value>,
    #[serde(default)]
    pub node_prototypes: HashMap<String, Value>,
    #[serde(default)]
    pub active_graph_id: Option<String>,
    #[serde(default)]
    pub open_graph_ids: Vec<String>,
    #[serde(default)]
    pub graph_layouts: HashMap<String, Value>,
    #[serde(default)]
    pub graph_summaries: HashMap<String, Value>,
    /// Flat list the UI sends; normalized per-graph into `edges` on merge.
    #[serde(default)]
    pub graph_edges: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStateView {
    pub graphs: HashMap<String, Value>,
    pub node_prototypes: HashMap<String, Value>,
    pub active_graph_id: Option<String>,
    pub open_graph_ids: Vec<String>,
    pub graph_layouts: HashMap<String, Value>,
    pub graph_summaries: HashMap<String, Value>,
}

/// A graph id/name is a "test marker" when it would pollute the
/// projection across unrelated pushes: the id contains `"test"` or
/// `"itm-"`, or the `name` field contains `"test"`. Test-marked graphs
/// are preserved across merges rather than dropped when a newer push
/// omits them, so scenario harnesses keep their fixtures alive.
fn is_test_marker(id: &str, value: &Value) -> bool {
    let id_lower = id.to_lowercase();
    if id_lower.contains("test") || id_lower.contains("itm-") {
        return true;
    }
    value
        .get("name")
        .and_then(Value::as_str)
        .map(|name| name.to_lowercase().contains("test"))
        .unwrap_or(false)
}

#[derive(Default)]
pub struct BridgeState {
    graphs: HashMap<String, Value>,
    node_prototypes: HashMap<String, Value>,
    active_graph_id: Option<String>,
    open_graph_ids: Vec<String>,
    graph_layouts: HashMap<String, Value>,
    graph_summaries: HashMap<String, Value>,
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an incoming push: incoming graphs replace
    /// those sharing an id; test-marked graphs already present survive
    /// even when the incoming push doesn't mention them; `graphEdges[]`
    /// is normalized into each graph's `edges` map and every graph is
    /// guaranteed an `instances` object.
    pub fn merge(&mut self, push: BridgeStatePush) {
        let mut next_graphs = HashMap::new();
        for (id, value) in &self.graphs {
            if is_test_marker(id, value) && !push.graphs.contains_key(id) {
                next_graphs.insert(id.clone(), value.clone());
            }
        }
        for (id, value) in push.graphs {
            next_graphs.insert(id, value);
        }

        normalize_graph_edges(&mut next_graphs, &push.graph_edges);
        for value in next_graphs.values_mut() {
            ensure_instances_object(value);
        }

        self.graphs = next_graphs;
        self.node_prototypes.extend(push.node_prototypes);
        if push.active_graph_id.is_some() {
            self.active_graph_id = push.active_graph_id;
        }
        if !push.open_graph_ids.is_empty() {
            self.open_graph_ids = push.open_graph_ids;
        }
        self.graph_layouts.extend(push.graph_layouts);
        self.graph_summaries.extend(push.graph_summaries);
    }

    pub fn view(&self) -> BridgeStateView {
        BridgeStateView {
            graphs: self.graphs.clone(),
            node_prototypes: self.node_prototypes.clone(),
            active_graph_id: self.active_graph_id.clone(),
            open_graph_ids: self.open_graph_ids.clone(),
            graph_layouts: self.graph_layouts.clone(),
            graph_summaries: self.graph_summaries.clone(),
        }
    }

    pub fn active_graph_id(&self) -> Option<&str> {
        self.active_graph_id.as_deref()
    }

    pub fn graph(&self, graph_id: &str) -> Option<&Value> {
        self.graphs.get(graph_id)
    }

    pub fn node_prototype_names(&self) -> Vec<String> {
        self.node_prototypes
            .values()
            .filter_map(|v| v.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Builds the Planner-context snapshot for the active graph, capped via [`GraphSnapshot::truncated`].
    pub fn active_graph_snapshot(&self) -> Option<GraphSnapshot> {
        let graph_id = self.active_graph_id.clone()?;
        self.graph_snapshot(&graph_id)
    }

    /// Builds the `graphState` shape for an arbitrary
    /// graph id, used by the continuation loop re-invocation after an
    /// `applyMutations` action completes for a graph that isn't
    /// necessarily the one currently open in the UI.
    pub fn graph_snapshot(&self, graph_id: &str) -> Option<GraphSnapshot> {
        let graph = self.graphs.get(graph_id)?;
        let name = graph.get("name").and_then(Value::as_str).map(str::to_string);
        let instance_count = graph
            .get("instances")
            .and_then(Value::as_object)
            .map(Map::len)
            .unwrap_or(0);
        let edge_count = graph
            .get("edges")
            .and_then(Value::as_object)
            .map(Map::len)
            .unwrap_or(0);
        let names: Vec<String> = self.node_prototype_names().into_iter().take(instance_count.max(1)).collect();
        Some(GraphSnapshot::truncated(Some(graph_id.to_string()), name, &names, edge_count))
    }
}

fn normalize_graph_edges(graphs: &mut HashMap<String, Value>, flat_edges: &[Value]) {
    for edge in flat_edges {
        let Some(graph_id) = edge.get("graphId").and_then(Value::as_str) else {
            continue;
        };
        let Some(edge_id) = edge.get("edgeId").or_else(|| edge.get("id")).and_then(Value::as_str) else {
            continue;
        };
        let graph = graphs.entry(graph_id.to_string()).or_insert_with(|| json!({}));
        let edges_map = graph
            .as_object_mut()
            .unwrap()
            .entry("edges")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(map) = edges_map.as_object_mut() {
            map.insert(edge_id.to_string(), edge.clone());
        }
    }
}

fn ensure_instances_object(graph: &mut Value) {
    if let Some(map) = graph.as_object_mut() {
        map.entry("instances").or_insert_with(|| Value::Object(Map::new()));
        map.entry("edges").or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_graph_replaces_matching_id() {
        let mut state = BridgeState::new();
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g1".to_string(), json!({ "name": "Old" }))]),
            ..Default::default()
        });
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g1".to_string(), json!({ "name": "New" }))]),
            ..Default::default()
        });
        assert_eq!(state.graph("g1").unwrap()["name"], "New");
    }

    #[test]
    fn test_marked_graph_survives_a_push_that_omits_it() {
        let mut state = BridgeState::new();
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("itm-1".to_string(), json!({ "name": "Fixture" }))]),
            ..Default::default()
        });
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g2".to_string(), json!({ "name": "Other" }))]),
            ..Default::default()
        });
        assert!(state.graph("itm-1").is_some());
        assert!(state.graph("g2").is_some());
    }

    #[test]
    fn non_test_graph_is_dropped_when_omitted_from_a_later_push() {
        let mut state = BridgeState::new();
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g1".to_string(), json!({ "name": "Solar System" }))]),
            ..Default::default()
        });
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g2".to_string(), json!({ "name": "Other" }))]),
            ..Default::default()
        });
        assert!(state.graph("g1").is_none());
    }

    #[test]
    fn flat_graph_edges_normalize_into_per_graph_edges_map() {
        let mut state = BridgeState::new();
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g1".to_string(), json!({ "name": "X" }))]),
            graph_edges: vec![json!({ "graphId": "g1", "edgeId": "e1", "sourceId": "a", "destId": "b" })],
            ..Default::default()
        });
        let graph = state.graph("g1").unwrap();
        assert!(graph["edges"]["e1"].is_object());
    }

    #[test]
    fn every_graph_gets_an_instances_object() {
        let mut state = BridgeState::new();
        state.merge(BridgeStatePush {
            graphs: HashMap::from([("g1".to_string(), json!({ "name": "X" }))]),
            ..Default::default()
        });
        assert!(state.graph("g1").unwrap()["instances"].is_object());
    }
}
