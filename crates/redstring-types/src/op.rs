use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single graph mutation carried inside a [`crate::Patch`]. Field shapes are kept intentionally small: this core never
/// interprets op payloads beyond what the Auditor's dedup pass and the
/// Committer's action-shaping step need. `extra` carries any remaining
/// UI-side fields untouched, round-tripping them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Op {
    CreateNewGraph {
        graph_id: String,
        name: String,
        #[serde(flatten)]
        extra: Value,
    },
    AddNodePrototype {
        prototype_id: String,
        name: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(flatten)]
        extra: Value,
    },
    AddNodeInstance {
        graph_id: String,
        instance_id: String,
        prototype_id: String,
        #[serde(flatten)]
        extra: Value,
    },
    MoveNodeInstance {
        graph_id: String,
        instance_id: String,
        x: f64,
        y: f64,
    },
    AddEdge {
        graph_id: String,
        edge_id: String,
        source_id: String,
        dest_id: String,
        #[serde(flatten)]
        extra: Value,
    },
    DeleteEdge {
        graph_id: String,
        edge_id: String,
    },
    UpdateNodePrototype {
        prototype_id: String,
        #[serde(flatten)]
        extra: Value,
    },
    UpdateGraph {
        graph_id: String,
        #[serde(flatten)]
        extra: Value,
    },
    RemoveNodeInstance {
        graph_id: String,
        instance_id: String,
    },
    DeleteGraph {
        graph_id: String,
    },
}

impl Op {
    /// The `graphId` this op applies to, when it names one explicitly.
    /// `AddNodePrototype`/`UpdateNodePrototype` are prototype-scoped, not
    /// graph-scoped, and return `None`.
    pub fn graph_id(&self) -> Option<&str> {
        match self {
            Op::CreateNewGraph { graph_id, .. }
            | Op::AddNodeInstance { graph_id, .. }
            | Op::MoveNodeInstance { graph_id, .. }
            | Op::AddEdge { graph_id, .. }
            | Op::DeleteEdge { graph_id, .. }
            | Op::UpdateGraph { graph_id, .. }
            | Op::RemoveNodeInstance { graph_id, .. }
            | Op::DeleteGraph { graph_id, .. } => Some(graph_id),
            Op::AddNodePrototype { .. } | Op::UpdateNodePrototype { .. } => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Op::CreateNewGraph { .. } => "createNewGraph",
            Op::AddNodePrototype { .. } => "addNodePrototype",
            Op::AddNodeInstance { .. } => "addNodeInstance",
            Op::MoveNodeInstance { .. } => "moveNodeInstance",
            Op::AddEdge { .. } => "addEdge",
            Op::DeleteEdge { .. } => "deleteEdge",
            Op::UpdateNodePrototype { .. } => "updateNodePrototype",
            Op::UpdateGraph { .. } => "updateGraph",
            Op::RemoveNodeInstance { .. } => "removeNodeInstance",
            Op::DeleteGraph { .. } => "deleteGraph",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_tagged_json() {
        let op = Op::AddEdge {
            graph_id: "g1".to_string(),
            edge_id: "e1".to_string(),
            source_id: "n1".to_string(),
            dest_id: "n2".to_string(),
            extra: json!({}),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "addEdge");
        let back: Op = serde_json::from_value(value).unwrap();
        assert_eq!(back.type_name(), "addEdge");
        assert_eq!(back.graph_id(), Some("g1"));
    }

    #[test]
    fn prototype_ops_have_no_graph_id() {
        let op = Op::AddNodePrototype {
            prototype_id: "p1".to_string(),
            name: "Thing".to_string(),
            color: None,
            extra: json!({}),
        };
        assert_eq!(op.graph_id(), None);
    }
}
