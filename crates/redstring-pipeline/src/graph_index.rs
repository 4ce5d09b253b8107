//! Pure name/id resolution over a projected bridge-state snapshot
//!. Kept as plain data + pure functions so the "recurse
//! into planner-first vs. fallback block" duplicate path collapses into
//! callers of these helpers, never its own copy of the resolution logic.

use std::collections::HashMap;

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    edge_id: String,
    source_instance_id: String,
    dest_instance_id: String,
}

/// A read-only view built fresh from the projected bridge state for each
/// dispatch/run_task call.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    pub active_graph_id: Option<String>,
    prototype_id_by_name: HashMap<String, String>,
    prototype_name_by_id: HashMap<String, String>,
    instance_by_prototype: HashMap<(String, String), String>,
    edges_by_graph: HashMap<String, Vec<EdgeRecord>>,
}

impl GraphIndex {
    pub fn new(active_graph_id: Option<String>) -> Self {
        Self {
            active_graph_id,
            ..Default::default()
        }
    }

    pub fn add_prototype(&mut self, prototype_id: impl Into<String>, name: impl Into<String>) {
        let prototype_id = prototype_id.into();
        let name = name.into();
        self.prototype_id_by_name.insert(normalize(&name), prototype_id.clone());
        self.prototype_name_by_id.insert(prototype_id, name);
    }

    pub fn add_instance(&mut self, graph_id: impl Into<String>, prototype_id: impl Into<String>, instance_id: impl Into<String>) {
        self.instance_by_prototype
            .insert((graph_id.into(), prototype_id.into()), instance_id.into());
    }

    pub fn add_edge(&mut self, graph_id: impl Into<String>, edge_id: impl Into<String>, source_instance_id: impl Into<String>, dest_instance_id: impl Into<String>) {
        self.edges_by_graph.entry(graph_id.into()).or_default().push(EdgeRecord {
            edge_id: edge_id.into(),
            source_instance_id: source_instance_id.into(),
            dest_instance_id: dest_instance_id.into(),
        });
    }

    pub fn resolve_prototype_id(&self, name: &str) -> Option<&str> {
        self.prototype_id_by_name.get(&normalize(name)).map(String::as_str)
    }

    pub fn resolve_instance_id(&self, graph_id: &str, prototype_id: &str) -> Option<&str> {
        self.instance_by_prototype
            .get(&(graph_id.to_string(), prototype_id.to_string()))
            .map(String::as_str)
    }

    /// Resolves `(sourceName, targetName)` to an edge id in `graph_id`,
    /// accepting a match in either direction.
    pub fn resolve_edge_id(&self, graph_id: &str, source_name: &str, target_name: &str) -> Option<&str> {
        let source_proto = self.resolve_prototype_id(source_name)?;
        let target_proto = self.resolve_prototype_id(target_name)?;
        let source_instance = self.resolve_instance_id(graph_id, source_proto)?;
        let target_instance = self.resolve_instance_id(graph_id, target_proto)?;

        self.edges_by_graph.get(graph_id).and_then(|edges| {
            edges
                .iter()
                .find(|e| {
                    (e.source_instance_id == source_instance && e.dest_instance_id == target_instance)
                        || (e.source_instance_id == target_instance && e.dest_instance_id == source_instance)
                })
                .map(|e| e.edge_id.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_prototype_then_instance_then_edge() {
        let mut index = GraphIndex::new(Some("g1".to_string()));
        index.add_prototype("p-sun", "Sun");
        index.add_prototype("p-earth", "Earth");
        index.add_instance("g1", "p-sun", "i-sun");
        index.add_instance("g1", "p-earth", "i-earth");
        index.add_edge("g1", "e1", "i-sun", "i-earth");

        assert_eq!(index.resolve_prototype_id("sun"), Some("p-sun"));
        assert_eq!(index.resolve_edge_id("g1", "Sun", "Earth"), Some("e1"));
        assert_eq!(index.resolve_edge_id("g1", "Earth", "Sun"), Some("e1"));
    }

    #[test]
    fn unresolved_name_returns_none() {
        let index = GraphIndex::new(None);
        assert_eq!(index.resolve_prototype_id("missing"), None);
    }
}
