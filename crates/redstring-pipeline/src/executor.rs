//! Translates a validated [`Plan`] into either a direct response or a
//! queued [`Goal`], and a single [`Task`] into mutation [`Op`]s.

use serde_json::{json, Value};
use uuid::Uuid;

use redstring_types::{ApiConfig, ConversationTurn, Dag, Goal, GoalMeta, Op, Task};

use crate::graph_index::GraphIndex;
use crate::planner::{Directionality, EdgeSpec, NodeSpec, Plan};

pub struct DispatchContext<'a> {
    pub cid: String,
    pub index: &'a GraphIndex,
    pub api_key: Option<String>,
    pub api_config: Option<ApiConfig>,
    pub original_message: String,
    pub conversation_history: Vec<ConversationTurn>,
}

pub enum ExecutorOutcome {
    /// No queueing; e.g. `qa`/`analyze`, or a resolution failure.
    Respond(String),
    Enqueue(Goal),
    /// `decompose_goal`: the first subgoal becomes a fresh
    /// in-process planner call; the rest ride in `chainState`.
    Recurse { next_message: String, remaining_subgoals: Vec<String> },
}

fn friendly_goal_meta(ctx: &DispatchContext, agentic_loop: bool, iteration: u32) -> GoalMeta {
    GoalMeta {
        iteration,
        agentic_loop,
        api_key: ctx.api_key.clone(),
        api_config: ctx.api_config.clone(),
        original_message: Some(ctx.original_message.clone()),
        conversation_history: crate::last_conversation_turns(&ctx.conversation_history),
        chain_state: None,
    }
}

fn single_task_goal(ctx: &DispatchContext, goal_name: &str, tool_name: &str, args: Value) -> Goal {
    Goal {
        id: Uuid::new_v4().to_string(),
        goal: goal_name.to_string(),
        dag: Dag {
            tasks: vec![Task {
                tool_name: tool_name.to_string(),
                args,
                thread_id: ctx.cid.clone(),
                depends_on: None,
            }],
        },
        thread_id: ctx.cid.clone(),
        meta: friendly_goal_meta(ctx, false, 0),
    }
}

/// Maps `plan.intent` to a respond-only action or a
/// queued goal, resolving node/edge names against the active graph.
pub fn dispatch(plan: &Plan, ctx: &DispatchContext) -> ExecutorOutcome {
    match plan {
        Plan::Qa { response } | Plan::Analyze { response } => ExecutorOutcome::Respond(response.clone()),

        Plan::CreateGraph { graph, graph_spec, .. } => dispatch_create_graph(ctx, &graph.name, graph_spec.as_ref()),

        Plan::CreateNode { node, graph_id, .. } => {
            let Some(graph_id) = graph_id.clone().or_else(|| ctx.index.active_graph_id.clone()) else {
                return ExecutorOutcome::Respond("I don't have an active graph to add that node to.".to_string());
            };
            ExecutorOutcome::Enqueue(single_task_goal(
                ctx,
                "create_node",
                "create_node",
                json!({ "graphId": graph_id, "name": node.name, "color": node.color }),
            ))
        }

        Plan::UpdateNode { node_name, updates, .. } => match ctx.index.resolve_prototype_id(node_name) {
            Some(prototype_id) => ExecutorOutcome::Enqueue(single_task_goal(
                ctx,
                "update_node",
                "update_node",
                json!({ "prototypeId": prototype_id, "updates": updates }),
            )),
            None => ExecutorOutcome::Respond(format!("I couldn't find a node named \"{node_name}\".")),
        },

        Plan::DeleteNode { node_name, .. } => match ctx.index.resolve_prototype_id(node_name) {
            Some(prototype_id) => {
                let Some(graph_id) = &ctx.index.active_graph_id else {
                    return ExecutorOutcome::Respond("There's no active graph to remove that node from.".to_string());
                };
                ExecutorOutcome::Enqueue(single_task_goal(
                    ctx,
                    "delete_node",
                    "delete_node",
                    json!({ "graphId": graph_id, "prototypeId": prototype_id }),
                ))
            }
            None => ExecutorOutcome::Respond(format!("I couldn't find a node named \"{node_name}\".")),
        },

        Plan::DeleteGraph { graph_id, .. } => {
            let Some(graph_id) = graph_id.clone().or_else(|| ctx.index.active_graph_id.clone()) else {
                return ExecutorOutcome::Respond("I don't know which graph to delete.".to_string());
            };
            ExecutorOutcome::Enqueue(single_task_goal(ctx, "delete_graph", "delete_graph", json!({ "graphId": graph_id })))
        }

        Plan::CreateEdge {
            source,
            target,
            directionality,
            definition_node,
            ..
        } => dispatch_create_edge(ctx, source, target, *directionality, definition_node.as_ref()),

        Plan::UpdateEdge { source, target, updates, .. } => {
            let Some(graph_id) = &ctx.index.active_graph_id else {
                return ExecutorOutcome::Respond("There's no active graph to update that edge in.".to_string());
            };
            match ctx.index.resolve_edge_id(graph_id, source, target) {
                Some(edge_id) => ExecutorOutcome::Enqueue(single_task_goal(
                    ctx,
                    "update_edge",
                    "update_edge",
                    json!({ "graphId": graph_id, "edgeId": edge_id, "updates": updates }),
                )),
                None => ExecutorOutcome::Respond(format!("I couldn't find an edge between \"{source}\" and \"{target}\".")),
            }
        }

        Plan::DeleteEdge { source, target, .. } => {
            let Some(graph_id) = &ctx.index.active_graph_id else {
                return ExecutorOutcome::Respond("There's no active graph to delete that edge from.".to_string());
            };
            match ctx.index.resolve_edge_id(graph_id, source, target) {
                Some(edge_id) => ExecutorOutcome::Enqueue(single_task_goal(
                    ctx,
                    "delete_edge",
                    "delete_edge",
                    json!({ "graphId": graph_id, "edgeId": edge_id }),
                )),
                None => ExecutorOutcome::Respond(format!("I couldn't find an edge between \"{source}\" and \"{target}\".")),
            }
        }

        Plan::BulkDelete { names, .. } => ExecutorOutcome::Enqueue(single_task_goal(
            ctx,
            "bulk_delete",
            "bulk_delete",
            json!({ "names": names }),
        )),

        Plan::EnrichNode { node_name, .. } => match ctx.index.resolve_prototype_id(node_name) {
            Some(prototype_id) => ExecutorOutcome::Enqueue(single_task_goal(
                ctx,
                "enrich_node",
                "enrich_node",
                json!({ "prototypeId": prototype_id }),
            )),
            None => ExecutorOutcome::Respond(format!("I couldn't find a node named \"{node_name}\".")),
        },

        Plan::DefineConnections { edges, .. } => ExecutorOutcome::Enqueue(single_task_goal(
            ctx,
            "define_connections",
            "define_connections",
            json!({ "edges": edges_to_json(edges) }),
        )),

        // The decomposition self-recursion is one function,
        // called in-process by the continuation loop, never re-entered here.
        Plan::DecomposeGoal { subgoals, .. } => crate::continuation::dispatch_decompose_goal(ctx, subgoals),
    }
}

fn dispatch_create_graph(ctx: &DispatchContext, name: &str, graph_spec: Option<&crate::planner::GraphSpec>) -> ExecutorOutcome {
    let graph_id = Uuid::new_v4().to_string();
    match graph_spec {
        None => ExecutorOutcome::Enqueue(Goal {
            id: Uuid::new_v4().to_string(),
            goal: "create_graph".to_string(),
            dag: Dag {
                tasks: vec![Task {
                    tool_name: "create_graph".to_string(),
                    args: json!({ "graphId": graph_id, "graphName": name }),
                    thread_id: ctx.cid.clone(),
                    depends_on: None,
                }],
            },
            thread_id: ctx.cid.clone(),
            meta: friendly_goal_meta(ctx, false, 0),
        }),
        Some(spec) => {
            // Populated creation is a two-task DAG tagged agentic.
            ExecutorOutcome::Enqueue(Goal {
                id: Uuid::new_v4().to_string(),
                goal: "create_populated_graph".to_string(),
                dag: Dag {
                    tasks: vec![
                        Task {
                            tool_name: "create_populated_graph".to_string(),
                            args: json!({
                                "graphId": graph_id,
                                "graphName": name,
                                "nodes": nodes_to_json(&spec.nodes),
                                "layoutAlgorithm": spec.layout_algorithm,
                            }),
                            thread_id: ctx.cid.clone(),
                            depends_on: None,
                        },
                        Task {
                            tool_name: "define_connections".to_string(),
                            args: json!({ "graphId": graph_id, "edges": edges_to_json(&spec.edges) }),
                            thread_id: ctx.cid.clone(),
                            depends_on: Some(vec!["create_populated_graph".to_string()]),
                        },
                    ],
                },
                thread_id: ctx.cid.clone(),
                meta: friendly_goal_meta(ctx, true, 0),
            })
        }
    }
}

fn dispatch_create_edge(ctx: &DispatchContext, source: &str, target: &str, directionality: Directionality, definition_node: Option<&NodeSpec>) -> ExecutorOutcome {
    let Some(graph_id) = &ctx.index.active_graph_id else {
        return ExecutorOutcome::Respond("There's no active graph to create that edge in.".to_string());
    };
    let arrows_toward = directionality.arrows_toward(source, target);
    ExecutorOutcome::Enqueue(single_task_goal(
        ctx,
        "create_edge",
        "create_edge",
        json!({
            "graphId": graph_id,
            "source": source,
            "target": target,
            "arrowsToward": arrows_toward,
            "definitionNode": definition_node.map(|n| json!({ "name": n.name, "color": n.color })),
        }),
    ))
}

fn nodes_to_json(nodes: &[NodeSpec]) -> Value {
    json!(nodes.iter().map(|n| json!({ "name": n.name, "color": n.color })).collect::<Vec<_>>())
}

fn edges_to_json(edges: &[EdgeSpec]) -> Value {
    json!(edges
        .iter()
        .map(|e| {
            let arrows_toward = e.directionality.arrows_toward(&e.source, &e.target);
            json!({
                "source": e.source,
                "target": e.target,
                "arrowsToward": arrows_toward,
                "definitionNode": e.definition_node.as_ref().map(|n| json!({ "name": n.name, "color": n.color })),
            })
        })
        .collect::<Vec<_>>())
}

/// Task -> op translation: converts one queued [`Task`] into
/// the [`Op`]s a patch will carry. Each tool name corresponds to exactly
/// one op, except `create_populated_graph` which expands into a graph
/// creation followed by one `addNodePrototype`/`addNodeInstance` pair per
/// node (the instance-placement step the Auditor/Committer treat as a
/// single patch).
pub fn task_to_ops(task: &Task, index: &GraphIndex) -> Vec<Op> {
    let args = &task.args;
    match task.tool_name.as_str() {
        "create_graph" => vec![Op::CreateNewGraph {
            graph_id: str_arg(args, "graphId"),
            name: str_arg(args, "graphName"),
            extra: json!({}),
        }],
        "create_populated_graph" => {
            let graph_id = str_arg(args, "graphId");
            let mut ops = vec![Op::CreateNewGraph {
                graph_id: graph_id.clone(),
                name: str_arg(args, "graphName"),
                extra: json!({}),
            }];
            if let Some(nodes) = args.get("nodes").and_then(Value::as_array) {
                for node in nodes {
                    let prototype_id = Uuid::new_v4().to_string();
                    let instance_id = Uuid::new_v4().to_string();
                    ops.push(Op::AddNodePrototype {
                        prototype_id: prototype_id.clone(),
                        name: node.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        color: node.get("color").and_then(Value::as_str).map(str::to_string),
                        extra: json!({}),
                    });
                    ops.push(Op::AddNodeInstance {
                        graph_id: graph_id.clone(),
                        instance_id,
                        prototype_id,
                        extra: json!({}),
                    });
                }
            }
            ops
        }
        "create_node" => {
            let prototype_id = Uuid::new_v4().to_string();
            let instance_id = Uuid::new_v4().to_string();
            vec![
                Op::AddNodePrototype {
                    prototype_id: prototype_id.clone(),
                    name: str_arg(args, "name"),
                    color: args.get("color").and_then(Value::as_str).map(str::to_string),
                    extra: json!({}),
                },
                Op::AddNodeInstance {
                    graph_id: str_arg(args, "graphId"),
                    instance_id,
                    prototype_id,
                    extra: json!({}),
                },
            ]
        }
        "update_node" => vec![Op::UpdateNodePrototype {
            prototype_id: str_arg(args, "prototypeId"),
            extra: args.get("updates").cloned().unwrap_or(json!({})),
        }],
        "delete_node" => vec![Op::RemoveNodeInstance {
            graph_id: str_arg(args, "graphId"),
            instance_id: index
                .resolve_instance_id(&str_arg(args, "graphId"), &str_arg(args, "prototypeId"))
                .unwrap_or_default()
                .to_string(),
        }],
        "delete_graph" => vec![Op::DeleteGraph {
            graph_id: str_arg(args, "graphId"),
        }],
        "update_edge" => vec![Op::UpdateGraph {
            graph_id: str_arg(args, "graphId"),
            extra: json!({ "edgeId": str_arg(args, "edgeId"), "updates": args.get("updates").cloned() }),
        }],
        "delete_edge" => vec![Op::DeleteEdge {
            graph_id: str_arg(args, "graphId"),
            edge_id: str_arg(args, "edgeId"),
        }],
        "create_edge" | "define_connections" => edges_from_task_args(args, index),
        "bulk_delete" => vec![], // resolved per-name by the Committer's local mirror before apply
        "enrich_node" => vec![Op::UpdateNodePrototype {
            prototype_id: str_arg(args, "prototypeId"),
            extra: json!({ "enriched": true }),
        }],
        other => {
            tracing::warn!(tool_name = other, "unrecognized tool name in task, producing no ops");
            vec![]
        }
    }
}

fn edges_from_task_args(args: &Value, _index: &GraphIndex) -> Vec<Op> {
    let graph_id = str_arg(args, "graphId");
    let edges = args.get("edges").and_then(Value::as_array).cloned().unwrap_or_default();
    edges
        .into_iter()
        .map(|edge| Op::AddEdge {
            graph_id: graph_id.clone(),
            edge_id: Uuid::new_v4().to_string(),
            source_id: edge.get("source").and_then(Value::as_str).unwrap_or_default().to_string(),
            dest_id: edge.get("target").and_then(Value::as_str).unwrap_or_default().to_string(),
            extra: json!({ "arrowsToward": edge.get("arrowsToward") }),
        })
        .collect()
}

fn str_arg(args: &Value, key: &str) -> String {
    args.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstring_types::ConversationTurn;

    fn ctx(index: &GraphIndex) -> DispatchContext<'_> {
        DispatchContext {
            cid: "c1".to_string(),
            index,
            api_key: None,
            api_config: None,
            original_message: "create a graph".to_string(),
            conversation_history: Vec::<ConversationTurn>::new(),
        }
    }

    #[test]
    fn create_graph_without_spec_is_single_task_non_agentic() {
        let index = GraphIndex::new(None);
        let plan = Plan::CreateGraph {
            response: "Creating Solar System.".to_string(),
            graph: crate::planner::GraphMeta { name: "Solar System".to_string() },
            graph_spec: None,
        };
        match dispatch(&plan, &ctx(&index)) {
            ExecutorOutcome::Enqueue(goal) => {
                assert_eq!(goal.goal, "create_graph");
                assert_eq!(goal.dag.tasks.len(), 1);
                assert!(!goal.meta.agentic_loop);
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn create_graph_with_spec_is_two_task_agentic_dag() {
        let index = GraphIndex::new(None);
        let plan = Plan::CreateGraph {
            response: "Creating Planets.".to_string(),
            graph: crate::planner::GraphMeta { name: "Planets".to_string() },
            graph_spec: Some(crate::planner::GraphSpec {
                nodes: vec![
                    NodeSpec { name: "Sun".to_string(), color: Some("#FDB813".to_string()) },
                    NodeSpec { name: "Earth".to_string(), color: Some("#4A90E2".to_string()) },
                ],
                edges: vec![EdgeSpec {
                    source: "Sun".to_string(),
                    target: "Earth".to_string(),
                    directionality: Directionality::Unidirectional,
                    definition_node: Some(NodeSpec { name: "Orbits".to_string(), color: None }),
                }],
                layout_algorithm: Some("radial".to_string()),
            }),
        };
        match dispatch(&plan, &ctx(&index)) {
            ExecutorOutcome::Enqueue(goal) => {
                assert_eq!(goal.goal, "create_populated_graph");
                assert_eq!(goal.dag.tasks.len(), 2);
                assert!(goal.meta.agentic_loop);
                assert_eq!(goal.dag.tasks[1].depends_on.as_deref(), Some(&["create_populated_graph".to_string()][..]));
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn update_node_without_resolution_responds_without_enqueue() {
        let index = GraphIndex::new(None);
        let plan = Plan::UpdateNode {
            response: "ok".to_string(),
            node_name: "Ghost".to_string(),
            updates: json!({}),
        };
        match dispatch(&plan, &ctx(&index)) {
            ExecutorOutcome::Respond(message) => assert!(message.contains("Ghost")),
            _ => panic!("expected a response, not an enqueue"),
        }
    }

    #[test]
    fn create_populated_graph_task_expands_to_prototype_and_instance_ops() {
        let index = GraphIndex::new(None);
        let task = Task {
            tool_name: "create_populated_graph".to_string(),
            args: json!({
                "graphId": "g1",
                "graphName": "Planets",
                "nodes": [{"name": "Sun", "color": "#FDB813"}],
            }),
            thread_id: "c1".to_string(),
            depends_on: None,
        };
        let ops = task_to_ops(&task, &index);
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].type_name(), "createNewGraph");
        assert_eq!(ops[1].type_name(), "addNodePrototype");
        assert_eq!(ops[2].type_name(), "addNodeInstance");
    }
}
