//! The agentic continuation loop. Termination checks are
//! pure functions so the safety caps are testable without a model call;
//! only the evaluation-prompt step (4) needs a live [`redstring_providers::Provider`],
//! and that glue lives in `redstring-server` where the provider is
//! available.

use redstring_types::GraphSnapshot;

use crate::executor::{DispatchContext, ExecutorOutcome};

pub const MAX_PHASES: u32 = 8;
pub const MAX_TOTAL_NODES: usize = 100;

/// The single function
/// both the HTTP handler and the in-process continuation step call for a
/// `decompose_goal` plan, collapsing what the source implemented as two
/// duplicate code paths.
pub fn dispatch_decompose_goal(_ctx: &DispatchContext, subgoals: &[String]) -> ExecutorOutcome {
    match subgoals.split_first() {
        None => ExecutorOutcome::Respond("There's nothing left to decompose.".to_string()),
        Some((first, rest)) => ExecutorOutcome::Recurse {
            next_message: first.clone(),
            remaining_subgoals: rest.to_vec(),
        },
    }
}

pub struct ContinueRequest {
    pub cid: String,
    pub graph_state: GraphSnapshot,
    pub iteration: u32,
    pub remaining_subgoals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContinueOutcome {
    /// Checked in order 1-3; a safety cap or chained subgoal already
    /// decides the outcome without needing a model call.
    Recurse { next_message: String, remaining_subgoals: Vec<String> },
    CompletedPhasesExhausted,
    CompletedNodeLimit,
    /// None of the early-exit checks applied; the caller must invoke the
    /// evaluation prompt (step 4) next.
    NeedsEvaluation,
}

/// Termination checks 1-3, in order.
pub fn check_early_termination(req: &ContinueRequest) -> ContinueOutcome {
    if let Some((first, rest)) = req.remaining_subgoals.split_first() {
        return ContinueOutcome::Recurse {
            next_message: first.clone(),
            remaining_subgoals: rest.to_vec(),
        };
    }
    if req.iteration >= MAX_PHASES {
        return ContinueOutcome::CompletedPhasesExhausted;
    }
    if req.graph_state.node_count >= MAX_TOTAL_NODES {
        return ContinueOutcome::CompletedNodeLimit;
    }
    ContinueOutcome::NeedsEvaluation
}

/// The model's decision at step 4.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationDecision {
    Continue,
    Complete,
}

/// Result of folding the evaluation decision (step 5-6) into the loop.
#[derive(Debug, Clone)]
pub struct ContinueResult {
    pub completed: bool,
    pub reason: Option<&'static str>,
    pub next_iteration: Option<u32>,
}

pub fn apply_evaluation_decision(decision: EvaluationDecision, iteration: u32) -> ContinueResult {
    match decision {
        EvaluationDecision::Continue => ContinueResult {
            completed: false,
            reason: None,
            next_iteration: Some(iteration + 1),
        },
        EvaluationDecision::Complete => ContinueResult {
            completed: true,
            reason: None,
            next_iteration: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_state(node_count: usize) -> GraphSnapshot {
        GraphSnapshot {
            graph_id: Some("g1".to_string()),
            name: None,
            node_names: vec![],
            node_count,
            edge_count: 0,
        }
    }

    #[test]
    fn remaining_subgoals_take_priority_over_every_other_check() {
        let req = ContinueRequest {
            cid: "c1".to_string(),
            graph_state: graph_state(100),
            iteration: 8,
            remaining_subgoals: vec!["next step".to_string()],
        };
        match check_early_termination(&req) {
            ContinueOutcome::Recurse { next_message, remaining_subgoals } => {
                assert_eq!(next_message, "next step");
                assert!(remaining_subgoals.is_empty());
            }
            other => panic!("expected Recurse, got {other:?}"),
        }
    }

    #[test]
    fn phase_cap_terminates_before_evaluation() {
        let req = ContinueRequest {
            cid: "c1".to_string(),
            graph_state: graph_state(1),
            iteration: 8,
            remaining_subgoals: vec![],
        };
        assert_eq!(check_early_termination(&req), ContinueOutcome::CompletedPhasesExhausted);
    }

    #[test]
    fn node_limit_terminates_when_under_phase_cap() {
        let req = ContinueRequest {
            cid: "c1".to_string(),
            graph_state: graph_state(100),
            iteration: 3,
            remaining_subgoals: vec![],
        };
        assert_eq!(check_early_termination(&req), ContinueOutcome::CompletedNodeLimit);
    }

    #[test]
    fn otherwise_needs_evaluation() {
        let req = ContinueRequest {
            cid: "c1".to_string(),
            graph_state: graph_state(1),
            iteration: 1,
            remaining_subgoals: vec![],
        };
        assert_eq!(check_early_termination(&req), ContinueOutcome::NeedsEvaluation);
    }
}
