//! Single-writer: drains approved reviews, converts patches into pending
//! actions, and tracks completions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use redstring_types::{PendingAction, Review, ReviewDecision};

use crate::hashing::chain_hash;
use crate::idempotency::IdRing;

/// Per-`graphId` head hash plus a sharded mutex so commits to different
/// graphs proceed concurrently while commits to the same graph serialize.
pub struct Committer {
    committed_patch_ids: IdRing,
    heads: AsyncMutex<HashMap<String, String>>,
    graph_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Committer {
    pub fn new(committed_patch_ids: IdRing) -> Self {
        Self {
            committed_patch_ids,
            heads: AsyncMutex::new(HashMap::new()),
            graph_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn committed_patch_ids(&self) -> &IdRing {
        &self.committed_patch_ids
    }

    pub async fn current_head(&self, graph_id: &str) -> Option<String> {
        self.heads.lock().await.get(graph_id).cloned()
    }

    async fn lock_for(&self, graph_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.graph_locks.lock().await;
        locks.entry(graph_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Converts every patch in an approved review into pending actions.
    /// Returns an empty vec for a rejected review or an already-committed
    /// patch id. `active_graph_id` is the
    /// UI's currently-open graph, used to decide whether an `openGraph`
    /// action must precede `applyMutations`.
    pub async fn commit(&self, review: &Review, active_graph_id: Option<&str>) -> Vec<PendingAction> {
        if review.decision != ReviewDecision::Approved {
            return vec![];
        }

        let mut actions = Vec::new();
        for patch in &review.patches {
            if patch.ops.is_empty() {
                continue;
            }
            let lock = self.lock_for(&patch.graph_id).await;
            let _guard = lock.lock().await;

            if !self.committed_patch_ids.insert(&patch.patch_id) {
                continue;
            }

            if active_graph_id != Some(patch.graph_id.as_str()) {
                actions.push(PendingAction::new(
                    uuid::Uuid::new_v4().to_string(),
                    "openGraph",
                    vec![json!({ "graphId": patch.graph_id })],
                    None,
                ));
            }

            let mut heads = self.heads.lock().await;
            let previous = heads.get(&patch.graph_id).cloned();
            let next_head = chain_hash(previous.as_deref(), patch.ops.iter());
            heads.insert(patch.graph_id.clone(), next_head);
            drop(heads);

            let ops_json = serde_json::to_value(&patch.ops).unwrap_or(json!([]));
            actions.push(PendingAction::new(
                uuid::Uuid::new_v4().to_string(),
                "applyMutations",
                vec![json!({ "graphId": patch.graph_id, "ops": ops_json })],
                Some(patch.thread_id.clone()),
            ));
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstring_types::{Op, Patch};
    use serde_json::json as j;

    fn approved_review(graph_id: &str, patch_id: &str) -> Review {
        Review {
            decision: ReviewDecision::Approved,
            reasons: None,
            graph_id: graph_id.to_string(),
            patches: vec![Patch {
                patch_id: patch_id.to_string(),
                graph_id: graph_id.to_string(),
                thread_id: "c1".to_string(),
                base_hash: None,
                ops: vec![Op::CreateNewGraph {
                    graph_id: graph_id.to_string(),
                    name: "X".to_string(),
                    extra: j!({}),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn prepends_open_graph_when_target_is_not_active() {
        let committer = Committer::new(IdRing::new(10));
        let actions = committer.commit(&approved_review("g1", "p1"), Some("g0")).await;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, "openGraph");
        assert_eq!(actions[1].action, "applyMutations");
    }

    #[tokio::test]
    async fn skips_open_graph_when_target_already_active() {
        let committer = Committer::new(IdRing::new(10));
        let actions = committer.commit(&approved_review("g1", "p1"), Some("g1")).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, "applyMutations");
    }

    #[tokio::test]
    async fn re_committing_same_patch_id_is_a_silent_no_op() {
        let committer = Committer::new(IdRing::new(10));
        let first = committer.commit(&approved_review("g1", "p1"), Some("g1")).await;
        let second = committer.commit(&approved_review("g1", "p1"), Some("g1")).await;
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn head_hash_advances_after_commit() {
        let committer = Committer::new(IdRing::new(10));
        assert!(committer.current_head("g1").await.is_none());
        committer.commit(&approved_review("g1", "p1"), Some("g1")).await;
        assert!(committer.current_head("g1").await.is_some());
    }
}
