use serde::{Deserialize, Serialize};

use crate::Op;

/// `patch_id` is the idempotency key: re-applying an already-committed
/// `patch_id` is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub patch_id: String,
    pub graph_id: String,
    pub thread_id: String,
    pub base_hash: Option<String>,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

/// `patches` carries multiple patches when the Auditor batches a
/// single review decision over a run of duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    pub graph_id: String,
    pub patches: Vec<Patch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_with_null_base_hash_round_trips() {
        let patch = Patch {
            patch_id: "p1".to_string(),
            graph_id: "g1".to_string(),
            thread_id: "cid-1".to_string(),
            base_hash: None,
            ops: vec![Op::DeleteGraph {
                graph_id: "g1".to_string(),
            }],
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value["baseHash"], json!(null));
    }
}
