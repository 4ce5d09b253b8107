//! Validates submitted patches and marks approved/rejected.

use redstring_types::{Op, Patch, Review, ReviewDecision};

use crate::idempotency::IdRing;
use crate::similarity::is_duplicate;

pub struct AuditContext<'a> {
    /// The graph's current head hash, recomputed by the Committer after
    /// each apply.
    pub current_base_hash: Option<&'a str>,
    /// Node prototype names already present in the graph, compared
    /// against incoming `addNodePrototype` ops for fuzzy dedup.
    pub existing_node_names: &'a [String],
    /// Shared with the Committer: patch ids already committed.
    pub committed_patch_ids: &'a IdRing,
}

/// Never mutates `ctx`; the caller `ack`s the source patch
/// after this returns (see the Scheduler's auditor stage).
pub fn audit(patch: &Patch, ctx: &AuditContext) -> Review {
    if patch.patch_id.trim().is_empty() {
        return rejected(patch, vec!["invalid_shape".to_string()]);
    }

    if ctx.committed_patch_ids.contains(&patch.patch_id) {
        // invariant 2: an already-committed patchId is dropped, not reprocessed.
        return Review {
            decision: ReviewDecision::Approved,
            reasons: Some(vec!["already_committed".to_string()]),
            graph_id: patch.graph_id.clone(),
            patches: vec![],
        };
    }

    if let (Some(base), Some(head)) = (&patch.base_hash, ctx.current_base_hash) {
        if base != head {
            return rejected(patch, vec!["stale_base".to_string()]);
        }
    }

    let (ops, dropped) = dedup_ops(&patch.ops, ctx.existing_node_names);
    let mut reasons = Vec::new();
    if dropped > 0 {
        reasons.push(format!("dropped_{dropped}_duplicate_ops"));
    }

    Review {
        decision: ReviewDecision::Approved,
        reasons: if reasons.is_empty() { None } else { Some(reasons) },
        graph_id: patch.graph_id.clone(),
        patches: vec![Patch {
            ops,
            ..patch.clone()
        }],
    }
}

fn rejected(patch: &Patch, reasons: Vec<String>) -> Review {
    Review {
        decision: ReviewDecision::Rejected,
        reasons: Some(reasons),
        graph_id: patch.graph_id.clone(),
        patches: vec![],
    }
}

/// Drops `addNodePrototype` ops whose name is a fuzzy duplicate of an
/// existing graph name, or of a name already added earlier within the
/// same patch. Other op kinds pass through untouched.
fn dedup_ops(ops: &[Op], existing_node_names: &[String]) -> (Vec<Op>, usize) {
    let mut kept_names: Vec<String> = existing_node_names.to_vec();
    let mut kept = Vec::with_capacity(ops.len());
    let mut dropped = 0;

    for op in ops {
        if let Op::AddNodePrototype { name, .. } = op {
            if kept_names.iter().any(|existing| is_duplicate(existing, name)) {
                dropped += 1;
                continue;
            }
            kept_names.push(name.clone());
        }
        kept.push(op.clone());
    }

    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(patch_id: &str, base_hash: Option<&str>, ops: Vec<Op>) -> Patch {
        Patch {
            patch_id: patch_id.to_string(),
            graph_id: "g1".to_string(),
            thread_id: "c1".to_string(),
            base_hash: base_hash.map(str::to_string),
            ops,
        }
    }

    #[test]
    fn stale_base_hash_is_rejected() {
        let ring = IdRing::new(10);
        let ctx = AuditContext {
            current_base_hash: Some("sha256:def"),
            existing_node_names: &[],
            committed_patch_ids: &ring,
        };
        let review = audit(&patch("p1", Some("sha256:abc"), vec![]), &ctx);
        assert_eq!(review.decision, ReviewDecision::Rejected);
        assert_eq!(review.reasons.unwrap(), vec!["stale_base"]);
    }

    #[test]
    fn fuzzy_duplicate_node_is_dropped_but_patch_still_approved() {
        let ring = IdRing::new(10);
        let ctx = AuditContext {
            current_base_hash: None,
            existing_node_names: &["The Avengers".to_string()],
            committed_patch_ids: &ring,
        };
        let ops = vec![Op::AddNodePrototype {
            prototype_id: "p1".to_string(),
            name: "Avengers".to_string(),
            color: None,
            extra: json!({}),
        }];
        let review = audit(&patch("p2", None, ops), &ctx);
        assert_eq!(review.decision, ReviewDecision::Approved);
        assert_eq!(review.patches[0].ops.len(), 0);
    }

    #[test]
    fn already_committed_patch_id_is_approved_as_a_no_op() {
        let ring = IdRing::new(10);
        ring.insert("p1");
        let ctx = AuditContext {
            current_base_hash: None,
            existing_node_names: &[],
            committed_patch_ids: &ring,
        };
        let review = audit(&patch("p1", None, vec![Op::DeleteGraph { graph_id: "g1".to_string() }]), &ctx);
        assert_eq!(review.decision, ReviewDecision::Approved);
        assert!(review.patches.is_empty());
    }
}
