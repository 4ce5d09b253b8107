//! `baseHash`: a
//! `sha256:<hex>` digest over a graph's ordered committed op log, each
//! op's canonical JSON serialization newline-joined and hashed
//! incrementally — a hash chain over applied patches per `graphId`.

use sha2::{Digest, Sha256};

use redstring_types::Op;

pub fn hash_ops<'a>(ops: impl Iterator<Item = &'a Op>) -> String {
    let mut hasher = Sha256::new();
    for op in ops {
        let canonical = serde_json::to_string(op).unwrap_or_default();
        hasher.update(canonical.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{:x}", hasher.finalize())
}

/// Folds one more patch's ops onto a previous head hash, by hashing the
/// previous head alongside the new ops — so the result still depends on
/// everything committed before it, not just the newest patch.
pub fn chain_hash<'a>(previous_head: Option<&str>, new_ops: impl Iterator<Item = &'a Op>) -> String {
    let mut hasher = Sha256::new();
    if let Some(previous) = previous_head {
        hasher.update(previous.as_bytes());
        hasher.update(b"\n");
    }
    for op in new_ops {
        let canonical = serde_json::to_string(op).unwrap_or_default();
        hasher.update(canonical.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_the_same_ops() {
        let ops = vec![Op::DeleteGraph { graph_id: "g1".to_string() }];
        let a = hash_ops(ops.iter());
        let b = hash_ops(ops.iter());
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn chain_hash_differs_when_previous_head_differs() {
        let ops = vec![Op::DeleteGraph { graph_id: "g1".to_string() }];
        let a = chain_hash(Some("sha256:aaa"), ops.iter());
        let b = chain_hash(Some("sha256:bbb"), ops.iter());
        assert_ne!(a, b);
    }
}
