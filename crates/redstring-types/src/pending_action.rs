use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingActionState {
    Enqueued,
    Leased,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PendingActionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

/// `action` names a UI-side operation
/// (`applyMutations`, `openGraph`, `addNodePrototype`,
/// `createAndAssignGraphDefinition`, ...); this core never interprets the
/// name beyond carrying it through to the leasing client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub action: String,
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PendingActionMeta>,
    pub timestamp: u64,
    #[serde(skip)]
    pub state: PendingActionState,
    #[serde(skip)]
    pub lease_id: Option<String>,
}

impl PendingAction {
    pub fn new(id: impl Into<String>, action: impl Into<String>, params: Vec<Value>, cid: Option<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            params,
            meta: cid.map(|cid| PendingActionMeta { cid: Some(cid) }),
            timestamp: crate::now_ms(),
            state: PendingActionState::Enqueued,
            lease_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pending_action_starts_enqueued_with_no_lease() {
        let action = PendingAction::new("a1", "openGraph", vec![], Some("cid-1".to_string()));
        assert_eq!(action.state, PendingActionState::Enqueued);
        assert!(action.lease_id.is_none());
        assert_eq!(action.meta.unwrap().cid, Some("cid-1".to_string()));
    }
}
