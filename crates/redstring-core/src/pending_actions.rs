//! Client-facing lease/complete broker for pending actions. Grounded on
//! the same lease-bookkeeping shape as `redstring-queue`'s manager, but
//! deliberately simpler: pending actions have no retry/attempts
//! semantics and no automatic expiry by default — a reaper is optional
//! and only runs when `REDSTRING_ACTION_LEASE_TTL_MS` is set.

use std::collections::HashMap;

use parking_lot::Mutex;
use redstring_types::{now_ms, PendingAction, PendingActionState};

struct Entry {
    action: PendingAction,
    leased_at: Option<u64>,
}

#[derive(Default)]
struct BrokerState {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

/// Client-facing surface: enqueue, lease-on-read, complete, feedback.
pub struct PendingActionBroker {
    state: Mutex<BrokerState>,
}

impl PendingActionBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
        }
    }

    /// Preserves the order the Committer emitted actions in.
    pub fn enqueue_many(&self, actions: Vec<PendingAction>) {
        let mut state = self.state.lock();
        for action in actions {
            state.order.push(action.id.clone());
            state.entries.insert(action.id.clone(), Entry { action, leased_at: None });
        }
    }

    /// `GET /api/bridge/pending-actions`: returns enqueued-but-unleased
    /// actions, marking each leased. Concurrent callers see disjoint sets
    /// because this holds the lock for the whole scan-and-mark.
    pub fn pull_available(&self) -> Vec<PendingAction> {
        let mut state = self.state.lock();
        let mut leased = Vec::new();
        for id in state.order.clone() {
            if let Some(entry) = state.entries.get_mut(&id) {
                if entry.action.state == PendingActionState::Enqueued {
                    entry.action.state = PendingActionState::Leased;
                    entry.leased_at = Some(now_ms());
                    leased.push(entry.action.clone());
                }
            }
        }
        leased
    }

    /// `POST /api/bridge/action-started`: acknowledges a lease without
    /// completing it, useful for UI progress reporting.
    pub fn mark_started(&self, action_id: &str) -> bool {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(action_id) {
            entry.leased_at = Some(now_ms());
            true
        } else {
            false
        }
    }

    /// `POST /api/bridge/action-completed`: removes the action entirely
    /// and hands back what was removed, so the caller can decide whether
    /// it needs to re-invoke the continuation loop. Round-
    /// trip property: no zombie entries after this.
    pub fn complete(&self, action_id: &str) -> Option<PendingAction> {
        let mut state = self.state.lock();
        let entry = state.entries.remove(action_id)?;
        state.order.retain(|id| id != action_id);
        Some(entry.action)
    }

    /// `POST /api/bridge/action-feedback`: records partial progress or an
    /// error without changing lease state.
    pub fn feedback(&self, action_id: &str) -> bool {
        self.state.lock().entries.contains_key(action_id)
    }

    /// Optional reaper, only meaningful when a positive TTL is
    /// configured. Returns leased actions whose lease has outlived the
    /// TTL back to `Enqueued` so a future pull can retry them.
    pub fn reap_expired_leases(&self, ttl_ms: u64) -> usize {
        let mut state = self.state.lock();
        let cutoff = now_ms().saturating_sub(ttl_ms);
        let mut reaped = 0;
        for entry in state.entries.values_mut() {
            if entry.action.state == PendingActionState::Leased {
                if let Some(leased_at) = entry.leased_at {
                    if leased_at < cutoff {
                        entry.action.state = PendingActionState::Enqueued;
                        entry.leased_at = None;
                        reaped += 1;
                    }
                }
            }
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingActionBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(id: &str) -> PendingAction {
        PendingAction::new(id, "openGraph", vec![json!({ "graphId": "g1" })], None)
    }

    #[test]
    fn concurrent_pulls_see_disjoint_sets() {
        let broker = PendingActionBroker::new();
        broker.enqueue_many(vec![action("a1"), action("a2")]);
        let first = broker.pull_available();
        let second = broker.pull_available();
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[test]
    fn complete_removes_entry_with_no_zombie() {
        let broker = PendingActionBroker::new();
        broker.enqueue_many(vec![action("a1")]);
        broker.pull_available();
        let completed = broker.complete("a1");
        assert_eq!(completed.unwrap().id, "a1");
        assert_eq!(broker.len(), 0);
        assert!(broker.complete("a1").is_none());
    }

    #[test]
    fn feedback_does_not_release_lease() {
        let broker = PendingActionBroker::new();
        broker.enqueue_many(vec![action("a1")]);
        broker.pull_available();
        assert!(broker.feedback("a1"));
        assert!(broker.pull_available().is_empty());
    }

    #[test]
    fn order_is_preserved_across_enqueue_and_pull() {
        let broker = PendingActionBroker::new();
        broker.enqueue_many(vec![action("a1"), action("a2"), action("a3")]);
        let pulled = broker.pull_available();
        assert_eq!(pulled.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a1", "a2", "a3"]);
    }
}
