use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a [`QueueItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Leased,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub payload: Value,
    pub partition_key: String,
    pub status: QueueStatus,
    pub attempts: u32,
    pub leased_until: Option<u64>,
    pub lease_id: Option<String>,
    pub enqueued_at: u64,
}

impl QueueItem {
    pub fn is_lease_expired(&self, now: u64) -> bool {
        self.status == QueueStatus::Leased && self.leased_until.is_some_and(|until| until <= now)
    }
}

/// Per-queue counters. `queued + leased + done +
/// failed` must equal `total_enqueued` at all times (Testable Property 4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub depth: usize,
    pub queued: usize,
    pub leased: usize,
    pub done: usize,
    pub failed: usize,
    pub total_enqueued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_expiry_only_applies_to_leased_items() {
        let mut item = QueueItem {
            id: "i1".to_string(),
            item_type: "goal".to_string(),
            payload: Value::Null,
            partition_key: "cid-1".to_string(),
            status: QueueStatus::Queued,
            attempts: 0,
            leased_until: Some(10),
            lease_id: None,
            enqueued_at: 0,
        };
        assert!(!item.is_lease_expired(100));
        item.status = QueueStatus::Leased;
        assert!(item.is_lease_expired(100));
        assert!(!item.is_lease_expired(5));
    }
}
