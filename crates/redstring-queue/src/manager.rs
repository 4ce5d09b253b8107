use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use redstring_types::{QueueItem, QueueMetrics, QueueStatus};

use crate::error::QueueError;

const DEFAULT_LEASE_TTL_MS: u64 = 30_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// The four named queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Goal,
    Task,
    Patch,
    Review,
}

impl QueueName {
    const ALL: [QueueName; 4] = [QueueName::Goal, QueueName::Task, QueueName::Patch, QueueName::Review];

    fn as_str(&self) -> &'static str {
        match self {
            QueueName::Goal => "goalQueue",
            QueueName::Task => "taskQueue",
            QueueName::Patch => "patchQueue",
            QueueName::Review => "reviewQueue",
        }
    }
}

#[derive(Default)]
pub struct PullOptions {
    pub partition_key: Option<String>,
    pub max: usize,
    pub filter: Option<Box<dyn Fn(&QueueItem) -> bool + Send + Sync>>,
}

impl PullOptions {
    pub fn new(max: usize) -> Self {
        Self {
            partition_key: None,
            max,
            filter: None,
        }
    }

    fn matches(&self, item: &QueueItem) -> bool {
        match &self.filter {
            Some(f) => f(item),
            None => true,
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueueItem>,
    total_enqueued: usize,
    partition_cursor: usize,
}

impl QueueState {
    fn pull(&mut self, opts: &PullOptions, lease_ttl_ms: u64, now: u64) -> Vec<QueueItem> {
        let mut picked = Vec::new();

        if let Some(pk) = &opts.partition_key {
            for item in self.items.iter_mut() {
                if picked.len() >= opts.max {
                    break;
                }
                if &item.partition_key == pk && item.status == QueueStatus::Queued && opts.matches(item) {
                    lease_item(item, lease_ttl_ms, now);
                    picked.push(item.clone());
                }
            }
            return picked;
        }

        let mut partitions: Vec<String> = Vec::new();
        for item in &self.items {
            if item.status == QueueStatus::Queued && !partitions.contains(&item.partition_key) {
                partitions.push(item.partition_key.clone());
            }
        }
        if partitions.is_empty() {
            return picked;
        }
        let start = self.partition_cursor % partitions.len();
        partitions.rotate_left(start);
        self.partition_cursor = self.partition_cursor.wrapping_add(1);

        let mut made_progress = true;
        while picked.len() < opts.max && made_progress {
            made_progress = false;
            for pk in &partitions {
                if picked.len() >= opts.max {
                    break;
                }
                if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|i| &i.partition_key == pk && i.status == QueueStatus::Queued && opts.matches(i))
                {
                    lease_item(item, lease_ttl_ms, now);
                    picked.push(item.clone());
                    made_progress = true;
                }
            }
        }
        picked
    }

    fn metrics(&self) -> QueueMetrics {
        let mut metrics = QueueMetrics {
            total_enqueued: self.total_enqueued,
            ..Default::default()
        };
        for item in &self.items {
            match item.status {
                QueueStatus::Queued => metrics.queued += 1,
                QueueStatus::Leased => metrics.leased += 1,
                QueueStatus::Done => metrics.done += 1,
                QueueStatus::Failed => metrics.failed += 1,
            }
        }
        metrics.depth = metrics.queued + metrics.leased;
        metrics
    }
}

fn lease_item(item: &mut QueueItem, lease_ttl_ms: u64, now: u64) {
    item.status = QueueStatus::Leased;
    item.lease_id = Some(Uuid::new_v4().to_string());
    item.leased_until = Some(now + lease_ttl_ms);
}

/// In-memory, lease-based manager over the four named queues. Cloning is
/// cheap: all state lives behind an `Arc`, so handlers and the background
/// lease sweeper share one manager.
#[derive(Clone)]
pub struct QueueManager {
    queues: Arc<HashMap<QueueName, Mutex<QueueState>>>,
    lease_ttl_ms: u64,
    max_attempts: u32,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL_MS, DEFAULT_MAX_ATTEMPTS)
    }
}

impl QueueManager {
    pub fn new(lease_ttl_ms: u64, max_attempts: u32) -> Self {
        let queues = QueueName::ALL
            .into_iter()
            .map(|name| (name, Mutex::new(QueueState::default())))
            .collect();
        Self {
            queues: Arc::new(queues),
            lease_ttl_ms,
            max_attempts,
        }
    }

    fn state(&self, name: QueueName) -> &Mutex<QueueState> {
        self.queues.get(&name).expect("all QueueName variants are pre-seeded")
    }

    pub async fn enqueue(&self, name: QueueName, item_type: impl Into<String>, partition_key: impl Into<String>, payload: Value) -> String {
        let id = Uuid::new_v4().to_string();
        let now = redstring_types::now_ms();
        let item = QueueItem {
            id: id.clone(),
            item_type: item_type.into(),
            payload,
            partition_key: partition_key.into(),
            status: QueueStatus::Queued,
            attempts: 0,
            leased_until: None,
            lease_id: None,
            enqueued_at: now,
        };
        let mut state = self.state(name).lock().await;
        state.items.push(item);
        state.total_enqueued += 1;
        tracing::debug!(queue = name.as_str(), id = %id, "enqueued item");
        id
    }

    pub async fn pull(&self, name: QueueName, opts: PullOptions) -> Vec<QueueItem> {
        let now = redstring_types::now_ms();
        let mut state = self.state(name).lock().await;
        state.pull(&opts, self.lease_ttl_ms, now)
    }

    pub async fn ack(&self, name: QueueName, lease_id: &str) -> Result<(), QueueError> {
        let mut state = self.state(name).lock().await;
        let item = state
            .items
            .iter_mut()
            .find(|i| i.lease_id.as_deref() == Some(lease_id))
            .ok_or_else(|| QueueError::UnknownLease(lease_id.to_string()))?;
        item.status = QueueStatus::Done;
        item.lease_id = None;
        item.leased_until = None;
        Ok(())
    }

    /// `retriable = false` forces a straight-to-`failed` transition
    /// regardless of attempt count.
    pub async fn nack(&self, name: QueueName, lease_id: &str, retriable: bool) -> Result<(), QueueError> {
        let mut state = self.state(name).lock().await;
        let item = state
            .items
            .iter_mut()
            .find(|i| i.lease_id.as_deref() == Some(lease_id))
            .ok_or_else(|| QueueError::UnknownLease(lease_id.to_string()))?;
        item.attempts += 1;
        if retriable && item.attempts < self.max_attempts {
            item.status = QueueStatus::Queued;
            item.lease_id = None;
            item.leased_until = None;
        } else {
            item.status = QueueStatus::Failed;
            item.lease_id = None;
            item.leased_until = None;
        }
        Ok(())
    }

    pub async fn metrics(&self, name: QueueName) -> QueueMetrics {
        self.state(name).lock().await.metrics()
    }

    /// Peek/debug only — the returned snapshot must never be mutated back
    /// into the queue.
    pub async fn get_queue(&self, name: QueueName) -> Vec<QueueItem> {
        self.state(name).lock().await.items.clone()
    }

    /// Reclaims any item whose lease has expired, across every queue,
    /// back to `queued`. Per-partition ordering is preserved since items
    /// are mutated in place rather than moved.
    pub async fn sweep_expired_leases(&self) -> usize {
        let now = redstring_types::now_ms();
        let mut reclaimed = 0;
        for name in QueueName::ALL {
            let mut state = self.state(name).lock().await;
            for item in state.items.iter_mut() {
                if item.is_lease_expired(now) {
                    item.status = QueueStatus::Queued;
                    item.lease_id = None;
                    item.leased_until = None;
                    reclaimed += 1;
                }
            }
        }
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "reclaimed expired leases");
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_pull_ack_moves_item_to_done() {
        let manager = QueueManager::new(30_000, 3);
        manager.enqueue(QueueName::Goal, "goal", "cid-1", json!({"goal": "hi"})).await;
        let items = manager.pull(QueueName::Goal, PullOptions::new(10)).await;
        assert_eq!(items.len(), 1);
        let lease_id = items[0].lease_id.clone().unwrap();
        manager.ack(QueueName::Goal, &lease_id).await.unwrap();
        let metrics = manager.metrics(QueueName::Goal).await;
        assert_eq!(metrics.done, 1);
        assert_eq!(metrics.queued, 0);
        assert_eq!(metrics.total_enqueued, 1);
    }

    #[tokio::test]
    async fn nack_retries_then_fails() {
        let manager = QueueManager::new(30_000, 2);
        manager.enqueue(QueueName::Task, "task", "cid-1", json!({})).await;
        for expected_status_failed in [false, true] {
            let items = manager.pull(QueueName::Task, PullOptions::new(10)).await;
            assert_eq!(items.len(), 1);
            let lease_id = items[0].lease_id.clone().unwrap();
            manager.nack(QueueName::Task, &lease_id, true).await.unwrap();
            let metrics = manager.metrics(QueueName::Task).await;
            if expected_status_failed {
                assert_eq!(metrics.failed, 1);
            } else {
                assert_eq!(metrics.queued, 1);
            }
        }
    }

    #[tokio::test]
    async fn nack_non_retriable_fails_immediately() {
        let manager = QueueManager::new(30_000, 5);
        manager.enqueue(QueueName::Patch, "patch", "cid-1", json!({})).await;
        let items = manager.pull(QueueName::Patch, PullOptions::new(10)).await;
        let lease_id = items[0].lease_id.clone().unwrap();
        manager.nack(QueueName::Patch, &lease_id, false).await.unwrap();
        let metrics = manager.metrics(QueueName::Patch).await;
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.queued, 0);
    }

    #[tokio::test]
    async fn pull_round_robins_across_partitions() {
        let manager = QueueManager::new(30_000, 3);
        manager.enqueue(QueueName::Review, "review", "cid-a", json!({})).await;
        manager.enqueue(QueueName::Review, "review", "cid-a", json!({})).await;
        manager.enqueue(QueueName::Review, "review", "cid-b", json!({})).await;
        let items = manager.pull(QueueName::Review, PullOptions::new(2)).await;
        let partitions: Vec<&str> = items.iter().map(|i| i.partition_key.as_str()).collect();
        assert!(partitions.contains(&"cid-a"));
        assert!(partitions.contains(&"cid-b"));
    }

    #[tokio::test]
    async fn lease_sweep_reclaims_expired_items() {
        let manager = QueueManager::new(0, 3);
        manager.enqueue(QueueName::Goal, "goal", "cid-1", json!({})).await;
        manager.pull(QueueName::Goal, PullOptions::new(10)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let reclaimed = manager.sweep_expired_leases().await;
        assert_eq!(reclaimed, 1);
        let metrics = manager.metrics(QueueName::Goal).await;
        assert_eq!(metrics.queued, 1);
        assert_eq!(metrics.leased, 0);
    }
}
