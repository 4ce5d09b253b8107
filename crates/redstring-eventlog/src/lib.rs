//! Append-only event ring with subscriber fan-out for SSE.
//! Grounded on a broadcast-channel event bus, generalized with a bounded
//! ring buffer so `replaySince` can rehydrate chat history on startup.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use redstring_types::Event;

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_CHANNEL_CAPACITY: usize = 2_048;

struct Ring {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Ring {
    fn push(&mut self, event: Event) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Clone-cheap handle: the ring and broadcast sender both live behind
/// shared state, so every handler and background task shares one log.
#[derive(Clone)]
pub struct EventLog {
    ring: Arc<Mutex<Ring>>,
    tx: broadcast::Sender<Event>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            ring: Arc::new(Mutex::new(Ring {
                events: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
            })),
            tx,
        }
    }

    /// Always stores the event (so test tooling that explicitly asks via
    /// `replaySince` can still see `isTest` events), but drops `isTest:
    /// true` events before fan-out — the single choke point
    /// so regular subscribers never see test telemetry
    /// (invariant 7).
    pub fn append(&self, event: Event) {
        let is_test = event.is_test();
        self.ring.lock().push(event.clone());
        if !is_test {
            // A broadcast send errors only when there are no receivers;
            // that's not a failure for a publish-and-forget log.
            let _ = self.tx.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// A `Stream` of fan-out events suitable for wiring directly into an
    /// SSE response body; a lagging subscriber observes `Err(Lagged(n))`
    /// rather than blocking the publisher.
    pub fn subscribe_stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn replay_since(&self, ts: u64) -> Vec<Event> {
        self.ring
            .lock()
            .events
            .iter()
            .filter(|event| event.ts >= ts)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replay_since_returns_events_at_or_after_threshold() {
        let log = EventLog::new(10);
        log.append(Event { event_type: "a".to_string(), ts: 100, fields: json!({}) });
        log.append(Event { event_type: "b".to_string(), ts: 200, fields: json!({}) });
        let replayed = log.replay_since(150);
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].event_type, "b");
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let log = EventLog::new(2);
        for i in 0..5 {
            log.append(Event { event_type: "e".to_string(), ts: i, fields: json!({}) });
        }
        assert_eq!(log.len(), 2);
        let replayed = log.replay_since(0);
        assert_eq!(replayed.iter().map(|e| e.ts).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn is_test_events_stored_but_never_fanned_out() {
        let log = EventLog::new(10);
        let mut rx = log.subscribe();
        log.append(Event { event_type: "chat".to_string(), ts: 1, fields: json!({"isTest": true}) });
        log.append(Event { event_type: "chat".to_string(), ts: 2, fields: json!({"isTest": false}) });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.ts, 2);
        assert_eq!(log.replay_since(0).len(), 2);
    }
}
