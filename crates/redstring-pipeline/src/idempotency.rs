//! Bounded, insertion-ordered id ring shared by the Auditor (idempotency
//! check) and Committer (idempotent re-apply guard), shaped like the
//! Tracer's bounded map.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

struct RingState {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

#[derive(Clone)]
pub struct IdRing {
    state: Arc<Mutex<RingState>>,
}

impl IdRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RingState {
                seen: HashSet::new(),
                order: VecDeque::new(),
                capacity,
            })),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().seen.contains(id)
    }

    /// Returns `true` if `id` was newly inserted, `false` if already seen.
    pub fn insert(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut state = self.state.lock();
        if !state.seen.insert(id.clone()) {
            return false;
        }
        state.order.push_back(id);
        while state.order.len() > state.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Default for IdRing {
    fn default() -> Self {
        Self::new(2_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_of_same_id_returns_false() {
        let ring = IdRing::new(10);
        assert!(ring.insert("p1"));
        assert!(!ring.insert("p1"));
        assert!(ring.contains("p1"));
    }

    #[test]
    fn eviction_forgets_oldest_beyond_capacity() {
        let ring = IdRing::new(2);
        ring.insert("p1");
        ring.insert("p2");
        ring.insert("p3");
        assert!(!ring.contains("p1"));
        assert!(ring.contains("p3"));
    }
}
