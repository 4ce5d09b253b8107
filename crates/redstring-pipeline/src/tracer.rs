//! Per-`cid` execution tracer. Stage timestamps use the
//! same wall-clock millisecond source as the rest of the core so
//! invariant 5 (non-decreasing per stage name per `cid`) holds without a
//! separate monotonic clock.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use redstring_types::{Stage, StageRecord, StageStatus, Trace};

const DEFAULT_MAX_TRACES: usize = 2_000;

#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub cid: String,
    pub message: String,
    pub started_at: u64,
    pub stage_count: usize,
    pub last_status: Option<StageStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TracerStats {
    pub trace_count: usize,
    pub stage_count: usize,
    pub error_count: usize,
}

struct TracerState {
    traces: HashMap<String, Trace>,
    insertion_order: VecDeque<String>,
    max_traces: usize,
}

impl TracerState {
    fn evict_if_needed(&mut self) {
        while self.insertion_order.len() > self.max_traces {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.traces.remove(&oldest);
            }
        }
    }
}

pub struct Tracer {
    state: RwLock<TracerState>,
}

impl Tracer {
    pub fn new(max_traces: usize) -> Self {
        Self {
            state: RwLock::new(TracerState {
                traces: HashMap::new(),
                insertion_order: VecDeque::new(),
                max_traces,
            }),
        }
    }

    pub fn start_trace(&self, cid: &str, message: &str, context: Option<Value>) {
        let mut state = self.state.write();
        if !state.traces.contains_key(cid) {
            state.insertion_order.push_back(cid.to_string());
        }
        state.traces.insert(cid.to_string(), Trace::new(cid, message, context));
        state.evict_if_needed();
    }

    pub fn record_stage(&self, cid: &str, stage: Stage, data: Option<Value>) {
        let mut state = self.state.write();
        if let Some(trace) = state.traces.get_mut(cid) {
            trace.push_stage(StageRecord {
                stage,
                started_at: redstring_types::now_ms(),
                ended_at: None,
                status: StageStatus::Start,
                data,
            });
        }
    }

    pub fn complete_stage(&self, cid: &str, stage: Stage, status: StageStatus, data: Option<Value>) {
        let mut state = self.state.write();
        if let Some(trace) = state.traces.get_mut(cid) {
            let ended_at = redstring_types::now_ms();
            if let Some(record) = trace.stages.iter_mut().rev().find(|r| r.stage == stage && r.status == StageStatus::Start) {
                record.ended_at = Some(ended_at);
                record.status = status;
                record.data = data;
            } else {
                // stage never recorded as started; keep the record anyway for visibility
                trace.push_stage(StageRecord {
                    stage,
                    started_at: ended_at,
                    ended_at: Some(ended_at),
                    status,
                    data,
                });
            }
        }
    }

    pub fn get_trace(&self, cid: &str) -> Option<Trace> {
        self.state.read().traces.get(cid).cloned()
    }

    pub fn get_stage(&self, cid: &str, stage: Stage) -> Option<StageRecord> {
        self.state
            .read()
            .traces
            .get(cid)
            .and_then(|trace| trace.stages.iter().rev().find(|r| r.stage == stage).cloned())
    }

    pub fn get_recent_traces(&self, limit: usize) -> Vec<TraceSummary> {
        let state = self.state.read();
        state
            .insertion_order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|cid| state.traces.get(cid))
            .map(summarize)
            .collect()
    }

    pub fn get_trace_summary(&self, cid: &str) -> Option<TraceSummary> {
        self.state.read().traces.get(cid).map(summarize)
    }

    pub fn get_stats(&self) -> TracerStats {
        let state = self.state.read();
        let stage_count = state.traces.values().map(|t| t.stages.len()).sum();
        let error_count = state
            .traces
            .values()
            .flat_map(|t| t.stages.iter())
            .filter(|s| s.status == StageStatus::Error)
            .count();
        TracerStats {
            trace_count: state.traces.len(),
            stage_count,
            error_count,
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACES)
    }
}

fn summarize(trace: &Trace) -> TraceSummary {
    TraceSummary {
        cid: trace.cid.clone(),
        message: trace.message.clone(),
        started_at: trace.started_at,
        stage_count: trace.stages.len(),
        last_status: trace.stages.last().map(|s| s.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_complete_stage_updates_same_record() {
        let tracer = Tracer::new(10);
        tracer.start_trace("c1", "hello", None);
        tracer.record_stage("c1", Stage::Planner, None);
        tracer.complete_stage("c1", Stage::Planner, StageStatus::Success, None);
        let trace = tracer.get_trace("c1").unwrap();
        assert_eq!(trace.stages.len(), 1);
        assert_eq!(trace.stages[0].status, StageStatus::Success);
        assert!(trace.stages[0].ended_at.is_some());
    }

    #[test]
    fn eviction_drops_oldest_trace_beyond_cap() {
        let tracer = Tracer::new(2);
        tracer.start_trace("c1", "a", None);
        tracer.start_trace("c2", "b", None);
        tracer.start_trace("c3", "c", None);
        assert!(tracer.get_trace("c1").is_none());
        assert!(tracer.get_trace("c3").is_some());
    }

    #[test]
    fn stats_counts_errors_across_traces() {
        let tracer = Tracer::new(10);
        tracer.start_trace("c1", "a", None);
        tracer.record_stage("c1", Stage::Auditor, None);
        tracer.complete_stage("c1", Stage::Auditor, StageStatus::Error, None);
        let stats = tracer.get_stats();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.trace_count, 1);
    }
}
