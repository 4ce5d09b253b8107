use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stage names, fixed to the four pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planner,
    Executor,
    Auditor,
    Committer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Start,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One record per `cid`; each stage name's timestamps must be
/// non-decreasing across successive records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub cid: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub started_at: u64,
    pub stages: Vec<StageRecord>,
}

impl Trace {
    pub fn new(cid: impl Into<String>, message: impl Into<String>, context: Option<Value>) -> Self {
        Self {
            cid: cid.into(),
            message: message.into(),
            context,
            started_at: crate::now_ms(),
            stages: Vec::new(),
        }
    }

    /// Last recorded timestamp for `stage`, used to enforce invariant 5
    /// before appending a new record for the same stage.
    pub fn last_timestamp_for(&self, stage: Stage) -> Option<u64> {
        self.stages
            .iter()
            .rev()
            .find(|record| record.stage == stage)
            .map(|record| record.started_at)
    }

    pub fn push_stage(&mut self, record: StageRecord) {
        self.stages.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_timestamp_for_finds_most_recent_matching_stage() {
        let mut trace = Trace::new("cid-1", "do the thing", None);
        trace.push_stage(StageRecord {
            stage: Stage::Planner,
            started_at: 10,
            ended_at: Some(20),
            status: StageStatus::Success,
            data: None,
        });
        trace.push_stage(StageRecord {
            stage: Stage::Executor,
            started_at: 25,
            ended_at: None,
            status: StageStatus::Start,
            data: None,
        });
        assert_eq!(trace.last_timestamp_for(Stage::Planner), Some(10));
        assert_eq!(trace.last_timestamp_for(Stage::Committer), None);
    }
}
