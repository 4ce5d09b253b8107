use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry in the event log / SSE fan-out.
///
/// `ts` is milliseconds since the Unix epoch, stamped by `Event::new` at
/// construction time so producers never need to touch the clock directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub ts: u64,
    #[serde(flatten)]
    pub fields: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, fields: Value) -> Self {
        Self {
            event_type: event_type.into(),
            ts: crate::now_ms(),
            fields,
        }
    }

    /// The single choke point for dropping test-tagged telemetry from
    /// subscriber fan-out.
    pub fn is_test(&self) -> bool {
        self.fields
            .get("isTest")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_test_reads_flattened_field() {
        let event = Event::new("chat", json!({ "isTest": true, "cid": "c1" }));
        assert!(event.is_test());
        assert_eq!(event.str_field("cid"), Some("c1"));
    }

    #[test]
    fn is_test_defaults_false_when_absent() {
        let event = Event::new("chat", json!({ "cid": "c1" }));
        assert!(!event.is_test());
    }
}
