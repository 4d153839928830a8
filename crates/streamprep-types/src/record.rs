//! Record model flowing from sources, through preppers, into sinks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type stamped on records that do not declare one.
pub const DEFAULT_EVENT_TYPE: &str = "event";

/// Key under which line-oriented sources store the raw text.
pub const MESSAGE_KEY: &str = "message";

/// Metadata carried alongside a record's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    event_type: String,
    time_received: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

impl RecordMetadata {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            time_received: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn time_received(&self) -> DateTime<Utc> {
        self.time_received
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TYPE)
    }
}

/// Immutable unit of payload plus metadata.
///
/// Stages never mutate a record in place; a prepper that changes the payload
/// produces a new `Record` (see [`Record::map_data`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    data: Value,
    #[serde(default)]
    metadata: RecordMetadata,
}

impl Record {
    pub fn new(data: Value) -> Self {
        Self::with_metadata(data, RecordMetadata::default())
    }

    pub fn with_metadata(data: Value, metadata: RecordMetadata) -> Self {
        Self { data, metadata }
    }

    /// Wrap a line of raw text as `{"message": <line>}`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(MESSAGE_KEY.to_string(), Value::String(message.into()));
        Self::new(Value::Object(map))
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    /// Build a new record from this one's payload, keeping the metadata.
    #[must_use]
    pub fn map_data(&self, f: impl FnOnce(&Value) -> Value) -> Self {
        Self {
            data: f(&self.data),
            metadata: self.metadata.clone(),
        }
    }

    pub fn into_parts(self) -> (Value, RecordMetadata) {
        (self.data, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_message_wraps_line() {
        let record = Record::from_message("hello");
        assert_eq!(record.data(), &json!({"message": "hello"}));
        assert_eq!(record.metadata().event_type(), DEFAULT_EVENT_TYPE);
    }

    #[test]
    fn test_map_data_keeps_metadata_and_original() {
        let metadata = RecordMetadata::new("log").with_attribute("host", json!("a"));
        let original = Record::with_metadata(json!({"n": 1}), metadata);
        let mapped = original.map_data(|_| json!({"n": 2}));

        assert_eq!(original.data(), &json!({"n": 1}));
        assert_eq!(mapped.data(), &json!({"n": 2}));
        assert_eq!(mapped.metadata(), original.metadata());
        assert_eq!(mapped.metadata().attribute("host"), Some(&json!("a")));
    }

    #[test]
    fn test_deserialize_without_metadata_uses_default() {
        let record: Record = serde_json::from_value(json!({"data": {"k": "v"}})).unwrap();
        assert_eq!(record.metadata().event_type(), "event");
        assert!(record.metadata().attributes().is_empty());
    }
}
