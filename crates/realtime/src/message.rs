use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change delivered on a collection feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    Insert,
    Update,
    Delete,
    /// Wildcard, matches every change
    #[serde(rename = "*")]
    All,
}

impl ChannelEvent {
    /// Whether a subscription registered for `self` should receive `event`.
    pub fn accepts(&self, event: ChannelEvent) -> bool {
        *self == ChannelEvent::All || *self == event
    }
}

impl std::fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "*",
        };
        write!(f, "{}", s)
    }
}

/// A stored record together with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub data: Value,
    /// Insertion position inside the collection; stable across updates.
    pub position: u64,
    /// Incremented on every write to this record.
    pub version: u64,
}

impl Document {
    /// Deserialize the record body into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Change notification delivered to subscription callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub collection: String,
    pub key: String,
    #[serde(rename = "type")]
    pub event_type: ChannelEvent,
    /// New state of the record; `None` for deletes.
    pub record: Option<Value>,
    /// Previous state of the record; `None` for inserts.
    pub old_record: Option<Value>,
    /// Store-wide commit counter, strictly increasing.
    pub commit_sequence: u64,
    /// RFC 3339 commit time
    pub commit_timestamp: String,
}

impl Payload {
    /// Deserialize the new record, if any.
    pub fn decode_record<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Option<Result<T, serde_json::Error>> {
        self.record
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_accepts_every_event() {
        assert!(ChannelEvent::All.accepts(ChannelEvent::Insert));
        assert!(ChannelEvent::All.accepts(ChannelEvent::Delete));
        assert!(ChannelEvent::Update.accepts(ChannelEvent::Update));
        assert!(!ChannelEvent::Update.accepts(ChannelEvent::Insert));
    }

    #[test]
    fn event_serializes_in_snake_case() {
        assert_eq!(json!(ChannelEvent::Insert), json!("insert"));
        assert_eq!(json!(ChannelEvent::All), json!("*"));
        assert_eq!(ChannelEvent::Delete.to_string(), "DELETE");
    }
}
