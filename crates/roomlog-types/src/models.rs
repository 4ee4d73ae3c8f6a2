use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message as delivered by the server.
///
/// Ids are server-assigned, fixed-width, and totally ordered within a room:
/// a lexicographic comparison of two ids agrees with their recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Parent message id; messages with no parent are top-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Unix timestamp (seconds) at which the message was sent.
    pub time: i64,
    pub sender: Sender,
    pub content: String,
    /// The server elided the content of this message; a resolve-message
    /// round trip fetches the full body.
    #[serde(default)]
    pub truncated: bool,
}

impl Message {
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.time, 0).unwrap_or_default()
    }
}

/// The identity that authored a message at the time of sending.
///
/// A session is per-connection, not a stable user identity; the same user id
/// shows up under many session ids over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    /// Underlying user id.
    pub id: String,
    /// Display name at the time of sending.
    pub name: String,
    pub session_id: String,
    /// Tri-state: the server omits the field when the flag is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_staff: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_manager: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_default_when_absent() {
        let raw = r#"{
            "id": "00a3x1",
            "time": 1438713600,
            "sender": {"id": "agent:b0", "name": "ada", "session_id": "s-1"},
            "content": "hello"
        }"#;

        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.parent, None);
        assert!(!msg.truncated);
        assert_eq!(msg.sender.is_staff, None);
        assert_eq!(msg.sender.is_manager, None);
    }

    #[test]
    fn truncated_flag_roundtrips() {
        let raw = r#"{
            "id": "00a3x2",
            "time": 1438713601,
            "sender": {"id": "agent:b0", "name": "ada", "session_id": "s-1", "is_staff": true},
            "content": "",
            "truncated": true
        }"#;

        let msg: Message = serde_json::from_str(raw).unwrap();
        assert!(msg.truncated);
        assert_eq!(msg.sender.is_staff, Some(true));
    }
}
