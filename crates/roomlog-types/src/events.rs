use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Events the server pushes over a room connection.
///
/// The wire envelope is `{"type": "...", "data": {...}}`; variant names map
/// to the kebab-case packet names. Log arrays arrive newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Keepalive; must be answered with a `ping-reply` carrying `time`.
    PingEvent { time: i64, next: i64 },

    /// The room requires authentication before further interaction.
    BounceEvent {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Result of a passcode authentication attempt.
    AuthReply {
        success: bool,
        #[serde(default)]
        reason: Option<String>,
    },

    /// The server is closing the connection.
    DisconnectEvent { reason: String },

    /// Recent history delivered on join. Handled identically to `LogReply`.
    SnapshotEvent { log: Vec<Message> },

    /// A page of older history, in response to a `log` request.
    LogReply { log: Vec<Message> },

    /// Full content of a previously truncated message.
    GetMessageReply(Message),
}

/// Packets sent to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientPacket {
    /// Keepalive acknowledgement, echoing the server's timestamp.
    PingReply { time: i64 },

    /// Authenticate with a shared-secret room passcode.
    Auth {
        #[serde(rename = "type")]
        method: String,
        passcode: String,
    },

    /// Request `n` messages older than `before` (absent: newest page).
    Log {
        n: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<String>,
    },

    /// Request the full content of a single message.
    GetMessage { id: String },
}

impl ClientPacket {
    pub fn passcode(passcode: &str) -> Self {
        Self::Auth {
            method: "passcode".to_string(),
            passcode: passcode.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_kebab_case_wire_names() {
        let ev: ServerEvent =
            serde_json::from_str(r#"{"type": "ping-event", "data": {"time": 10, "next": 40}}"#)
                .unwrap();
        assert!(matches!(ev, ServerEvent::PingEvent { time: 10, next: 40 }));

        let ev: ServerEvent =
            serde_json::from_str(r#"{"type": "auth-reply", "data": {"success": false, "reason": "bad passcode"}}"#)
                .unwrap();
        match ev {
            ServerEvent::AuthReply { success, reason } => {
                assert!(!success);
                assert_eq!(reason.as_deref(), Some("bad passcode"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn resolved_message_is_the_packet_payload() {
        let raw = r#"{"type": "get-message-reply", "data": {
            "id": "00a3x2",
            "time": 1438713601,
            "sender": {"id": "agent:b0", "name": "ada", "session_id": "s-1"},
            "content": "full body"
        }}"#;

        let ev: ServerEvent = serde_json::from_str(raw).unwrap();
        match ev {
            ServerEvent::GetMessageReply(msg) => assert_eq!(msg.content, "full body"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn auth_packet_nests_the_method_under_type() {
        let value = serde_json::to_value(ClientPacket::passcode("hunter2")).unwrap();
        assert_eq!(value["type"], "auth");
        assert_eq!(value["data"]["type"], "passcode");
        assert_eq!(value["data"]["passcode"], "hunter2");
    }

    #[test]
    fn log_request_omits_absent_before() {
        let value = serde_json::to_value(ClientPacket::Log { n: 1000, before: None }).unwrap();
        assert_eq!(value["type"], "log");
        assert!(value["data"].get("before").is_none());
    }
}
