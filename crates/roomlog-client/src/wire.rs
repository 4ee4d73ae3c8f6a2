//! Websocket transport for a single room connection.
//!
//! `connect` opens the socket and spawns two tasks: a reader decoding inbound
//! frames into [`ServerEvent`]s, and a writer draining outbound
//! [`ClientPacket`]s. The synchronizer only ever sees the channel pair, so a
//! scripted event feed plugs into the same seam.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use roomlog_types::events::{ClientPacket, ServerEvent};

use crate::ClientError;

/// Inbound event buffer; the synchronizer drains one event at a time.
const EVENT_BUFFER: usize = 64;

/// Event types this client consumes. Anything else on the wire is skipped.
const CONSUMED_EVENTS: [&str; 7] = [
    "ping-event",
    "bounce-event",
    "auth-reply",
    "disconnect-event",
    "snapshot-event",
    "log-reply",
    "get-message-reply",
];

/// Handle to one live room connection.
pub struct RoomHandle {
    events: mpsc::Receiver<ServerEvent>,
    packets: mpsc::UnboundedSender<ClientPacket>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl RoomHandle {
    /// Build a handle from raw channels, with no transport behind it.
    /// Used by scripted tests and alternative transports.
    pub fn from_channels(
        events: mpsc::Receiver<ServerEvent>,
        packets: mpsc::UnboundedSender<ClientPacket>,
    ) -> Self {
        Self {
            events,
            packets,
            reader: None,
            writer: None,
        }
    }

    /// Queue a packet for sending. Fails once the connection is down.
    pub fn send(&self, packet: ClientPacket) -> Result<(), ClientError> {
        self.packets.send(packet).map_err(|_| ClientError::Closed)
    }

    /// Next inbound event; `None` once the connection has closed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// Tear the connection down. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open a websocket connection to `{server}/room/{room}/ws`.
pub async fn connect(server: &str, room: &str) -> Result<RoomHandle, ClientError> {
    let url = format!("{}/room/{}/ws", server.trim_end_matches('/'), room);
    let (socket, _) = tokio_tungstenite::connect_async(&url).await?;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let conn_id = Uuid::new_v4();
    info!("[{}] connected ({})", room, conn_id);

    let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
    let (packets, mut packet_rx) = mpsc::unbounded_channel::<ClientPacket>();

    let writer_room = room.to_string();
    let writer = tokio::spawn(async move {
        // Outbound envelopes carry a per-connection sequence number.
        let mut seq: u64 = 0;
        while let Some(packet) = packet_rx.recv().await {
            let frame = match encode_packet(&packet, seq) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[{}] failed to encode packet: {}", writer_room, e);
                    continue;
                }
            };
            seq += 1;

            if let Err(e) = ws_tx.send(WsMessage::text(frame)).await {
                warn!("[{}] send failed: {}", writer_room, e);
                break;
            }
        }
    });

    let reader_room = room.to_string();
    let reader = tokio::spawn(async move {
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(WsMessage::Text(text)) => match decode_event(text.as_str()) {
                    Decoded::Event(event) => {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Decoded::Skipped(kind) => {
                        trace!("[{}] skipping {} packet", reader_room, kind);
                    }
                    Decoded::Malformed(err) => {
                        warn!("[{}] malformed packet: {}", reader_room, err);
                        let _ = event_tx
                            .send(ServerEvent::DisconnectEvent {
                                reason: format!("malformed packet: {err}"),
                            })
                            .await;
                        break;
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    debug!("[{}] server closed the socket: {:?}", reader_room, frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[{}] transport error: {}", reader_room, e);
                    let _ = event_tx
                        .send(ServerEvent::DisconnectEvent {
                            reason: format!("transport error: {e}"),
                        })
                        .await;
                    break;
                }
            }
        }
        // Dropping event_tx closes the event stream for the synchronizer.
    });

    Ok(RoomHandle {
        events,
        packets,
        reader: Some(reader),
        writer: Some(writer),
    })
}

fn encode_packet(packet: &ClientPacket, seq: u64) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(packet)?;
    if let Value::Object(map) = &mut value {
        map.insert("id".to_string(), Value::String(seq.to_string()));
    }
    Ok(value.to_string())
}

enum Decoded {
    Event(ServerEvent),
    Skipped(String),
    Malformed(String),
}

/// Decode one inbound frame.
///
/// Server packets carry envelope fields beyond `type`/`data` (packet id,
/// server time); only the tagged pair is fed to serde. Event types outside
/// the consumed set are skipped, a consumed type with a bad payload is a
/// protocol failure.
fn decode_event(raw: &str) -> Decoded {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return Decoded::Malformed(e.to_string()),
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Decoded::Malformed("packet has no type".to_string());
    };
    if !CONSUMED_EVENTS.contains(&kind) {
        return Decoded::Skipped(kind.to_string());
    }

    let envelope = serde_json::json!({
        "type": value.get("type"),
        "data": value.get("data"),
    });
    match serde_json::from_value::<ServerEvent>(envelope) {
        Ok(event) => Decoded::Event(event),
        Err(e) => Decoded::Malformed(format!("{kind}: {e}")),
    }
}
