//! Per-room synchronization state machine.
//!
//! One downloader owns one room connection for one pass: it pages backward
//! through history until it reaches messages it already has (or the beginning
//! of the room), resolves server-truncated messages along the way, and merges
//! everything into the archive through idempotent upserts. A failed pass is
//! safe to re-run: the resume cursor keeps a later pass from re-fetching what
//! is already stored.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use roomlog_client::RoomHandle;
use roomlog_db::Database;
use roomlog_types::events::{ClientPacket, ServerEvent};
use roomlog_types::models::Message;

use crate::SyncConfig;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level failure, including a server-initiated disconnect
    /// mid-pass. Terminal for this pass; a later `update` resumes.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("room requires a passcode but none is configured")]
    MissingCredentials,

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("no event received within {0:?}")]
    Timeout(Duration),
}

/// Where a pass currently is. `Closed` is reached exactly once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Connected, nothing received yet.
    Connecting,
    /// Access challenge answered, waiting for the verdict.
    Authenticating,
    /// Walking history pages backward.
    Paginating,
    /// Pagination done, waiting on outstanding truncation resolutions.
    Draining,
    Closed,
}

/// What a completed pass accomplished.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub room: String,
    /// Messages written that were not yet stored.
    pub new_messages: u64,
    /// Truncated messages resolved to their full content.
    pub resolved: u64,
}

pub struct Downloader {
    room: String,
    passcode: Option<String>,
    db: Arc<Database>,
    handle: RoomHandle,
    page_size: u32,
    idle_timeout: Duration,

    state: SyncState,
    /// Newest stored id at pass start; anything at or below is already known.
    cursor: Option<String>,
    /// Pagination has terminated; the pass may still be draining truncations.
    end_of_stream: bool,
    /// Resolve requests in flight.
    outstanding: u64,
    report: SyncReport,
}

impl Downloader {
    pub fn new(
        room: &str,
        passcode: Option<String>,
        db: Arc<Database>,
        handle: RoomHandle,
        config: &SyncConfig,
    ) -> Self {
        Self {
            room: room.to_string(),
            passcode,
            db,
            handle,
            page_size: config.page_size,
            idle_timeout: config.idle_timeout,
            state: SyncState::Connecting,
            cursor: None,
            end_of_stream: false,
            outstanding: 0,
            report: SyncReport {
                room: room.to_string(),
                new_messages: 0,
                resolved: 0,
            },
        }
    }

    /// Drive the pass to completion. The connection is torn down on every
    /// exit path before this returns.
    pub async fn run(mut self) -> Result<SyncReport, SyncError> {
        let db = self.db.clone();
        let room = self.room.clone();
        self.cursor = tokio::task::spawn_blocking(move || db.newest_message_id(&room))
            .await
            .map_err(|e| SyncError::Storage(anyhow!("storage task failed: {e}")))?
            .map_err(SyncError::Storage)?;

        match &self.cursor {
            Some(id) => info!("[{}] resuming above {}", self.room, id),
            None => info!("[{}] no stored messages, downloading full history", self.room),
        }

        let outcome = self.event_loop().await;
        self.handle.close();
        outcome?;

        Ok(self.report)
    }

    async fn event_loop(&mut self) -> Result<(), SyncError> {
        while self.state != SyncState::Closed {
            let event = match timeout(self.idle_timeout, self.handle.next_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.state = SyncState::Closed;
                    return Err(SyncError::Connection("event stream closed".to_string()));
                }
                Err(_) => {
                    self.state = SyncState::Closed;
                    return Err(SyncError::Timeout(self.idle_timeout));
                }
            };
            self.handle_event(event).await?;
        }
        Ok(())
    }

    /// Events are handled strictly one at a time; nothing else mutates the
    /// room's state while a handler runs.
    async fn handle_event(&mut self, event: ServerEvent) -> Result<(), SyncError> {
        match event {
            ServerEvent::PingEvent { time, next } => {
                self.send(ClientPacket::PingReply { time })?;
                debug!("[{}] ping acknowledged at {}, next expected {}", self.room, time, next);
            }

            ServerEvent::BounceEvent { reason } => match self.passcode.clone() {
                Some(passcode) => {
                    info!(
                        "[{}] access challenge ({}), authenticating",
                        self.room,
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    self.send(ClientPacket::passcode(&passcode))?;
                    self.state = SyncState::Authenticating;
                }
                None => {
                    warn!("[{}] access challenge but no passcode configured", self.room);
                    self.state = SyncState::Closed;
                    return Err(SyncError::MissingCredentials);
                }
            },

            ServerEvent::AuthReply { success, reason } => {
                if success {
                    debug!("[{}] authenticated", self.room);
                } else {
                    let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                    self.state = SyncState::Closed;
                    return Err(SyncError::AuthRejected(reason));
                }
            }

            // Unconditional: a disconnect overrides any in-flight pagination.
            ServerEvent::DisconnectEvent { reason } => {
                warn!("[{}] server disconnected: {}", self.room, reason);
                self.state = SyncState::Closed;
                return Err(SyncError::Connection(format!("server disconnected: {reason}")));
            }

            ServerEvent::SnapshotEvent { log } | ServerEvent::LogReply { log } => {
                self.handle_page(log).await?;
            }

            ServerEvent::GetMessageReply(msg) => {
                self.handle_resolved(msg).await?;
            }
        }
        Ok(())
    }

    /// Pagination step, once per received batch. Batches are newest-first.
    async fn handle_page(&mut self, log: Vec<Message>) -> Result<(), SyncError> {
        if matches!(self.state, SyncState::Connecting | SyncState::Authenticating) {
            self.state = SyncState::Paginating;
        }

        if log.is_empty() {
            info!("[{}] end of history, nothing left to fetch", self.room);
            self.mark_end_of_stream();
            return Ok(());
        }

        // Walk newest to oldest. The first id at or below the cursor proves
        // everything further back is already stored.
        let mut fresh = log;
        let mut hit_cursor = false;
        if let Some(cursor) = self.cursor.as_deref() {
            if let Some(pos) = fresh.iter().position(|msg| msg.id.as_str() <= cursor) {
                debug!("[{}] reached stored history at {}", self.room, fresh[pos].id);
                fresh.truncate(pos);
                hit_cursor = true;
            }
        }

        let truncated: Vec<String> = fresh
            .iter()
            .filter(|msg| msg.truncated)
            .map(|msg| msg.id.clone())
            .collect();
        let oldest = fresh.last().map(|msg| msg.id.clone());
        let stored = fresh.len() as u64;

        if !fresh.is_empty() {
            let db = self.db.clone();
            let room = self.room.clone();
            tokio::task::spawn_blocking(move || db.upsert_page(&room, &fresh))
                .await
                .map_err(|e| SyncError::Storage(anyhow!("storage task failed: {e}")))?
                .map_err(SyncError::Storage)?;
            self.report.new_messages += stored;
        }

        // Placeholders are on disk; ask for the full bodies.
        for id in truncated {
            debug!("[{}] resolving truncated message {}", self.room, id);
            self.send(ClientPacket::GetMessage { id })?;
            self.outstanding += 1;
        }

        if hit_cursor {
            self.mark_end_of_stream();
        } else if let Some(before) = oldest {
            debug!("[{}] requesting {} messages before {}", self.room, self.page_size, before);
            self.send(ClientPacket::Log {
                n: self.page_size,
                before: Some(before),
            })?;
        }

        Ok(())
    }

    /// A truncated placeholder resolved to its full content.
    async fn handle_resolved(&mut self, msg: Message) -> Result<(), SyncError> {
        debug!("[{}] resolved {}", self.room, msg.id);

        let db = self.db.clone();
        let room = self.room.clone();
        tokio::task::spawn_blocking(move || db.upsert_message(&room, &msg))
            .await
            .map_err(|e| SyncError::Storage(anyhow!("storage task failed: {e}")))?
            .map_err(SyncError::Storage)?;

        self.report.resolved += 1;
        self.outstanding = self.outstanding.saturating_sub(1);

        if self.outstanding == 0 && self.end_of_stream {
            info!("[{}] last truncated message resolved", self.room);
            self.state = SyncState::Closed;
        }
        Ok(())
    }

    /// Pagination is done. The room stays open while resolutions are in
    /// flight; closing early would leave truncated placeholders stored.
    fn mark_end_of_stream(&mut self) {
        self.end_of_stream = true;
        if self.outstanding == 0 {
            info!(
                "[{}] synchronized, {} new messages",
                self.room, self.report.new_messages
            );
            self.state = SyncState::Closed;
        } else {
            debug!(
                "[{}] pagination done, waiting on {} truncated messages",
                self.room, self.outstanding
            );
            self.state = SyncState::Draining;
        }
    }

    fn send(&mut self, packet: ClientPacket) -> Result<(), SyncError> {
        self.handle.send(packet).map_err(|_| {
            SyncError::Connection("packet channel closed".to_string())
        })
    }
}
