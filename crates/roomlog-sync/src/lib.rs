pub mod downloader;
pub mod fleet;

use std::time::Duration;

pub use downloader::{Downloader, SyncError, SyncReport, SyncState};
pub use fleet::{Fleet, RoomOutcome};

/// Tunables shared by every room synchronizer in a run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Websocket base URL, e.g. `wss://chat.example.org`.
    pub server: String,
    /// Messages requested per history page.
    pub page_size: u32,
    /// A pass fails if no event arrives within this window. Keepalives come
    /// far more often, so only a dead or wedged connection trips it.
    pub idle_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server: "wss://chat.example.org".to_string(),
            page_size: 1000,
            idle_timeout: Duration::from_secs(90),
        }
    }
}
