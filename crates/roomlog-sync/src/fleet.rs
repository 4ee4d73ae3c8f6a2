//! Multi-room scheduler.
//!
//! Launches one synchronizer per room, in the order given, with admission
//! bounded by a counting semaphore: launching suspends until a slot frees,
//! never by polling. Rooms complete independently; one room's failure never
//! aborts the run.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use roomlog_db::Database;
use roomlog_db::models::RoomRow;

use crate::SyncConfig;
use crate::downloader::{Downloader, SyncError, SyncReport};

/// Per-room result of a fleet run.
#[derive(Debug)]
pub struct RoomOutcome {
    pub room: String,
    pub result: Result<SyncReport, SyncError>,
}

pub struct Fleet {
    db: Arc<Database>,
    config: SyncConfig,
}

impl Fleet {
    pub fn new(db: Arc<Database>, config: SyncConfig) -> Self {
        Self { db, config }
    }

    /// Synchronize every room, at most `limit` concurrently. Returns once
    /// all workers have finished, with one outcome per room in launch order.
    pub async fn run(&self, rooms: Vec<RoomRow>, limit: usize) -> Vec<RoomOutcome> {
        let db = self.db.clone();
        let config = self.config.clone();
        run_bounded(rooms, limit, move |room| {
            sync_room(db.clone(), config.clone(), room)
        })
        .await
    }
}

/// One full synchronization pass for one room.
async fn sync_room(
    db: Arc<Database>,
    config: SyncConfig,
    room: RoomRow,
) -> Result<SyncReport, SyncError> {
    let handle = roomlog_client::connect(&config.server, &room.name)
        .await
        .map_err(|e| SyncError::Connection(e.to_string()))?;

    Downloader::new(&room.name, room.passcode, db, handle, &config)
        .run()
        .await
}

/// Bounded launcher, generic over the per-room worker so peak concurrency is
/// testable without live connections.
pub async fn run_bounded<F, Fut>(rooms: Vec<RoomRow>, limit: usize, worker: F) -> Vec<RoomOutcome>
where
    F: Fn(RoomRow) -> Fut,
    Fut: Future<Output = Result<SyncReport, SyncError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut workers = Vec::with_capacity(rooms.len());

    for room in rooms {
        // Blocks until a slot frees; the permit travels with the task.
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");

        let name = room.name.clone();
        let fut = worker(room);
        let task = tokio::spawn(async move {
            let _permit = permit;
            fut.await
        });
        workers.push((name, task));
    }

    let mut outcomes = Vec::with_capacity(workers.len());
    for (room, task) in workers {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Connection(format!("worker died: {e}"))),
        };
        match &result {
            Ok(report) => info!(
                "[{}] done: {} new messages, {} resolved",
                room, report.new_messages, report.resolved
            ),
            Err(e) => warn!("[{}] pass failed: {}", room, e),
        }
        outcomes.push(RoomOutcome { room, result });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn rooms(n: usize) -> Vec<RoomRow> {
        (0..n)
            .map(|i| RoomRow {
                name: format!("room-{i}"),
                passcode: None,
            })
            .collect()
    }

    fn empty_report(room: &str) -> SyncReport {
        SyncReport {
            room: room.to_string(),
            new_messages: 0,
            resolved: 0,
        }
    }

    #[tokio::test]
    async fn peak_concurrency_never_exceeds_the_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = run_bounded(rooms(12), 3, {
            let active = active.clone();
            let peak = peak.clone();
            move |room| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(empty_report(&room.name))
                }
            }
        })
        .await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 3, "peak was {}", peak.load(Ordering::SeqCst));
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failing_room_does_not_abort_the_rest() {
        let outcomes = run_bounded(rooms(5), 2, |room| async move {
            if room.name == "room-2" {
                Err(SyncError::Connection("boom".to_string()))
            } else {
                Ok(empty_report(&room.name))
            }
        })
        .await;

        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 1);
        assert!(outcomes[2].result.is_err());
        assert_eq!(outcomes[4].room, "room-4");
        assert!(outcomes[4].result.is_ok());
    }

    #[tokio::test]
    async fn launch_follows_insertion_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        run_bounded(rooms(4), 1, {
            let order = order.clone();
            move |room| {
                let order = order.clone();
                async move {
                    order.lock().expect("order lock").push(room.name.clone());
                    Ok(empty_report(&room.name))
                }
            }
        })
        .await;

        let order = order.lock().expect("order lock");
        assert_eq!(*order, vec!["room-0", "room-1", "room-2", "room-3"]);
    }

    #[tokio::test]
    async fn a_panicking_worker_is_reported_not_propagated() {
        let outcomes = run_bounded(rooms(2), 2, |room| async move {
            if room.name == "room-0" {
                panic!("worker blew up");
            }
            Ok(empty_report(&room.name))
        })
        .await;

        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
    }
}
