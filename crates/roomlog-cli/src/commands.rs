use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use roomlog_db::Database;
use roomlog_db::models::RoomRow;
use roomlog_sync::{Fleet, SyncConfig};

use crate::cli::Commands;

pub struct Config {
    pub db_path: String,
    pub server: String,
    pub page_size: u32,
    pub concurrency: usize,
    pub idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let db_path = env::var("ROOMLOG_DB_PATH").unwrap_or_else(|_| "roomlog.db".into());
        let server =
            env::var("ROOMLOG_SERVER").unwrap_or_else(|_| "wss://chat.example.org".into());
        let page_size: u32 = env::var("ROOMLOG_PAGE_SIZE")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .context("ROOMLOG_PAGE_SIZE must be an integer")?;
        let concurrency: usize = env::var("ROOMLOG_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .context("ROOMLOG_CONCURRENCY must be an integer")?;
        let idle_timeout_secs: u64 = env::var("ROOMLOG_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "90".into())
            .parse()
            .context("ROOMLOG_IDLE_TIMEOUT_SECS must be an integer")?;

        Ok(Self {
            db_path,
            server,
            page_size,
            concurrency,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }

    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            server: self.server.clone(),
            page_size: self.page_size,
            idle_timeout: self.idle_timeout,
        }
    }
}

pub async fn run(command: Commands, db: Arc<Database>, config: &Config) -> Result<()> {
    match command {
        Commands::List => {
            for room in db.list_rooms()? {
                let marker = if room.passcode.is_some() { " (passcode)" } else { "" };
                println!("{}{}", room.name, marker);
            }
        }

        Commands::Add { room, passcode } => {
            db.upsert_room(&room, passcode.as_deref())?;
            println!("Tracking {room}.");
        }

        Commands::Remove { rooms } => {
            for room in rooms {
                db.delete_room_messages(&room)?;
                db.delete_room(&room)?;
                println!("Removed {room}.");
            }
        }

        Commands::Reset { rooms } => {
            for room in rooms {
                db.delete_room_messages(&room)?;
                println!("Reset {room}.");
            }
        }

        Commands::Update { rooms } => {
            update(db, config, rooms, false).await?;
        }

        Commands::Redownload { rooms } => {
            update(db, config, rooms, true).await?;
        }
    }
    Ok(())
}

async fn update(
    db: Arc<Database>,
    config: &Config,
    rooms: Vec<String>,
    from_scratch: bool,
) -> Result<()> {
    let known = db.list_rooms()?;

    let selected: Vec<RoomRow> = if rooms.is_empty() {
        known
    } else {
        rooms
            .iter()
            .filter_map(|name| {
                let found = known.iter().find(|room| &room.name == name).cloned();
                if found.is_none() {
                    warn!("Unknown room {name}, skipping (try: roomlog add {name})");
                }
                found
            })
            .collect()
    };

    if selected.is_empty() {
        println!("No rooms to update.");
        return Ok(());
    }

    if from_scratch {
        for room in &selected {
            db.delete_room_messages(&room.name)?;
        }
    }

    let fleet = Fleet::new(db, config.sync_config());
    let outcomes = fleet.run(selected, config.concurrency).await;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "{}: {} new messages, {} resolved",
                outcome.room, report.new_messages, report.resolved
            ),
            Err(e) => println!("{}: failed ({e})", outcome.room),
        }
    }

    Ok(())
}
