use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT NOT NULL,
            room        TEXT NOT NULL,
            time        INTEGER NOT NULL,
            session     TEXT NOT NULL,
            name        TEXT NOT NULL,
            content     TEXT NOT NULL,
            parent      TEXT,
            PRIMARY KEY (id, room)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room, id DESC);

        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent, room);

        CREATE TABLE IF NOT EXISTS sessions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            is_staff    INTEGER,
            is_manager  INTEGER
        );

        CREATE TABLE IF NOT EXISTS rooms (
            name        TEXT PRIMARY KEY,
            passcode    TEXT
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
