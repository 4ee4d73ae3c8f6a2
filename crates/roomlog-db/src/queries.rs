use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::models::{MessageRow, RoomRow, SessionRow};
use roomlog_types::models::Message;

impl Database {
    // -- Messages --

    /// Write one message and its authoring session in a single transaction.
    ///
    /// Safe to call repeatedly with the same id: the row keyed by (id, room)
    /// is overwritten, never duplicated. Used for truncation resolutions;
    /// pages go through `upsert_page`.
    pub fn upsert_message(&self, room: &str, msg: &Message) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            write_message(&tx, room, msg)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Write a whole history page in one transaction.
    pub fn upsert_page(&self, room: &str, msgs: &[Message]) -> Result<()> {
        if msgs.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for msg in msgs {
                write_message(&tx, room, msg)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Resume cursor: id of the newest stored message for the room.
    pub fn newest_message_id(&self, room: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM messages WHERE room = ?1 ORDER BY id DESC LIMIT 1",
                    [room],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    pub fn get_message(&self, room: &str, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, room, time, session, name, content, parent
                     FROM messages WHERE id = ?1 AND room = ?2",
                    [id, room],
                    |row| {
                        Ok(MessageRow {
                            id: row.get(0)?,
                            room: row.get(1)?,
                            time: row.get(2)?,
                            session: row.get(3)?,
                            name: row.get(4)?,
                            content: row.get(5)?,
                            parent: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Sessions --

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, is_staff, is_manager FROM sessions WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(SessionRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            is_staff: row.get(2)?,
                            is_manager: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Reply tree navigation (export/rendering consumers) --

    pub fn top_level_message_ids(&self, room: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM messages WHERE parent IS NULL AND room = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map([room], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    pub fn children(&self, room: &str, id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM messages WHERE parent = ?1 AND room = ?2 ORDER BY id")?;
            let ids = stmt
                .query_map([id, room], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    pub fn parent(&self, room: &str, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let parent: Option<Option<String>> = conn
                .query_row(
                    "SELECT parent FROM messages WHERE id = ?1 AND room = ?2",
                    [id, room],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(parent.flatten())
        })
    }

    pub fn delete_room_messages(&self, room: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE room = ?1", [room])?;
            Ok(())
        })
    }

    // -- Rooms --

    pub fn upsert_room(&self, name: &str, passcode: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (name, passcode) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET passcode = excluded.passcode",
                (name, passcode),
            )?;
            Ok(())
        })
    }

    pub fn delete_room(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM rooms WHERE name = ?1", [name])?;
            Ok(())
        })
    }

    /// Known rooms, in the order they were added.
    pub fn list_rooms(&self) -> Result<Vec<RoomRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name, passcode FROM rooms ORDER BY rowid")?;
            let rooms = stmt
                .query_map([], |row| {
                    Ok(RoomRow {
                        name: row.get(0)?,
                        passcode: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rooms)
        })
    }
}

/// Message + session write, executed inside the caller's transaction.
///
/// Session flags merge monotonically: an upsert that lacks a flag keeps the
/// previously stored value, an explicit true/false overwrites it.
fn write_message(conn: &Connection, room: &str, msg: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, room, time, session, name, content, parent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id, room) DO UPDATE SET
             time = excluded.time,
             session = excluded.session,
             name = excluded.name,
             content = excluded.content,
             parent = excluded.parent",
        rusqlite::params![
            msg.id,
            room,
            msg.time,
            msg.sender.session_id,
            msg.sender.name,
            msg.content,
            msg.parent,
        ],
    )?;

    conn.execute(
        "INSERT INTO sessions (id, user_id, is_staff, is_manager)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             user_id = excluded.user_id,
             is_staff = COALESCE(excluded.is_staff, sessions.is_staff),
             is_manager = COALESCE(excluded.is_manager, sessions.is_manager)",
        rusqlite::params![
            msg.sender.session_id,
            msg.sender.id,
            msg.sender.is_staff,
            msg.sender.is_manager,
        ],
    )?;

    Ok(())
}
