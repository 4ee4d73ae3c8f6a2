/// Database row types — these map directly to SQLite rows.
/// Distinct from the roomlog-types wire models to keep the DB layer independent.

pub struct MessageRow {
    pub id: String,
    pub room: String,
    pub time: i64,
    pub session: String,
    pub name: String,
    pub content: String,
    pub parent: Option<String>,
}

pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub is_staff: Option<bool>,
    pub is_manager: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub name: String,
    pub passcode: Option<String>,
}
