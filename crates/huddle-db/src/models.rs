/// Database row types. These map directly to SQLite rows.
/// Distinct from huddle-types models to keep the DB layer independent.

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub channel: String,
    pub author: String,
    pub body: String,
    pub reply_author: Option<String>,
    pub reply_body: Option<String>,
    pub created_at: String,
}

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub last_seen: Option<String>,
}
