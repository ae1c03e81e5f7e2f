use anyhow::Result;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use huddle_types::models::{DirectoryEntry, Message, NewMessage, ReplySnapshot};

use crate::Database;
use crate::models::{MessageRow, UserRow};

impl Database {
    // -- Messages --

    /// Append a message, assigning its id and (when missing) its timestamp.
    ///
    /// Timestamps are stored at microsecond precision in a fixed-width
    /// RFC 3339 form so text order equals time order.
    pub fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let id = Uuid::new_v4();
        let (reply_author, reply_body) = match &message.reply_to {
            Some(reply) => (Some(reply.author.as_str()), Some(reply.body.as_str())),
            None => (None, None),
        };

        // Stamp under the connection lock so stamps follow insertion order
        let timestamp = self.with_conn_mut(|conn| {
            let timestamp = message.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6);
            conn.execute(
                "INSERT INTO messages (id, channel, author, body, reply_author, reply_body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id.to_string(),
                    message.channel,
                    message.author,
                    message.body,
                    reply_author,
                    reply_body,
                    format_timestamp(&timestamp),
                ],
            )?;
            Ok(timestamp)
        })?;

        Ok(Message {
            id,
            author: message.author.clone(),
            body: message.body.clone(),
            timestamp,
            channel: message.channel.clone(),
            reply_to: message.reply_to.clone(),
        })
    }

    /// All messages of a channel, oldest first, insertion order on ties.
    pub fn list_messages(&self, channel: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, channel))
    }

    // -- Users --

    pub fn get_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, email, last_seen FROM users ORDER BY username ASC",
            )?;
            let rows = stmt
                .query_map([], row_to_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, last_seen FROM users WHERE username = ?1",
                    [username],
                    row_to_user,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Insert or refresh a directory entry. Called by the profile side (and
    /// tests); messaging never writes users.
    pub fn upsert_user(&self, entry: &DirectoryEntry) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, last_seen) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    email = excluded.email,
                    last_seen = excluded.last_seen",
                rusqlite::params![
                    entry.id,
                    entry.username,
                    entry.email,
                    entry.last_seen.as_ref().map(format_timestamp),
                ],
            )?;
            Ok(())
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let reply_to = match (self.reply_author, self.reply_body) {
            (None, None) => None,
            (author, body) => Some(ReplySnapshot {
                author: author.unwrap_or_default(),
                body: body.unwrap_or_default(),
            }),
        };

        Ok(Message {
            id: self.id.parse()?,
            author: self.author,
            body: self.body,
            timestamp: parse_timestamp(&self.created_at)?,
            channel: self.channel,
            reply_to,
        })
    }
}

impl UserRow {
    pub fn into_entry(self) -> Result<DirectoryEntry> {
        Ok(DirectoryEntry {
            id: self.id,
            username: self.username,
            email: self.email,
            last_seen: self.last_seen.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn query_messages(conn: &Connection, channel: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, id, channel, author, body, reply_author, reply_body, created_at
         FROM messages
         WHERE channel = ?1
         ORDER BY created_at ASC, seq ASC",
    )?;

    let rows = stmt
        .query_map([channel], |row| {
            Ok(MessageRow {
                seq: row.get(0)?,
                id: row.get(1)?,
                channel: row.get(2)?,
                author: row.get(3)?,
                body: row.get(4)?,
                reply_author: row.get(5)?,
                reply_body: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        last_seen: row.get(3)?,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
