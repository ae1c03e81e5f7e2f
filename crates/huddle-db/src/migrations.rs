use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- seq is the insertion order and breaks timestamp ties
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            channel         TEXT NOT NULL CHECK (length(channel) > 0),
            author          TEXT NOT NULL CHECK (length(author) > 0),
            body            TEXT NOT NULL CHECK (length(body) > 0),
            reply_author    TEXT,
            reply_body      TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel, created_at, seq);

        -- Owned by the profile service; messaging only reads it
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            last_seen   TEXT
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
