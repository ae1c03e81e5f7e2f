use tracing::error;

use huddle_types::error::{ChatError, Result};
use huddle_types::models::{DirectoryEntry, Message, NewMessage};

use crate::Database;

/// Durable, append-only log of chat messages.
///
/// Implementations are blocking; async callers run them on
/// `tokio::task::spawn_blocking`.
pub trait MessageStore: Send + Sync {
    /// Validate and durably record a message, assigning its id and, when the
    /// caller did not supply one, its timestamp.
    fn append(&self, message: NewMessage) -> Result<Message>;

    /// Every message of `channel`, ascending by timestamp, insertion order on
    /// ties. Re-querying yields the same sequence plus anything appended since.
    fn list_by_channel(&self, channel: &str) -> Result<Vec<Message>>;
}

/// Read-only view of the user directory owned by the profile service.
pub trait UserDirectory: Send + Sync {
    fn list_users(&self) -> Result<Vec<DirectoryEntry>>;
    fn find_by_username(&self, username: &str) -> Result<Option<DirectoryEntry>>;
}

impl MessageStore for Database {
    fn append(&self, message: NewMessage) -> Result<Message> {
        message.validate()?;

        self.insert_message(&message).map_err(|e| {
            error!("Failed to persist message on {}: {:#}", message.channel, e);
            ChatError::Persistence(e.to_string())
        })
    }

    fn list_by_channel(&self, channel: &str) -> Result<Vec<Message>> {
        let rows = self.list_messages(channel).map_err(|e| {
            error!("Failed to load messages for {}: {:#}", channel, e);
            ChatError::Persistence(e.to_string())
        })?;

        rows.into_iter()
            .map(|row| {
                let seq = row.seq;
                row.into_message().map_err(|e| {
                    error!("Corrupt message row {} on {}: {:#}", seq, channel, e);
                    ChatError::Persistence(format!("corrupt message row {seq}"))
                })
            })
            .collect()
    }
}

impl UserDirectory for Database {
    fn list_users(&self) -> Result<Vec<DirectoryEntry>> {
        let rows = self.get_users().map_err(|e| {
            error!("Failed to list users: {:#}", e);
            ChatError::Persistence(e.to_string())
        })?;

        rows.into_iter()
            .map(|row| row.into_entry().map_err(|e| ChatError::Persistence(e.to_string())))
            .collect()
    }

    fn find_by_username(&self, username: &str) -> Result<Option<DirectoryEntry>> {
        self.get_user_by_username(username)
            .and_then(|row| row.map(|r| r.into_entry()).transpose())
            .map_err(|e| ChatError::Persistence(e.to_string()))
    }
}
