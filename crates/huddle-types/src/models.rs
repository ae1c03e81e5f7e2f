use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatError, Result};

/// Copy of `{author, body}` of the message being replied to, taken at send
/// time. Later changes to the original never reach this snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    #[serde(rename = "user", default)]
    pub author: String,
    #[serde(rename = "message", default)]
    pub body: String,
}

/// A message on its way into the store. `id` does not exist yet and the
/// timestamp is only present when the sender supplied one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub author: String,
    pub body: String,
    pub channel: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub reply_to: Option<ReplySnapshot>,
}

impl NewMessage {
    pub fn new(
        author: impl Into<String>,
        body: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            channel: channel.into(),
            timestamp: None,
            reply_to: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<ReplySnapshot>) -> Self {
        self.reply_to = reply_to;
        self
    }

    /// Every persisted message needs an author, a body and a channel.
    /// Whitespace-only values count as missing. A sender-supplied timestamp
    /// must fall in years 0000-9999 so stored timestamps sort as text.
    pub fn validate(&self) -> Result<()> {
        if self.author.trim().is_empty() {
            return Err(ChatError::Validation("author is required".into()));
        }
        if self.body.trim().is_empty() {
            return Err(ChatError::Validation("message body is required".into()));
        }
        if self.channel.trim().is_empty() {
            return Err(ChatError::Validation("channel is required".into()));
        }
        if let Some(timestamp) = self.timestamp {
            if !(0..=9999).contains(&timestamp.year()) {
                return Err(ChatError::Validation(format!(
                    "timestamp year {} is out of range",
                    timestamp.year()
                )));
            }
        }
        Ok(())
    }
}

/// A persisted chat message.
///
/// Serializes as the wire record shared by history fetches and live pushes:
/// `{id, user, message, timestamp, channel, replyTo}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub author: String,
    #[serde(rename = "message")]
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<ReplySnapshot>,
}

/// A user as seen through the profile directory. Read-only for messaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<DateTime<Utc>>,
}
