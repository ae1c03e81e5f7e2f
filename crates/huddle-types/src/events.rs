use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::models::{Message, ReplySnapshot};

/// Commands sent FROM client TO server over the socket.
///
/// Frames look like `{"event": "send-dm", "data": {...}, "ack": 3}`. The
/// optional `ack` id is read separately through [`AckRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    /// Start listening to a channel
    #[serde(rename = "joinRoom")]
    JoinRoom(String),

    /// Stop listening to a channel
    #[serde(rename = "leaveRoom")]
    LeaveRoom(String),

    /// Publish to the group channel (or an explicit channel)
    #[serde(rename = "groupMessage")]
    GroupMessage(GroupMessageRequest),

    /// Publish a direct message
    #[serde(rename = "send-dm")]
    SendDm(DirectMessageRequest),
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "joinRoom",
            Self::LeaveRoom(_) => "leaveRoom",
            Self::GroupMessage(_) => "groupMessage",
            Self::SendDm(_) => "send-dm",
        }
    }
}

/// The acknowledgement id a client attached to a frame, if any.
#[derive(Debug, Default, Deserialize)]
pub struct AckRequest {
    #[serde(default)]
    pub ack: Option<u64>,
}

// Missing text fields decode as empty strings so they are rejected by
// validation (with an ack) instead of failing to decode.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMessageRequest {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<ReplySnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectMessageRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<ReplySnapshot>,
}

/// Events sent FROM server TO client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message persisted to a group channel
    #[serde(rename = "newGroupMessage")]
    NewGroupMessage(Message),

    /// A message persisted to a direct-message channel
    #[serde(rename = "receive-dm")]
    ReceiveDm(Message),

    /// Outcome of a command, only sent to the connection that issued it
    #[serde(rename = "ack")]
    Ack(Ack),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// `{status: "ok"}` or `{status: "error", error: "..."}`, tagged with the
/// client's ack id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            id: None,
            status: AckStatus::Ok,
            error: None,
        }
    }

    pub fn error(err: &ChatError) -> Self {
        Self {
            id: None,
            status: AckStatus::Error,
            error: Some(err.to_string()),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }
}

impl<T> From<&Result<T, ChatError>> for Ack {
    fn from(result: &Result<T, ChatError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::error(e),
        }
    }
}
