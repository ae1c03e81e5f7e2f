use thiserror::Error;

/// Errors produced by the messaging core.
///
/// Publish errors are only ever reported back to the connection that sent the
/// request (through its ack), never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A required field (author, body, channel) was missing or empty.
    #[error("validation error: {0}")]
    Validation(String),

    /// The durable write (or read) failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// An empty identity was passed to channel resolution.
    #[error("invalid participant: {0}")]
    InvalidParticipant(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ChatError>;
