use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use huddle_types::events::ServerEvent;

/// Identifies one live connection. Never reused and never persisted.
pub type ConnectionId = Uuid;

/// Snapshot of a live connection's subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub joined_channels: HashSet<String>,
}

/// Owns every live session and the channel -> subscribers index.
///
/// Both maps sit behind one lock so a session's joined set and the
/// subscriber sets never disagree.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    /// connection_id -> session entry
    sessions: HashMap<ConnectionId, SessionEntry>,

    /// channel -> connections listening on it
    channels: HashMap<String, HashSet<ConnectionId>>,
}

struct SessionEntry {
    joined: HashSet<String>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl RegistryState {
    fn purge(&mut self, connection_id: ConnectionId) -> Option<SessionEntry> {
        let entry = self.sessions.remove(&connection_id)?;
        for channel in &entry.joined {
            if let Some(subs) = self.channels.get_mut(channel) {
                subs.remove(&connection_id);
                if subs.is_empty() {
                    self.channels.remove(channel);
                }
            }
        }
        Some(entry)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session. Returns the session and the receiving end of
    /// its outbound event queue.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
    ) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.write().await;

        // A stale entry under the same id loses its subscriptions
        state.purge(connection_id);
        state.sessions.insert(
            connection_id,
            SessionEntry {
                joined: HashSet::new(),
                tx,
            },
        );

        let session = Session {
            connection_id,
            joined_channels: HashSet::new(),
        };
        (session, rx)
    }

    /// Remove a session and drop it from every subscriber set.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<Session> {
        let entry = self.inner.write().await.purge(connection_id)?;
        Some(Session {
            connection_id,
            joined_channels: entry.joined,
        })
    }

    /// Subscribe a connection to a channel. Returns `true` if it was not
    /// already joined; joining twice is a no-op. Unknown connections are
    /// ignored.
    pub async fn join(&self, connection_id: ConnectionId, channel: &str) -> bool {
        let mut state = self.inner.write().await;
        let Some(entry) = state.sessions.get_mut(&connection_id) else {
            return false;
        };
        if !entry.joined.insert(channel.to_string()) {
            return false;
        }
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(connection_id);
        true
    }

    /// Unsubscribe a connection. Returns `true` if it had been joined;
    /// leaving a channel that was never joined is a no-op.
    pub async fn leave(&self, connection_id: ConnectionId, channel: &str) -> bool {
        let mut state = self.inner.write().await;
        let Some(entry) = state.sessions.get_mut(&connection_id) else {
            return false;
        };
        if !entry.joined.remove(channel) {
            return false;
        }
        if let Some(subs) = state.channels.get_mut(channel) {
            subs.remove(&connection_id);
            if subs.is_empty() {
                state.channels.remove(channel);
            }
        }
        true
    }

    /// Connections currently listening on a channel.
    pub async fn subscribers(&self, channel: &str) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn session(&self, connection_id: ConnectionId) -> Option<Session> {
        self.inner
            .read()
            .await
            .sessions
            .get(&connection_id)
            .map(|entry| Session {
                connection_id,
                joined_channels: entry.joined.clone(),
            })
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Queue an event for every subscriber of `channel`. Returns how many
    /// connections accepted it.
    ///
    /// Enqueueing never blocks, so a slow reader only delays itself. A
    /// connection whose queue is already closed is skipped.
    pub async fn fan_out(&self, channel: &str, event: ServerEvent) -> usize {
        let state = self.inner.read().await;
        let Some(subs) = state.channels.get(channel) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in subs {
            if let Some(entry) = state.sessions.get(connection_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    debug!("Dropping event for closed connection {}", connection_id);
                }
            }
        }
        delivered
    }

    /// Queue an event for a single connection (acks).
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.inner
            .read()
            .await
            .sessions
            .get(&connection_id)
            .is_some_and(|entry| entry.tx.send(event).is_ok())
    }
}
