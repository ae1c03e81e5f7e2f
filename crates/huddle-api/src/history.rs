use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use tracing::{error, warn};

use huddle_db::MessageStore;
use huddle_types::api::{DmChannelQuery, DmChannelResponse, HistoryQuery};
use huddle_types::channel::resolve_direct;
use huddle_types::error::{ChatError, Result};
use huddle_types::models::Message;

use crate::error::ApiError;
use crate::state::AppState;

/// Serves channel backlog on demand. Needs no live session.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn MessageStore>,
    default_channel: Arc<str>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn MessageStore>, default_channel: impl Into<String>) -> Self {
        Self {
            store,
            default_channel: Arc::from(default_channel.into()),
        }
    }

    /// Missing or blank channel ids fall back to the default channel.
    pub fn resolve_channel<'a>(&'a self, channel: Option<&'a str>) -> &'a str {
        channel
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&*self.default_channel)
    }

    /// Every message of the channel, oldest first.
    pub async fn get_history(&self, channel: Option<&str>) -> Result<Vec<Message>> {
        let channel = self.resolve_channel(channel).to_string();
        let store = self.store.clone();

        // Run blocking DB query off the async runtime
        tokio::task::spawn_blocking(move || store.list_by_channel(&channel))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ChatError::Persistence("history task failed".into())
            })?
    }
}

/// GET /chat?channel=<id>
///
/// An unparseable query string is treated like a missing one.
pub async fn get_history(
    State(state): State<AppState>,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> std::result::Result<Json<Vec<Message>>, ApiError> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            warn!("Bad history query, using default channel: {}", e);
            HistoryQuery::default()
        }
    };

    let messages = state
        .history
        .get_history(query.channel.as_deref())
        .await
        .map_err(|e| {
            error!("History fetch failed: {}", e);
            ApiError::Internal("Failed to fetch messages".into())
        })?;

    Ok(Json(messages))
}

/// GET /api/chat/dm-channel?a=<user>&b=<user>
pub async fn dm_channel(
    Query(query): Query<DmChannelQuery>,
) -> std::result::Result<Json<DmChannelResponse>, ApiError> {
    let channel = resolve_direct(&query.a, &query.b)?;
    Ok(Json(DmChannelResponse { channel }))
}
