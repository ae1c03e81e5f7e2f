use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use huddle_api::{AppState, AppStateInner, HistoryService, history, users};
use huddle_db::Database;
use huddle_gateway::connection;
use huddle_gateway::registry::SessionRegistry;
use huddle_gateway::router::MessageRouter;

#[derive(Clone)]
pub struct ServerState {
    pub api: AppState,
    pub router: MessageRouter,
}

impl ServerState {
    /// Wire the store, registry, router and history service together. The
    /// database backs both the message log and the user directory.
    pub fn new(db: Arc<Database>, group_channel: &str) -> Self {
        let router = MessageRouter::new(SessionRegistry::new(), db.clone(), group_channel);
        let api = Arc::new(AppStateInner {
            history: HistoryService::new(db.clone(), group_channel),
            directory: db,
        });
        Self { api, router }
    }
}

pub fn build_app(state: ServerState) -> Router {
    let api_routes = Router::new()
        .route("/chat", get(history::get_history))
        .route("/api/chat", get(history::get_history))
        .route("/api/chat/dm-channel", get(history::dm_channel))
        .route("/api/user/users", get(users::list_users))
        .route("/api/user/profile", get(users::get_profile))
        .with_state(state.api);

    let ws_route = Router::new()
        .route("/socket", get(ws_upgrade))
        .with_state(state.router);

    Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(
    State(router): State<MessageRouter>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, router))
}

async fn health() -> &'static str {
    "ok"
}
