use std::sync::Arc;

use tracing::info;

use huddle_server::app::{self, ServerState};
use huddle_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "huddle=debug,huddle_server=debug,huddle_gateway=debug,huddle_api=debug,huddle_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env();

    // Init database
    let db = Arc::new(huddle_db::Database::open(&config.db_path)?);

    let state = ServerState::new(db, &config.group_channel);
    let app = app::build_app(state);

    let addr = config.bind_addr()?;
    info!("Huddle server listening on {}", addr);
    info!("Group channel: {}", config.group_channel);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
