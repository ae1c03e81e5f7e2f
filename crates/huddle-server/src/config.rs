//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with no configuration
//! for local development. A `.env` file is honoured (loaded in `main`).

use std::net::SocketAddr;
use std::path::PathBuf;

use huddle_types::channel::DEFAULT_GROUP_CHANNEL;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `HUDDLE_HOST`
    /// Default: `0.0.0.0`
    pub host: String,

    /// Env: `HUDDLE_PORT`
    /// Default: `5000`
    pub port: u16,

    /// SQLite file holding messages and the user directory.
    /// Env: `HUDDLE_DB_PATH`
    /// Default: `huddle.db`
    pub db_path: PathBuf,

    /// Well-known room every client shares; also the history default.
    /// Env: `HUDDLE_GROUP_CHANNEL`
    /// Default: `allStudents`
    pub group_channel: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            db_path: PathBuf::from("huddle.db"),
            group_channel: DEFAULT_GROUP_CHANNEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("HUDDLE_HOST") {
            config.host = host;
        }

        if let Some(port) = lookup("HUDDLE_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => tracing::warn!(value = %port, "Invalid HUDDLE_PORT, using default"),
            }
        }

        if let Some(path) = lookup("HUDDLE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(channel) = lookup("HUDDLE_GROUP_CHANNEL") {
            let channel = channel.trim();
            if channel.is_empty() {
                tracing::warn!("Empty HUDDLE_GROUP_CHANNEL, using default");
            } else {
                config.group_channel = channel.to_string();
            }
        }

        config
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
