use serde::{Deserialize, Serialize};

use crate::models::DirectoryEntry;

// -- History --

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub channel: Option<String>,
}

// -- Direct-message channel lookup --

#[derive(Debug, Default, Deserialize)]
pub struct DmChannelQuery {
    #[serde(default)]
    pub a: String,
    #[serde(default)]
    pub b: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DmChannelResponse {
    pub channel: String,
}

// -- Directory --

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<DirectoryEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: DirectoryEntry,
}
