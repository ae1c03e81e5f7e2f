use axum::{
    Json,
    extract::{Query, State},
};
use tracing::error;

use huddle_types::api::{ProfileQuery, ProfileResponse, UsersResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/user/users: who can be messaged. Read-only view of the
/// profile directory.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, ApiError> {
    let directory = state.directory.clone();

    let users = tokio::task::spawn_blocking(move || directory.list_users())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("Failed to get users".into())
        })?
        .map_err(|e| {
            error!("User directory lookup failed: {}", e);
            ApiError::Internal("Failed to get users".into())
        })?;

    Ok(Json(UsersResponse {
        success: true,
        users,
    }))
}

/// GET /api/user/profile?username=<u>
pub async fn get_profile(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let username = query.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".into()));
    }

    let directory = state.directory.clone();
    let lookup = username.clone();
    let user = tokio::task::spawn_blocking(move || directory.find_by_username(&lookup))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("Failed to get profile".into())
        })?
        .map_err(|e| {
            error!("Profile lookup for {} failed: {}", username, e);
            ApiError::Internal("Failed to get profile".into())
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}
