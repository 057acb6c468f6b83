//! Administration Handlers
//!
//! Both routes require the admin capability; owners hold it implicitly.

use axum::{
    extract::{Path, State},
    Json,
};
use hoard_core::{Capability, UserStatus};
use serde::Serialize;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::handlers::{account::remove_account, AppState, Caller};

#[derive(Debug, Serialize)]
pub struct BanResponse {
    pub subject: String,
    pub banned: bool,
    pub revoked_tokens: u64,
}

#[derive(Debug, Serialize)]
pub struct PurgeStatusResponse {
    pub active: bool,
}

/// Ban a user
///
/// POST /api/admin/users/{id}/ban
///
/// The owner cannot be banned, and admins cannot ban themselves.
pub async fn ban_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(subject_id): Path<String>,
) -> Result<Json<BanResponse>, ApiError> {
    caller.require(Capability::Admin)?;

    if subject_id == caller.subject_id() {
        return Err(ApiError::BadRequest("Cannot ban yourself".into()));
    }
    let target = state
        .store
        .find_user(&subject_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User '{}' not found", subject_id)))?;
    if target.is_owner {
        return Err(ApiError::Forbidden("The instance owner cannot be banned".into()));
    }

    let revoked_tokens = remove_account(&state, &subject_id, UserStatus::Banned).await?;

    Ok(Json(BanResponse {
        subject: subject_id,
        banned: true,
        revoked_tokens,
    }))
}

/// Whether the deletion queue is currently draining
///
/// GET /api/admin/purge
pub async fn purge_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<PurgeStatusResponse>, ApiError> {
    caller.require(Capability::Admin)?;
    let active = state.purge.check().await?;
    Ok(Json(PurgeStatusResponse { active }))
}
