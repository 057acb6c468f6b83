//! Session and Account Handlers

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use hoard_auth::WebCredential;
use hoard_core::{TokenKind, UserStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::handlers::{AppState, Caller};

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountDeletedResponse {
    pub deleted: bool,
    pub revoked_tokens: u64,
    /// File purge runs in the background
    pub purge_queued: bool,
}

/// End the current session
///
/// POST /api/session/logout
///
/// Revokes the presented credential and clears the session cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<(HeaderMap, Json<LogoutResponse>), ApiError> {
    let revoked = state
        .authority
        .revoke_owned(caller.subject_id(), &caller.token)
        .await?;

    let mut headers = HeaderMap::new();
    if caller.kind == TokenKind::Web {
        let cookie = HeaderValue::from_str(&WebCredential::clear_cookie())
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        headers.insert(header::SET_COOKIE, cookie);
    }

    info!(subject = %caller.subject_id(), kind = %caller.kind, "Logged out");
    Ok((headers, Json(LogoutResponse { revoked })))
}

/// Delete the caller's account
///
/// DELETE /api/account
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<(HeaderMap, Json<AccountDeletedResponse>), ApiError> {
    let revoked_tokens = remove_account(&state, caller.subject_id(), UserStatus::Deleted).await?;

    let mut headers = HeaderMap::new();
    let cookie = HeaderValue::from_str(&WebCredential::clear_cookie())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    headers.insert(header::SET_COOKIE, cookie);

    Ok((
        headers,
        Json(AccountDeletedResponse {
            deleted: true,
            revoked_tokens,
            purge_queued: true,
        }),
    ))
}

/// Mark a user banned or deleted, revoke every credential and queue the
/// file purge. Returns the number of revoked tokens.
pub(crate) async fn remove_account(
    state: &AppState,
    subject_id: &str,
    status: UserStatus,
) -> Result<u64, ApiError> {
    if !state.store.set_user_status(subject_id, status).await? {
        return Err(ApiError::NotFound(format!("User '{}' not found", subject_id)));
    }

    let revoked = state.authority.revoke_all(subject_id, None).await?;
    state.purge.enqueue(subject_id).await?;

    info!(subject = %subject_id, status = status.as_str(), revoked, "Account removed");
    Ok(revoked)
}
