//! API Token Management Handlers
//!
//! Lists, issues and revokes the caller's tokens.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use hoard_core::{TokenKind, TokenRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::handlers::{AppState, Caller};

const MAX_DESCRIPTION_LEN: usize = 256;

/// Optional token kind filter
#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    pub kind: Option<TokenKind>,
}

/// Request to issue an API token
#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub description: Option<String>,
}

/// A freshly issued API token. The token text is only ever shown here.
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListTokensResponse {
    pub tokens: Vec<TokenRecord>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RevokeTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeTokenResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

/// List the caller's tokens
///
/// GET /api/tokens?kind=api|web
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<KindQuery>,
) -> Result<Json<ListTokensResponse>, ApiError> {
    let tokens = state
        .authority
        .list_tokens(caller.subject_id(), query.kind)
        .await?;

    Ok(Json(ListTokensResponse {
        count: tokens.len(),
        tokens,
    }))
}

/// Issue a new API token for the caller
///
/// POST /api/tokens
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<CreateTokenRequest>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    let description = request
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(ApiError::BadRequest(format!(
            "Description too long (max {} chars)",
            MAX_DESCRIPTION_LEN
        )));
    }

    let issued = state
        .authority
        .issue_api_token(caller.subject_id(), description)
        .await?;

    Ok(Json(CreateTokenResponse {
        id: issued.record.id,
        token: issued.token,
        created_at: issued.record.created_at,
        description: issued.record.description,
    }))
}

/// Revoke one token
///
/// DELETE /api/tokens
///
/// Only the caller's own tokens are revoked; a token naming another subject
/// reports `revoked: false`.
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<RevokeTokenRequest>,
) -> Result<Json<RevokeTokenResponse>, ApiError> {
    let revoked = state
        .authority
        .revoke_owned(caller.subject_id(), &request.token)
        .await?;

    Ok(Json(RevokeTokenResponse { revoked }))
}

/// Revoke all of the caller's tokens, optionally of one kind
///
/// DELETE /api/tokens/all?kind=api|web
pub async fn revoke_all_tokens(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<KindQuery>,
) -> Result<Json<RevokeAllResponse>, ApiError> {
    let revoked = state
        .authority
        .revoke_all(caller.subject_id(), query.kind)
        .await?;

    Ok(Json(RevokeAllResponse { revoked }))
}
