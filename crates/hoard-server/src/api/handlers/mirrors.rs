//! Mirror Handlers
//!
//! `/api/mirrors` manages the caller's trusted mirrors on this instance;
//! `/api/mirror/verify` answers another instance's handshake.

use axum::{extract::State, Json};
use hoard_auth::{MirrorHandshake, MirrorReply, MirrorRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::handlers::{AppState, Caller};

#[derive(Debug, Deserialize)]
pub struct MirrorUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct MirrorsResponse {
    pub mirrors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddMirrorResponse {
    /// Normalized URL that was recorded
    pub mirror: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveMirrorResponse {
    pub removed: bool,
}

/// List the caller's trusted mirrors
///
/// GET /api/mirrors
pub async fn list_mirrors(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<MirrorsResponse>, ApiError> {
    let mirrors = state.handshake.trusted_mirrors(caller.subject_id()).await?;
    Ok(Json(MirrorsResponse { mirrors }))
}

/// Run the handshake against a mirror and trust it on success
///
/// POST /api/mirrors
pub async fn add_mirror(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<MirrorUrlRequest>,
) -> Result<Json<AddMirrorResponse>, ApiError> {
    let mirror = state
        .handshake
        .request_trust(caller.subject_id(), &request.url)
        .await?;
    Ok(Json(AddMirrorResponse { mirror }))
}

/// Stop trusting a mirror
///
/// DELETE /api/mirrors
pub async fn remove_mirror(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<MirrorUrlRequest>,
) -> Result<Json<RemoveMirrorResponse>, ApiError> {
    let removed = state
        .handshake
        .forget_mirror(caller.subject_id(), &request.url)
        .await?;
    Ok(Json(RemoveMirrorResponse { removed }))
}

/// Answer a handshake from the instance named in the request
///
/// POST /api/mirror/verify
///
/// Unauthenticated: the calling instance proves itself by verifying the
/// echo with its own key.
pub async fn verify_mirror(Json(request): Json<MirrorRequest>) -> Result<Json<MirrorReply>, ApiError> {
    Ok(Json(MirrorHandshake::acknowledge(request)?))
}
