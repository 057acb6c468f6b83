//! API module for the Hoard server

pub mod error;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Mirrors call the verify route cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health))
        // Mirror handshake, answered on behalf of other instances
        .route("/api/mirror/verify", post(handlers::verify_mirror))
        // Trusted mirrors
        .route(
            "/api/mirrors",
            get(handlers::list_mirrors)
                .post(handlers::add_mirror)
                .delete(handlers::remove_mirror),
        )
        // Tokens
        .route(
            "/api/tokens",
            get(handlers::list_tokens)
                .post(handlers::create_token)
                .delete(handlers::revoke_token),
        )
        .route("/api/tokens/all", delete(handlers::revoke_all_tokens))
        // Session and account
        .route("/api/session/logout", post(handlers::logout))
        .route("/api/account", delete(handlers::delete_account))
        // Administration
        .route("/api/admin/users/{id}/ban", post(handlers::ban_user))
        .route("/api/admin/purge", get(handlers::purge_status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
