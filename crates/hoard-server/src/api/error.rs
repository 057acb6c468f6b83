//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hoard_auth::{AuthError, HandshakeError};
use hoard_core::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::purge::PurgeError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Token limit reached")]
    TokenLimit { limit: usize },

    #[error("Mirror handshake rejected")]
    HandshakeRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
                None,
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            ApiError::TokenLimit { limit } => (
                StatusCode::CONFLICT,
                "TOKEN_LIMIT_REACHED",
                format!("At most {} API tokens may exist at once", limit),
                Some(serde_json::json!({ "limit": limit })),
            ),
            ApiError::HandshakeRejected(reason) => (
                StatusCode::BAD_REQUEST,
                "MIRROR_HANDSHAKE_REJECTED",
                "Mirror handshake rejected".to_string(),
                Some(serde_json::json!({ "reason": reason })),
            ),
            ApiError::Internal(msg) => {
                // details stay in the log
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::Unauthorized,
            AuthError::Forbidden(capability) => {
                ApiError::Forbidden(format!("{:?} capability required", capability))
            }
            AuthError::TokenLimitReached { limit } => ApiError::TokenLimit { limit },
            AuthError::Store(e) => e.into(),
            AuthError::Signing(e) => ApiError::Internal(e),
        }
    }
}

impl From<HandshakeError> for ApiError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Rejected(reason) => {
                debug!(reason = %reason, "Handshake rejected");
                ApiError::HandshakeRejected(reason.to_string())
            }
            HandshakeError::Store(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PurgeError> for ApiError {
    fn from(err: PurgeError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
