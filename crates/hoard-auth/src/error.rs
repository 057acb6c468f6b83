//! Error types for the credential authority

use hoard_core::{Capability, StoreError};
use thiserror::Error;

/// Result type for credential authority operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors returned by [`crate::TokenAuthority`]
///
/// Every credential failure collapses into `Unauthenticated`; the concrete
/// [`TokenRejection`] is only ever logged.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Credential is missing, malformed, forged, expired or revoked
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Authenticated, but lacking a required capability
    #[error("Forbidden: requires {0:?} capability")]
    Forbidden(Capability),

    /// Subject already holds the maximum number of API tokens
    #[error("API token limit of {limit} reached")]
    TokenLimitReached { limit: usize },

    /// Persistence failure; a server error, never an authentication verdict
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Token could not be signed
    #[error("Signing error: {0}")]
    Signing(String),
}

/// Internal reason a presented token was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("algorithm rejected: {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature does not verify")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("no matching token record")]
    UnknownRecord,

    #[error("token record expired")]
    RecordExpired,
}

impl From<jsonwebtoken::errors::Error> for TokenRejection {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::InvalidSignature => TokenRejection::BadSignature,
            ErrorKind::InvalidIssuer => TokenRejection::IssuerMismatch,
            ErrorKind::InvalidAlgorithm => {
                TokenRejection::UnsupportedAlgorithm("algorithm does not match key".into())
            }
            _ => TokenRejection::Malformed(err.to_string()),
        }
    }
}

/// Why a mirror handshake was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("challenge expired")]
    Expired,

    #[error("challenge signature does not verify")]
    BadSignature,

    #[error("challenge is bound to a different URL pair")]
    UrlMismatch,

    #[error("challenge nonce already used or unknown")]
    Replayed,

    #[error("echoed token differs from the issued challenge")]
    TokenMismatch,

    #[error("malformed challenge: {0}")]
    MalformedChallenge(String),

    #[error("invalid mirror URL: {0}")]
    InvalidUrl(String),

    #[error("mirror URL is this instance")]
    SelfMirror,

    #[error("unknown or inactive subject")]
    UnknownSubject,

    #[error("mirror answered with status {0}")]
    HttpStatus(u16),

    #[error("mirror unreachable: {0}")]
    Transport(String),

    #[error("malformed mirror response: {0}")]
    MalformedBody(String),

    #[error("mirror did not answer with the operational sentinel")]
    WrongSentinel,
}

impl From<TokenRejection> for RejectReason {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::Expired => RejectReason::Expired,
            TokenRejection::BadSignature => RejectReason::BadSignature,
            other => RejectReason::MalformedChallenge(other.to_string()),
        }
    }
}

/// Errors from the mirror trust handshake
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The handshake was refused; no trust was recorded
    #[error("Mirror handshake rejected: {0}")]
    Rejected(RejectReason),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl HandshakeError {
    /// The rejection reason, if the handshake was refused rather than failed
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            HandshakeError::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<RejectReason> for HandshakeError {
    fn from(reason: RejectReason) -> Self {
        HandshakeError::Rejected(reason)
    }
}

impl From<AuthError> for HandshakeError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(e) => HandshakeError::Store(e),
            AuthError::Signing(e) => HandshakeError::Signing(e),
            AuthError::Unauthenticated | AuthError::Forbidden(_) => {
                HandshakeError::Rejected(RejectReason::UnknownSubject)
            }
            AuthError::TokenLimitReached { .. } => HandshakeError::Signing(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for HandshakeError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("timed out: {}", err)
        } else {
            err.to_string()
        };
        HandshakeError::Rejected(RejectReason::Transport(reason))
    }
}
