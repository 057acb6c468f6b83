//! Error types shared across the Hoard crates

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while handling key material and shared types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Private or public key bytes could not be parsed
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Private and public key do not form a pair
    #[error("Key pair mismatch: {0}")]
    KeyMismatch(String),

    /// Signature creation or verification failed
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Unknown enum value in a stored record
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::CryptoError(err.to_string())
    }
}

impl From<ed25519_dalek::pkcs8::Error> for CoreError {
    fn from(err: ed25519_dalek::pkcs8::Error) -> Self {
        CoreError::InvalidKey(err.to_string())
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        CoreError::InvalidKey(format!("Invalid base64 encoding: {}", err))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
