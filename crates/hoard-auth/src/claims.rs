//! Signed token payloads

use serde::{Deserialize, Serialize};

/// Claims carried by web and API credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject (user id)
    pub sub: String,
    /// Token id, the key of the server-side record
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    /// Present on web tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Claims carried by a mirror challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeClaims {
    /// Instance that minted the challenge
    pub home_url: String,
    /// Instance the challenge was sent to
    pub mirror_url: String,
    /// One-shot nonce
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}
