//! Hoard Credential Authority
//!
//! Issues and verifies the bearer credentials of a Hoard instance and runs
//! the mirror trust handshake between instances.
//!
//! ## Architecture
//!
//! - **TokenAuthority**: signs web and API tokens with the instance Ed25519
//!   key and accepts them only while their server-side record exists
//! - **Validation**: algorithm allow-list applied before any signature work
//! - **ChallengeLedger**: one-shot nonces for mirror challenges
//! - **MirrorHandshake**: proves a remote instance is operational and records
//!   it as a trusted mirror
//!
//! ## Usage
//!
//! ```ignore
//! use hoard_auth::{AuthorityConfig, MirrorHandshake, TokenAuthority};
//!
//! let authority = Arc::new(TokenAuthority::new(keys, store.clone(), AuthorityConfig::default())?);
//! let handshake = MirrorHandshake::new(authority.clone(), store, "https://a.example", DEFAULT_TIMEOUT)?;
//!
//! let mirror = handshake.request_trust("u1", "https://b.example").await?;
//! ```

pub mod authority;
pub mod challenge;
pub mod claims;
pub mod error;
pub mod handshake;
pub mod validation;

pub use authority::{
    AuthorityConfig, IssuedChallenge, IssuedToken, TokenAuthority, WebCredential, SESSION_COOKIE,
};
pub use challenge::ChallengeLedger;
pub use claims::{ChallengeClaims, CredentialClaims};
pub use error::{AuthError, HandshakeError, RejectReason, Result, TokenRejection};
pub use handshake::{normalize_url, MirrorAck, MirrorHandshake, MirrorReply, MirrorRequest, SENTINEL};
