//! Token Authority
//!
//! Issues, verifies and revokes the two credential kinds, and mints the
//! one-shot challenges used by the mirror handshake.
//!
//! ## Validity
//!
//! A credential is accepted only when **both** hold:
//!
//! 1. its signature verifies under the instance public key (EdDSA only)
//! 2. a [`TokenRecord`] with the same token id, subject and kind exists
//!
//! Deleting the record therefore revokes the token, whatever its `exp`.
//!
//! ## Usage
//!
//! ```ignore
//! let authority = TokenAuthority::new(keys, store, AuthorityConfig::default())?;
//!
//! let issued = authority.issue_api_token("u1", Some("ci".into())).await?;
//! let subject = authority.verify(&issued.token, TokenKind::Api).await?;
//! assert!(authority.revoke(&issued.token).await?);
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hoard_core::{AuthStore, Capability, KeyPair, Principal, TokenKind, TokenRecord};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::challenge::{ChallengeBinding, ChallengeLedger};
use crate::claims::{ChallengeClaims, CredentialClaims};
use crate::error::{AuthError, HandshakeError, RejectReason, Result, TokenRejection};
use crate::validation::check_header;

/// Name of the cookie carrying web credentials
pub const SESSION_COOKIE: &str = "hoard_session";

/// Web credential lifetime: 14 days
pub const WEB_TOKEN_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Upper bound on a mirror challenge's lifetime
pub const MAX_CHALLENGE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default issuer claim
pub const DEFAULT_ISSUER: &str = "hoard";

/// Default cap on API tokens per subject
pub const DEFAULT_MAX_API_TOKENS: usize = 10;

/// Authority configuration
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Fixed `iss` claim, checked on every verification
    pub issuer: String,
    /// Maximum concurrent API tokens per subject. Issuing past it is refused.
    pub max_api_tokens: usize,
    /// Lifetime of web credentials
    pub web_token_ttl: Duration,
    /// Lifetime of mirror challenges, clamped to [`MAX_CHALLENGE_TTL`]
    pub challenge_ttl: Duration,
    /// Maximum number of challenges in flight
    pub challenge_capacity: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            max_api_tokens: DEFAULT_MAX_API_TOKENS,
            web_token_ttl: WEB_TOKEN_TTL,
            challenge_ttl: MAX_CHALLENGE_TTL,
            challenge_capacity: 10_000,
        }
    }
}

impl AuthorityConfig {
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_max_api_tokens(mut self, max: usize) -> Self {
        self.max_api_tokens = max;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    fn effective_challenge_ttl(&self) -> Duration {
        self.challenge_ttl
            .clamp(Duration::from_secs(1), MAX_CHALLENGE_TTL)
    }
}

/// A freshly issued credential and its stored record
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub record: TokenRecord,
}

/// A web credential, ready to be set as a cookie
#[derive(Debug, Clone)]
pub struct WebCredential {
    pub token: String,
    pub record: TokenRecord,
    pub expires_at: DateTime<Utc>,
    max_age: u64,
}

impl WebCredential {
    /// `Set-Cookie` header value for this credential
    pub fn set_cookie(&self) -> String {
        format!(
            "{}={}; HttpOnly; Secure; SameSite=Strict; Max-Age={}; Path=/",
            SESSION_COOKIE, self.token, self.max_age
        )
    }

    /// `Set-Cookie` header value that clears the session cookie
    pub fn clear_cookie() -> String {
        format!(
            "{}=; HttpOnly; Secure; SameSite=Strict; Max-Age=0; Path=/",
            SESSION_COOKIE
        )
    }
}

/// A minted mirror challenge
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub token: String,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

/// The credential authority
pub struct TokenAuthority {
    keys: Arc<KeyPair>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    store: Arc<dyn AuthStore>,
    ledger: ChallengeLedger,
    config: AuthorityConfig,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("kid", &self.keys.kid())
            .field("issuer", &self.config.issuer)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl TokenAuthority {
    /// Create an authority around the loaded instance key pair
    pub fn new(
        keys: Arc<KeyPair>,
        store: Arc<dyn AuthStore>,
        config: AuthorityConfig,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_ed_der(&keys.pkcs8_der());
        let decoding_key = DecodingKey::from_ed_components(&keys.public_key().to_base64url())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        let ledger = ChallengeLedger::new(config.challenge_capacity);

        info!(
            kid = %keys.kid(),
            issuer = %config.issuer,
            max_api_tokens = config.max_api_tokens,
            "Token authority ready"
        );

        Ok(Self {
            keys,
            encoding_key,
            decoding_key,
            store,
            ledger,
            config,
        })
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    pub fn key_id(&self) -> &str {
        self.keys.kid()
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Issue a non-expiring API token
    ///
    /// Refused with [`AuthError::TokenLimitReached`] once the subject holds
    /// `max_api_tokens`; existing tokens are never evicted.
    pub async fn issue_api_token(
        &self,
        subject_id: &str,
        description: Option<String>,
    ) -> Result<IssuedToken> {
        let max = self.config.max_api_tokens;
        let issued = self.mint(subject_id, TokenKind::Api, None, description)?;

        // count and insert happen in one store call so concurrent requests
        // cannot pass the cap
        if !self
            .store
            .insert_token_capped(issued.record.clone(), max as u64)
            .await?
        {
            info!(subject = %subject_id, limit = max, "API token limit reached");
            return Err(AuthError::TokenLimitReached { limit: max });
        }

        info!(subject = %subject_id, token_id = %issued.record.id, "Issued API token");
        Ok(issued)
    }

    /// Issue a 14-day web token
    pub async fn issue_web_token(&self, subject_id: &str) -> Result<WebCredential> {
        let ttl = self.config.web_token_ttl;
        let issued = self.mint(subject_id, TokenKind::Web, Some(ttl), None)?;
        self.store.insert_token(issued.record.clone()).await?;
        let expires_at = issued
            .record
            .expires_at
            .ok_or_else(|| AuthError::Signing("web token issued without expiry".into()))?;

        info!(subject = %subject_id, token_id = %issued.record.id, "Issued web token");
        Ok(WebCredential {
            token: issued.token,
            record: issued.record,
            expires_at,
            max_age: ttl.as_secs(),
        })
    }

    /// Sign a credential and build its record; persisting is the caller's job
    fn mint(
        &self,
        subject_id: &str,
        kind: TokenKind,
        ttl: Option<Duration>,
        description: Option<String>,
    ) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => Some(now + to_chrono(ttl)?),
            None => None,
        };
        let id = uuid::Uuid::new_v4().to_string();

        let claims = CredentialClaims {
            sub: subject_id.to_string(),
            jti: id.clone(),
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.map(|t| t.timestamp()),
        };
        let token = self.sign(&claims)?;

        let record = TokenRecord {
            id,
            subject_id: subject_id.to_string(),
            kind,
            created_at: now,
            expires_at,
            description,
        };
        Ok(IssuedToken { token, record })
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Verify a credential of the expected kind and return its subject id
    ///
    /// Every failure is reported as [`AuthError::Unauthenticated`]; the
    /// reason is logged at debug level only. Store failures propagate as
    /// [`AuthError::Store`].
    pub async fn verify(&self, token: &str, expected_kind: TokenKind) -> Result<String> {
        let claims = match self.decode_credential(token, true) {
            Ok(claims) => claims,
            Err(rejection) => return Err(unauthenticated(expected_kind, rejection)),
        };

        let record = self
            .store
            .find_token(&claims.jti, &claims.sub, expected_kind)
            .await?;

        match record {
            None => Err(unauthenticated(expected_kind, TokenRejection::UnknownRecord)),
            Some(record) if record.is_expired_at(Utc::now()) => {
                Err(unauthenticated(expected_kind, TokenRejection::RecordExpired))
            }
            Some(_) => Ok(claims.sub),
        }
    }

    /// Join a verified subject against its user record
    ///
    /// A missing, banned or deleted user is unauthenticated; a present user
    /// lacking `required` is forbidden.
    pub async fn resolve_principal(
        &self,
        subject_id: &str,
        required: Option<Capability>,
    ) -> Result<Principal> {
        let user = match self.store.find_user(subject_id).await? {
            Some(user) if !user.status.is_removed() => user,
            Some(user) => {
                debug!(subject = %subject_id, status = user.status.as_str(), "Subject is not active");
                return Err(AuthError::Unauthenticated);
            }
            None => {
                debug!(subject = %subject_id, "Subject has no user record");
                return Err(AuthError::Unauthenticated);
            }
        };

        let capabilities = user.capabilities();
        if let Some(required) = required {
            if !capabilities.satisfies(required) {
                debug!(subject = %subject_id, ?required, "Capability check failed");
                return Err(AuthError::Forbidden(required));
            }
        }

        Ok(Principal {
            subject_id: user.id,
            capabilities,
        })
    }

    /// Verify a credential and resolve its principal in one step
    pub async fn authenticate(
        &self,
        token: &str,
        kind: TokenKind,
        required: Option<Capability>,
    ) -> Result<Principal> {
        let subject_id = self.verify(token, kind).await?;
        self.resolve_principal(&subject_id, required).await
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revoke a single credential
    ///
    /// Only the signature and issuer are checked, so expired tokens can still
    /// be revoked. Returns whether a record was removed.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let claims = self.revocable_claims(token)?;
        let removed = self.store.delete_token(&claims.jti, &claims.sub).await?;
        info!(subject = %claims.sub, token_id = %claims.jti, removed, "Revoked token");
        Ok(removed)
    }

    /// Revoke a credential only if it was issued to `subject_id`
    ///
    /// A token naming another subject removes nothing and returns `false`.
    pub async fn revoke_owned(&self, subject_id: &str, token: &str) -> Result<bool> {
        let claims = self.revocable_claims(token)?;
        if claims.sub != subject_id {
            debug!(subject = %subject_id, "Refusing to revoke another subject's token");
            return Ok(false);
        }
        let removed = self.store.delete_token(&claims.jti, &claims.sub).await?;
        info!(subject = %claims.sub, token_id = %claims.jti, removed, "Revoked token");
        Ok(removed)
    }

    fn revocable_claims(&self, token: &str) -> Result<CredentialClaims> {
        self.decode_credential(token, false).map_err(|rejection| {
            debug!(reason = %rejection, "Refusing to revoke token");
            AuthError::Unauthenticated
        })
    }

    /// Revoke a subject's tokens, optionally of one kind only
    pub async fn revoke_all(&self, subject_id: &str, kind: Option<TokenKind>) -> Result<u64> {
        let count = self.store.delete_tokens(subject_id, kind).await?;
        info!(subject = %subject_id, kind = ?kind, count, "Revoked tokens");
        Ok(count)
    }

    /// List a subject's token records
    pub async fn list_tokens(
        &self,
        subject_id: &str,
        kind: Option<TokenKind>,
    ) -> Result<Vec<TokenRecord>> {
        Ok(self.store.list_tokens(subject_id, kind).await?)
    }

    /// Delete records whose expiry has passed
    pub async fn purge_expired(&self) -> Result<u64> {
        let count = self.store.purge_expired_tokens(Utc::now()).await?;
        if count > 0 {
            info!(count, "Purged expired token records");
        }
        Ok(count)
    }

    // =========================================================================
    // Mirror Challenges
    // =========================================================================

    /// Mint a one-shot challenge bound to `home_url` and `mirror_url`
    pub async fn mint_challenge(&self, home_url: &str, mirror_url: &str) -> Result<IssuedChallenge> {
        let ttl = self.config.effective_challenge_ttl();
        let now = Utc::now();
        let expires_at = now + to_chrono(ttl)?;
        let nonce = uuid::Uuid::new_v4().to_string();

        let claims = ChallengeClaims {
            home_url: home_url.to_string(),
            mirror_url: mirror_url.to_string(),
            jti: nonce.clone(),
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = self.sign(&claims)?;

        self.ledger
            .record(
                &nonce,
                ChallengeBinding {
                    home_url: home_url.to_string(),
                    mirror_url: mirror_url.to_string(),
                },
                ttl,
            )
            .await;

        debug!(nonce = %nonce, mirror = %mirror_url, "Minted mirror challenge");
        Ok(IssuedChallenge {
            token,
            nonce,
            expires_at,
        })
    }

    /// Verify a challenge and consume its nonce
    ///
    /// Checks the signature with the instance public key, the expiry, the
    /// issuer and both URLs, then consumes the nonce. A second call with the
    /// same challenge fails with [`RejectReason::Replayed`].
    pub async fn verify_challenge(
        &self,
        token: &str,
        home_url: &str,
        mirror_url: &str,
    ) -> std::result::Result<ChallengeClaims, HandshakeError> {
        let claims: ChallengeClaims = self
            .decode_with(token, true, true)
            .map_err(RejectReason::from)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(RejectReason::Expired.into());
        }
        if claims.home_url != home_url || claims.mirror_url != mirror_url {
            return Err(RejectReason::UrlMismatch.into());
        }

        let binding = self
            .ledger
            .consume(&claims.jti)
            .await
            .ok_or(RejectReason::Replayed)?;
        if binding.home_url != home_url || binding.mirror_url != mirror_url {
            return Err(RejectReason::UrlMismatch.into());
        }

        Ok(claims)
    }

    /// Forget a minted challenge that will never be verified
    pub async fn abandon_challenge(&self, nonce: &str) {
        self.ledger.discard(nonce).await;
    }

    // =========================================================================
    // Signing Helpers
    // =========================================================================

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.keys.kid().to_string());
        encode(&header, claims, &self.encoding_key).map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn decode_credential(
        &self,
        token: &str,
        validate_exp: bool,
    ) -> std::result::Result<CredentialClaims, TokenRejection> {
        self.decode_with(token, validate_exp, false)
    }

    fn decode_with<T: DeserializeOwned>(
        &self,
        token: &str,
        validate_exp: bool,
        require_exp: bool,
    ) -> std::result::Result<T, TokenRejection> {
        check_header(token)?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.required_spec_claims.clear();
        if require_exp {
            validation.required_spec_claims.insert("exp".to_string());
        }
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.config.issuer]);
        validation.required_spec_claims.insert("iss".to_string());

        Ok(decode::<T>(token, &self.decoding_key, &validation)?.claims)
    }
}

fn unauthenticated(kind: TokenKind, rejection: TokenRejection) -> AuthError {
    debug!(kind = %kind, reason = %rejection, "Credential rejected");
    AuthError::Unauthenticated
}

fn to_chrono(ttl: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|e| AuthError::Signing(e.to_string()))
}
