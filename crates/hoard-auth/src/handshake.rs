//! Mirror Trust Handshake
//!
//! Lets instance A recognise an independently operated instance B as a
//! trusted mirror for one of A's users, with no shared secret:
//!
//! 1. A mints a one-shot challenge bound to both URLs
//! 2. A posts `{url, owner, token}` to `{B}/api/mirror/verify`
//! 3. B echoes the token next to the [`SENTINEL`]
//! 4. A verifies the echo with its own public key and consumes the nonce
//! 5. A records B in the user's trusted mirrors
//!
//! Any failure rejects the handshake within the call. There are no retries
//! and no partial trust.

use std::sync::Arc;
use std::time::Duration;

use hoard_core::AuthStore;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::authority::TokenAuthority;
use crate::error::{HandshakeError, RejectReason};

/// Exact response marker of an operational mirror
pub const SENTINEL: &str = "Mirror Operational";

/// Path on the mirror that answers handshake requests
pub const VERIFY_PATH: &str = "/api/mirror/verify";

/// Default bound on the outbound handshake call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake request sent from A to B
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRequest {
    /// A's base URL
    pub url: String,
    /// Subject on A asking for the mirror
    pub owner: String,
    /// Challenge token minted by A
    pub token: String,
}

/// Body of a mirror's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReply {
    pub message: MirrorAck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorAck {
    pub res: String,
    pub token: String,
}

/// Normalize an instance base URL
///
/// Only absolute `http`/`https` URLs with a host are accepted. Query and
/// fragment are refused; the trailing `/` is trimmed.
pub fn normalize_url(raw: &str) -> Result<String, RejectReason> {
    let url = Url::parse(raw.trim()).map_err(|e| RejectReason::InvalidUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RejectReason::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(RejectReason::InvalidUrl("missing host".into()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(RejectReason::InvalidUrl("query and fragment are not allowed".into()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(RejectReason::InvalidUrl("credentials are not allowed".into()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Protocol layer of the mirror handshake
#[derive(Debug, Clone)]
pub struct MirrorHandshake {
    authority: Arc<TokenAuthority>,
    store: Arc<dyn AuthStore>,
    client: reqwest::Client,
    home_url: String,
}

impl MirrorHandshake {
    /// Create the handshake for the instance reachable at `home_url`
    pub fn new(
        authority: Arc<TokenAuthority>,
        store: Arc<dyn AuthStore>,
        home_url: &str,
        timeout: Duration,
    ) -> Result<Self, HandshakeError> {
        let home_url = normalize_url(home_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // a redirect would send the challenge to a host that was never vetted
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HandshakeError::Client(e.to_string()))?;

        Ok(Self {
            authority,
            store,
            client,
            home_url,
        })
    }

    /// This instance's normalized base URL
    pub fn home_url(&self) -> &str {
        &self.home_url
    }

    /// Ask `mirror_url` to prove it is operational and, on success, record
    /// it as a trusted mirror of `subject_id`. Returns the normalized URL.
    pub async fn request_trust(
        &self,
        subject_id: &str,
        mirror_url: &str,
    ) -> Result<String, HandshakeError> {
        let mirror_url = normalize_url(mirror_url)?;
        if mirror_url == self.home_url {
            return Err(RejectReason::SelfMirror.into());
        }
        self.active_user(subject_id).await?;

        let challenge = self
            .authority
            .mint_challenge(&self.home_url, &mirror_url)
            .await?;

        match self.exchange(subject_id, &mirror_url, &challenge.token, &challenge.nonce).await {
            Ok(()) => {}
            Err(err) => {
                self.authority.abandon_challenge(&challenge.nonce).await;
                warn!(subject = %subject_id, mirror = %mirror_url, error = %err, "Mirror handshake failed");
                return Err(err);
            }
        }

        // the user may have been removed while the mirror was answering
        self.active_user(subject_id).await?;
        self.store.add_trusted_mirror(subject_id, &mirror_url).await?;

        info!(subject = %subject_id, mirror = %mirror_url, "Mirror trusted");
        Ok(mirror_url)
    }

    async fn exchange(
        &self,
        subject_id: &str,
        mirror_url: &str,
        token: &str,
        nonce: &str,
    ) -> Result<(), HandshakeError> {
        let request = MirrorRequest {
            url: self.home_url.clone(),
            owner: subject_id.to_string(),
            token: token.to_string(),
        };

        let response = self
            .client
            .post(format!("{}{}", mirror_url, VERIFY_PATH))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RejectReason::HttpStatus(status.as_u16()).into());
        }

        let body = response.bytes().await?;
        let reply: MirrorReply = serde_json::from_slice(&body)
            .map_err(|e| RejectReason::MalformedBody(e.to_string()))?;

        if reply.message.token != token {
            return Err(RejectReason::TokenMismatch.into());
        }

        let claims = self
            .authority
            .verify_challenge(&reply.message.token, &self.home_url, mirror_url)
            .await?;
        if claims.jti != nonce {
            return Err(RejectReason::TokenMismatch.into());
        }

        if reply.message.res != SENTINEL {
            return Err(RejectReason::WrongSentinel.into());
        }

        Ok(())
    }

    /// The mirror side: answer a handshake request by echoing its token
    pub fn acknowledge(request: MirrorRequest) -> Result<MirrorReply, HandshakeError> {
        normalize_url(&request.url)?;
        if request.token.is_empty() || request.owner.is_empty() {
            return Err(RejectReason::MalformedBody("token and owner are required".into()).into());
        }

        info!(home = %request.url, owner = %request.owner, "Acknowledging mirror handshake");
        Ok(MirrorReply {
            message: MirrorAck {
                res: SENTINEL.to_string(),
                token: request.token,
            },
        })
    }

    /// Mirrors trusted by `subject_id`
    pub async fn trusted_mirrors(&self, subject_id: &str) -> Result<Vec<String>, HandshakeError> {
        Ok(self.active_user(subject_id).await?.trusted_mirrors)
    }

    /// Stop trusting a mirror. Returns whether it was trusted.
    pub async fn forget_mirror(
        &self,
        subject_id: &str,
        mirror_url: &str,
    ) -> Result<bool, HandshakeError> {
        let mirror_url = normalize_url(mirror_url)?;
        self.active_user(subject_id).await?;

        let removed = self.store.remove_trusted_mirror(subject_id, &mirror_url).await?;
        if removed {
            info!(subject = %subject_id, mirror = %mirror_url, "Mirror forgotten");
        }
        Ok(removed)
    }

    async fn active_user(&self, subject_id: &str) -> Result<hoard_core::UserRecord, HandshakeError> {
        match self.store.find_user(subject_id).await? {
            Some(user) if !user.status.is_removed() => Ok(user),
            _ => Err(RejectReason::UnknownSubject.into()),
        }
    }
}
