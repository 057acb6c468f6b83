//! API request handlers

pub mod account;
pub mod admin;
pub mod mirrors;
pub mod tokens;

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use hoard_auth::{MirrorHandshake, TokenAuthority, SESSION_COOKIE};
use hoard_core::{AuthStore, Capability, Principal, TokenKind};

use crate::api::error::ApiError;
use crate::purge::PurgeHandle;

pub use account::{delete_account, logout, AccountDeletedResponse, LogoutResponse};
pub use admin::{ban_user, purge_status, BanResponse, PurgeStatusResponse};
pub use mirrors::{
    add_mirror, list_mirrors, remove_mirror, verify_mirror, AddMirrorResponse, MirrorUrlRequest,
    MirrorsResponse, RemoveMirrorResponse,
};
pub use tokens::{
    create_token, list_tokens, revoke_all_tokens, revoke_token, CreateTokenRequest,
    CreateTokenResponse, KindQuery, ListTokensResponse, RevokeAllResponse, RevokeTokenRequest,
    RevokeTokenResponse,
};

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub authority: Arc<TokenAuthority>,
    pub handshake: Arc<MirrorHandshake>,
    pub store: Arc<dyn AuthStore>,
    pub purge: PurgeHandle,
}

/// An authenticated request
///
/// `Authorization: Bearer` carries an API token; otherwise the
/// `hoard_session` cookie carries a web token. A request with neither is
/// unauthorized.
#[derive(Debug, Clone)]
pub struct Caller {
    pub principal: Principal,
    pub kind: TokenKind,
    pub token: String,
}

impl Caller {
    pub fn subject_id(&self) -> &str {
        &self.principal.subject_id
    }

    /// Fail with 403 unless the caller holds `capability`
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.principal.capabilities.satisfies(capability) {
            Ok(())
        } else {
            Err(hoard_auth::AuthError::Forbidden(capability).into())
        }
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (token, kind) = presented_credential(parts).ok_or(ApiError::Unauthorized)?;
        let principal = state.authority.authenticate(&token, kind, None).await?;

        Ok(Caller {
            principal,
            kind,
            token,
        })
    }
}

fn presented_credential(parts: &Parts) -> Option<(String, TokenKind)> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        let token = value.to_str().ok()?.strip_prefix("Bearer ")?.trim();
        return (!token.is_empty()).then(|| (token.to_string(), TokenKind::Api));
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| (value.to_string(), TokenKind::Web))
}
