//! Server configuration
//!
//! Everything is read from `HOARD_*` environment variables. Missing optional
//! values fall back to defaults; malformed values are a [`ConfigurationError`].

use std::path::PathBuf;
use std::time::Duration;

use hoard_auth::{AuthorityConfig, AuthError};
use hoard_core::{CoreError, StoreError};
use thiserror::Error;
use tracing::Level;
use zeroize::Zeroizing;

use crate::purge::PurgeConfig;

/// Fatal startup errors. The binary logs them and exits non-zero.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No private key configured: set HOARD_PRIVATE_KEY_PATH or HOARD_PRIVATE_KEY")]
    MissingKey,

    #[error("Cannot read private key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Private key is empty")]
    EmptyKey,

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(#[source] CoreError),

    #[error("Invalid stored public key: {0}")]
    InvalidPublicKey(#[source] CoreError),

    #[error("Private key does not match the stored public key: {0}")]
    KeyMismatch(#[source] CoreError),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Storage unavailable at startup: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot build credential authority: {0}")]
    Authority(#[from] AuthError),
}

/// Where the instance private key comes from
#[derive(Clone)]
pub enum KeySource {
    /// PEM or base64 seed in a file
    File(PathBuf),
    /// PEM or base64 seed injected directly, e.g. through the environment
    Secret(Zeroizing<String>),
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::File(path) => f.debug_tuple("File").field(path).finish(),
            KeySource::Secret(_) => f.write_str("Secret([redacted])"),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: Level,
    /// This instance's public base URL, sent to mirrors during the handshake
    pub public_url: String,
    pub key_source: KeySource,
    pub key_id: String,
    pub issuer: String,
    /// Directory holding uploaded blobs
    pub uploads_dir: PathBuf,
    pub max_api_tokens: usize,
    pub mirror_timeout: Duration,
    pub sweep_interval: Duration,
    pub purge_page_size: usize,
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or(&get("HOARD_PORT"), "HOARD_PORT", 8080u16)?;
        let log_level = parse_or(&get("HOARD_LOG_LEVEL"), "HOARD_LOG_LEVEL", Level::INFO)?;

        let public_url = get("HOARD_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        hoard_auth::normalize_url(&public_url).map_err(|e| ConfigurationError::Invalid {
            var: "HOARD_PUBLIC_URL",
            reason: e.to_string(),
        })?;

        // an explicitly empty secret is kept so that loading fails loudly
        let key_source = match (get("HOARD_PRIVATE_KEY_PATH"), lookup("HOARD_PRIVATE_KEY")) {
            (Some(path), _) => KeySource::File(PathBuf::from(path)),
            (None, Some(secret)) => KeySource::Secret(Zeroizing::new(secret)),
            (None, None) => return Err(ConfigurationError::MissingKey),
        };

        let max_api_tokens = parse_or(
            &get("HOARD_MAX_API_TOKENS"),
            "HOARD_MAX_API_TOKENS",
            hoard_auth::authority::DEFAULT_MAX_API_TOKENS,
        )?;
        let mirror_timeout = Duration::from_secs(parse_or(
            &get("HOARD_MIRROR_TIMEOUT_SECS"),
            "HOARD_MIRROR_TIMEOUT_SECS",
            10u64,
        )?);
        let sweep_interval = Duration::from_secs(parse_or(
            &get("HOARD_SWEEP_INTERVAL_SECS"),
            "HOARD_SWEEP_INTERVAL_SECS",
            3600u64,
        )?);
        if sweep_interval.is_zero() {
            return Err(ConfigurationError::Invalid {
                var: "HOARD_SWEEP_INTERVAL_SECS",
                reason: "must be at least 1".into(),
            });
        }
        let purge_page_size = parse_or(
            &get("HOARD_PURGE_PAGE_SIZE"),
            "HOARD_PURGE_PAGE_SIZE",
            PurgeConfig::default().page_size,
        )?;
        if purge_page_size == 0 {
            return Err(ConfigurationError::Invalid {
                var: "HOARD_PURGE_PAGE_SIZE",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            port,
            log_level,
            public_url,
            key_source,
            key_id: get("HOARD_KEY_ID").unwrap_or_else(|| "hoard-instance".into()),
            issuer: get("HOARD_ISSUER").unwrap_or_else(|| hoard_auth::authority::DEFAULT_ISSUER.into()),
            uploads_dir: get("HOARD_UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            max_api_tokens,
            mirror_timeout,
            sweep_interval,
            purge_page_size,
            database_url: get("HOARD_DATABASE_URL"),
        })
    }

    /// Authority settings derived from this configuration
    pub fn authority_config(&self) -> AuthorityConfig {
        AuthorityConfig::default()
            .with_issuer(self.issuer.clone())
            .with_max_api_tokens(self.max_api_tokens)
    }

    /// Deletion queue settings derived from this configuration
    pub fn purge_config(&self) -> PurgeConfig {
        PurgeConfig {
            page_size: self.purge_page_size,
            ..PurgeConfig::default()
        }
    }
}

fn parse_or<T>(raw: &Option<String>, var: &'static str, default: T) -> Result<T, ConfigurationError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigurationError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
