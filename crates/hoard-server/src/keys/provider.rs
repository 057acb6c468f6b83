//! Key Provider
//!
//! Loads the instance signing key once at startup:
//!
//! - the private key comes from a file or an injected secret (PKCS#8 PEM, or
//!   the base64 32-byte Ed25519 seed)
//! - the public key comes from the persisted instance record
//! - the two are checked with a sign/verify probe before anything is signed
//!
//! On first boot the record holds no public key yet; the derived key is
//! persisted and every later boot is checked against it. All failures are
//! fatal [`ConfigurationError`]s.

use std::sync::Arc;

use hoard_core::{AuthStore, KeyPair, PublicKey};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::{ConfigurationError, KeySource};

/// Loads and validates the instance key pair
#[derive(Debug, Clone)]
pub struct KeyProvider {
    source: KeySource,
    kid: String,
}

impl KeyProvider {
    pub fn new(source: KeySource, kid: impl Into<String>) -> Self {
        Self {
            source,
            kid: kid.into(),
        }
    }

    /// Load the private key, check it against the stored public key and
    /// return the immutable pair
    pub async fn load(&self, store: &dyn AuthStore) -> Result<Arc<KeyPair>, ConfigurationError> {
        let text = self.read_private_text().await?;
        if text.trim().is_empty() {
            return Err(ConfigurationError::EmptyKey);
        }
        let keys = KeyPair::from_private_text(&self.kid, &text)
            .map_err(ConfigurationError::InvalidPrivateKey)?;

        let keys = match store.instance_public_key().await? {
            Some(encoded) => {
                let public = PublicKey::from_base64url(&self.kid, &encoded)
                    .map_err(ConfigurationError::InvalidPublicKey)?;
                let keys = keys
                    .bind_public_key(&public)
                    .map_err(ConfigurationError::KeyMismatch)?;
                info!(kid = %keys.kid(), "Instance key pair verified");
                keys
            }
            None => {
                let encoded = keys.public_key().to_base64url();
                store.set_instance_public_key(&encoded).await?;
                warn!(kid = %keys.kid(), public_key = %encoded, "No stored public key, recorded the derived one");
                keys
            }
        };

        Ok(Arc::new(keys))
    }

    async fn read_private_text(&self) -> Result<Zeroizing<String>, ConfigurationError> {
        match &self.source {
            KeySource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(Zeroizing::new)
                .map_err(|source| ConfigurationError::KeyFile {
                    path: path.clone(),
                    source,
                }),
            KeySource::Secret(secret) => Ok(secret.clone()),
        }
    }
}
