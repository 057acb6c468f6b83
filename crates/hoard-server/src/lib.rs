//! Hoard Server
//!
//! HTTP front of a Hoard instance. It wires together:
//! - the credential authority and mirror handshake from `hoard-auth`
//! - the instance key, loaded once and checked against the stored public key
//! - the deletion queue purging files of banned and deleted accounts
//! - a periodic sweep of expired token records
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `POST /api/mirror/verify` - Answer another instance's mirror handshake
//! - `GET|POST|DELETE /api/mirrors` - List, add (handshake) and forget trusted mirrors
//! - `GET|POST|DELETE /api/tokens` - List, issue and revoke API tokens
//! - `DELETE /api/tokens/all` - Revoke every token of the caller
//! - `POST /api/session/logout` - Revoke the presented credential
//! - `DELETE /api/account` - Delete the caller's account and purge its files
//! - `POST /api/admin/users/{id}/ban` - Ban a user (admin)
//! - `GET /api/admin/purge` - Deletion queue state (admin)

pub mod api;
pub mod config;
pub mod keys;
pub mod purge;
pub mod storage;

pub use api::create_router;
pub use api::handlers::{AppState, Caller};
pub use config::{ConfigurationError, KeySource, ServerConfig};
pub use keys::KeyProvider;
pub use purge::{BlobStore, FsBlobStore, PurgeConfig, PurgeError, PurgeHandle};
pub use storage::{AuthStore, FileStore, MemoryStore, StoreError};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hoard_auth::{MirrorHandshake, TokenAuthority};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Errors that stop the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Deletion queue error: {0}")]
    Purge(#[from] PurgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running instance's services
pub struct Hoard {
    pub state: Arc<AppState>,
    purge_task: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Hoard {
    /// Load the key, build the authority and start the background tasks
    ///
    /// Purges interrupted by a previous shutdown are queued again before
    /// this returns.
    pub async fn start<S>(config: &ServerConfig, store: Arc<S>) -> Result<Self, ServerError>
    where
        S: AuthStore + FileStore + 'static,
    {
        let keys = KeyProvider::new(config.key_source.clone(), config.key_id.clone())
            .load(store.as_ref())
            .await?;

        let authority = Arc::new(
            TokenAuthority::new(keys, store.clone(), config.authority_config())
                .map_err(ConfigurationError::from)?,
        );
        let handshake = Arc::new(
            MirrorHandshake::new(
                authority.clone(),
                store.clone(),
                &config.public_url,
                config.mirror_timeout,
            )
            .map_err(|e| ConfigurationError::Invalid {
                var: "HOARD_PUBLIC_URL",
                reason: e.to_string(),
            })?,
        );

        let blobs = Arc::new(FsBlobStore::new(config.uploads_dir.clone()));
        let (purge, purge_task) = PurgeHandle::spawn(store.clone(), blobs, config.purge_config());
        purge::recover_pending(store.as_ref(), &purge).await?;

        let sweeper = spawn_sweeper(authority.clone(), config.sweep_interval);

        info!(
            kid = %authority.key_id(),
            public_url = %handshake.home_url(),
            "Hoard services started"
        );

        Ok(Self {
            state: Arc::new(AppState {
                authority,
                handshake,
                store,
                purge,
            }),
            purge_task,
            sweeper,
        })
    }

    /// Router serving this instance's API
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Stop the sweeper and let the deletion worker finish its current pass
    pub async fn shutdown(self) -> Result<(), ServerError> {
        self.sweeper.abort();
        self.state.purge.shutdown().await?;
        if let Err(e) = self.purge_task.await {
            warn!(error = %e, "Deletion worker ended abnormally");
        }
        info!("Hoard services stopped");
        Ok(())
    }
}

/// Periodically delete expired token records
pub fn spawn_sweeper(authority: Arc<TokenAuthority>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = authority.purge_expired().await {
                warn!(error = %e, "Expired token sweep failed");
            }
        }
    })
}
