//! Persistence collaborators for the credential authority
//!
//! The authority never talks to a database directly. Token records, user
//! records and the instance public key live behind [`AuthStore`]; the deletion
//! worker pages through uploads via [`FileStore`]. Both traits are implemented
//! by the in-memory [`MemoryStore`] here and by the PostgreSQL backend in the
//! server crate.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::types::{FileRecord, TokenKind, TokenRecord, UserRecord, UserStatus};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Storage backend for credentials, users and instance settings
///
/// Implementations must be thread-safe and support concurrent access.
/// Per-record atomicity is the implementation's job; callers hold no locks.
#[async_trait]
pub trait AuthStore: Send + Sync + Debug {
    // =========================================================================
    // Token Records
    // =========================================================================

    /// Persist a newly issued token record. Fails with `Conflict` on a duplicate id.
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError>;

    /// Persist a record unless its subject already holds `max` tokens of the
    /// record's kind. Returns `false` at the cap. The count and the insert are
    /// one atomic step.
    async fn insert_token_capped(&self, record: TokenRecord, max: u64) -> Result<bool, StoreError>;

    /// Find a token record by id, owning subject and kind
    async fn find_token(
        &self,
        id: &str,
        subject_id: &str,
        kind: TokenKind,
    ) -> Result<Option<TokenRecord>, StoreError>;

    /// Delete a single token record. Returns whether a record was removed.
    async fn delete_token(&self, id: &str, subject_id: &str) -> Result<bool, StoreError>;

    /// Delete every token of a subject, optionally restricted to one kind
    async fn delete_tokens(
        &self,
        subject_id: &str,
        kind: Option<TokenKind>,
    ) -> Result<u64, StoreError>;

    /// List a subject's token records, oldest first
    async fn list_tokens(
        &self,
        subject_id: &str,
        kind: Option<TokenKind>,
    ) -> Result<Vec<TokenRecord>, StoreError>;

    /// Delete every record whose `expires_at` is at or before `now`
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // =========================================================================
    // Users
    // =========================================================================

    /// Look up a user by id
    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Insert or replace a user record
    async fn save_user(&self, user: UserRecord) -> Result<(), StoreError>;

    /// Change only a user's status. Returns `false` for an unknown user.
    async fn set_user_status(&self, id: &str, status: UserStatus) -> Result<bool, StoreError>;

    /// Append a mirror to a user's trusted list unless already present.
    /// Returns whether the list changed.
    async fn add_trusted_mirror(&self, id: &str, mirror_url: &str) -> Result<bool, StoreError>;

    /// Remove a mirror from a user's trusted list. Returns whether it was there.
    async fn remove_trusted_mirror(&self, id: &str, mirror_url: &str) -> Result<bool, StoreError>;

    // =========================================================================
    // Instance Settings
    // =========================================================================

    /// Persisted instance public key (base64url), if one was ever recorded
    async fn instance_public_key(&self) -> Result<Option<String>, StoreError>;

    /// Record the instance public key (base64url)
    async fn set_instance_public_key(&self, encoded: &str) -> Result<(), StoreError>;
}

/// Storage backend for uploaded file records, as seen by the deletion worker
#[async_trait]
pub trait FileStore: Send + Sync + Debug {
    /// Fetch up to `limit` files owned by `owner_id`, ordered by id and
    /// starting strictly after the id `after` when given
    async fn files_page(
        &self,
        owner_id: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<Vec<FileRecord>, StoreError>;

    /// Delete a file record. Returns whether a record was removed.
    async fn delete_file(&self, id: &str) -> Result<bool, StoreError>;

    /// Number of files owned by `owner_id`
    async fn count_files(&self, owner_id: &str) -> Result<u64, StoreError>;

    /// Banned or deleted users that still own files
    async fn subjects_pending_purge(&self) -> Result<Vec<String>, StoreError>;
}
