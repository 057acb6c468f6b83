//! In-memory storage backend
//!
//! Default storage implementation using in-memory hashmaps.
//! Suitable for development, tests and single-instance deployments.
//! Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

use super::{AuthStore, FileStore, StoreError};
use crate::types::{FileRecord, TokenKind, TokenRecord, UserRecord, UserStatus};

/// In-memory store implementing both [`AuthStore`] and [`FileStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: RwLock<HashMap<String, TokenRecord>>,
    users: RwLock<HashMap<String, UserRecord>>,
    files: RwLock<HashMap<String, FileRecord>>,
    instance_key: RwLock<Option<String>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record
    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().unwrap().insert(user.id.clone(), user);
    }

    /// Insert or replace a file record
    pub fn insert_file(&self, file: FileRecord) {
        self.files.write().unwrap().insert(file.id.clone(), file);
    }

    /// Total number of token records across all subjects
    pub fn token_count(&self) -> usize {
        self.tokens.read().unwrap().len()
    }
}

fn kind_matches(record: &TokenRecord, kind: Option<TokenKind>) -> bool {
    kind.map_or(true, |k| record.kind == k)
}

#[async_trait]
impl AuthStore for MemoryStore {
    // =========================================================================
    // Token Records
    // =========================================================================

    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().unwrap();
        if tokens.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        debug!(token_id = %record.id, subject = %record.subject_id, kind = %record.kind, "Storing token record");
        tokens.insert(record.id.clone(), record);
        Ok(())
    }

    async fn insert_token_capped(&self, record: TokenRecord, max: u64) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.write().unwrap();
        let held = tokens
            .values()
            .filter(|r| r.subject_id == record.subject_id && r.kind == record.kind)
            .count() as u64;
        if held >= max {
            return Ok(false);
        }
        if tokens.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        tokens.insert(record.id.clone(), record);
        Ok(true)
    }

    async fn find_token(
        &self,
        id: &str,
        subject_id: &str,
        kind: TokenKind,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let tokens = self.tokens.read().unwrap();
        Ok(tokens
            .get(id)
            .filter(|r| r.subject_id == subject_id && r.kind == kind)
            .cloned())
    }

    async fn delete_token(&self, id: &str, subject_id: &str) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.write().unwrap();
        let owned = tokens.get(id).is_some_and(|r| r.subject_id == subject_id);
        if owned {
            tokens.remove(id);
            info!(token_id = %id, subject = %subject_id, "Deleted token record");
        }
        Ok(owned)
    }

    async fn delete_tokens(
        &self,
        subject_id: &str,
        kind: Option<TokenKind>,
    ) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, r| !(r.subject_id == subject_id && kind_matches(r, kind)));
        let removed = (before - tokens.len()) as u64;
        if removed > 0 {
            info!(subject = %subject_id, count = removed, "Deleted token records");
        }
        Ok(removed)
    }

    async fn list_tokens(
        &self,
        subject_id: &str,
        kind: Option<TokenKind>,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let tokens = self.tokens.read().unwrap();
        let mut records: Vec<TokenRecord> = tokens
            .values()
            .filter(|r| r.subject_id == subject_id && kind_matches(r, kind))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, r| !r.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }

    // =========================================================================
    // Users
    // =========================================================================

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().unwrap();
        Ok(users.get(id).cloned())
    }

    async fn save_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.insert_user(user);
        Ok(())
    }

    async fn set_user_status(&self, id: &str, status: UserStatus) -> Result<bool, StoreError> {
        let mut users = self.users.write().unwrap();
        match users.get_mut(id) {
            Some(user) => {
                user.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_trusted_mirror(&self, id: &str, mirror_url: &str) -> Result<bool, StoreError> {
        let mut users = self.users.write().unwrap();
        match users.get_mut(id) {
            Some(user) if !user.trusted_mirrors.iter().any(|m| m == mirror_url) => {
                user.trusted_mirrors.push(mirror_url.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_trusted_mirror(&self, id: &str, mirror_url: &str) -> Result<bool, StoreError> {
        let mut users = self.users.write().unwrap();
        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        let before = user.trusted_mirrors.len();
        user.trusted_mirrors.retain(|m| m != mirror_url);
        Ok(user.trusted_mirrors.len() != before)
    }

    // =========================================================================
    // Instance Settings
    // =========================================================================

    async fn instance_public_key(&self) -> Result<Option<String>, StoreError> {
        Ok(self.instance_key.read().unwrap().clone())
    }

    async fn set_instance_public_key(&self, encoded: &str) -> Result<(), StoreError> {
        let mut key = self.instance_key.write().unwrap();
        info!("Recording instance public key");
        *key = Some(encoded.to_string());
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn files_page(
        &self,
        owner_id: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let files = self.files.read().unwrap();
        let mut page: Vec<FileRecord> = files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .filter(|f| after.map_or(true, |after| f.id.as_str() > after))
            .cloned()
            .collect();
        page.sort_by(|a, b| a.id.cmp(&b.id));
        page.truncate(limit);
        Ok(page)
    }

    async fn delete_file(&self, id: &str) -> Result<bool, StoreError> {
        let mut files = self.files.write().unwrap();
        Ok(files.remove(id).is_some())
    }

    async fn count_files(&self, owner_id: &str) -> Result<u64, StoreError> {
        let files = self.files.read().unwrap();
        Ok(files.values().filter(|f| f.owner_id == owner_id).count() as u64)
    }

    async fn subjects_pending_purge(&self) -> Result<Vec<String>, StoreError> {
        let users = self.users.read().unwrap();
        let files = self.files.read().unwrap();
        let mut subjects: Vec<String> = users
            .values()
            .filter(|u| u.status.is_removed())
            .filter(|u| files.values().any(|f| f.owner_id == u.id))
            .map(|u| u.id.clone())
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}
