//! Common types used across the Hoard crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Credential class. Web tokens ride in a cookie and expire; API tokens ride
/// in a header and live until revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Web,
    Api,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Web => "web",
            TokenKind::Api => "api",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(TokenKind::Web),
            "api" => Ok(TokenKind::Api),
            _ => Err(CoreError::UnknownVariant {
                kind: "token kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Server-side record whose presence is required for a credential to verify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token id, embedded as `jti` and used as the revocation key
    pub id: String,
    /// Subject the token was issued to
    pub subject_id: String,
    pub kind: TokenKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TokenRecord {
    /// Whether the record has passed its own expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

/// A capability a route may require of its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Owner,
    Admin,
}

/// Capabilities held by a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub is_admin: bool,
    pub is_owner: bool,
}

impl Capabilities {
    /// Pure capability predicate. The instance owner holds every admin right.
    pub fn satisfies(&self, required: Capability) -> bool {
        match required {
            Capability::Owner => self.is_owner,
            Capability::Admin => self.is_admin || self.is_owner,
        }
    }
}

/// Authenticated caller: a verified subject joined with its user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: String,
    pub capabilities: Capabilities,
}

/// Account standing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Banned,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Banned => "banned",
            UserStatus::Deleted => "deleted",
        }
    }

    /// Banned and deleted accounts have their files purged
    pub fn is_removed(&self) -> bool {
        !matches!(self, UserStatus::Active)
    }
}

impl std::str::FromStr for UserStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "banned" => Ok(UserStatus::Banned),
            "deleted" => Ok(UserStatus::Deleted),
            _ => Err(CoreError::UnknownVariant {
                kind: "user status",
                value: s.to_string(),
            }),
        }
    }
}

/// User record as seen by the credential authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub status: UserStatus,
    /// Mirror base URLs trusted to resolve this user's links
    #[serde(default)]
    pub trusted_mirrors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create an active user without capabilities
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            is_admin: false,
            is_owner: false,
            status: UserStatus::Active,
            trusted_mirrors: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn with_owner(mut self) -> Self {
        self.is_owner = true;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_admin: self.is_admin,
            is_owner: self.is_owner,
        }
    }
}

/// Uploaded file owned by a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    /// Name of the underlying blob in the upload store
    pub blob_name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, blob_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            blob_name: blob_name.into(),
            size: 0,
            created_at: Utc::now(),
        }
    }
}

/// Deletion task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
}

/// A subject queued for file purging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionTask {
    pub subject_id: String,
    pub status: TaskStatus,
}

impl DeletionTask {
    pub fn pending(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            status: TaskStatus::Pending,
        }
    }
}
