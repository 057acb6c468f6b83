//! # Hoard Core
//!
//! Shared data model and key material for the Hoard credential authority.
//!
//! ## Key Concepts
//!
//! - **KeyPair**: the single Ed25519 instance key that signs every credential
//! - **TokenRecord**: the server-side half of a credential; deleting it revokes the token
//! - **Principal**: a verified subject joined with its capabilities
//! - **AuthStore / FileStore**: persistence collaborators, with an in-memory implementation
//!
//! ## Credential Invariants
//!
//! 1. **Intersection**: a credential is valid only if its signature verifies and its record exists
//! 2. **Kind isolation**: a web record never satisfies an API lookup, and vice versa
//! 3. **One key**: the private and persisted public key must form a pair before anything is signed

pub mod crypto;
pub mod error;
pub mod store;
pub mod types;

pub use crypto::{KeyPair, PublicKey, SIGNING_ALGORITHM};
pub use error::{CoreError, Result};
pub use store::{AuthStore, FileStore, MemoryStore, StoreError};
pub use types::{
    Capabilities, Capability, DeletionTask, FileRecord, Principal, TaskStatus, TokenKind,
    TokenRecord, UserRecord, UserStatus,
};
