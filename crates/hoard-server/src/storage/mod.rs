//! Storage backends
//!
//! The in-memory store lives in `hoard-core` and is the default. Persistent
//! deployments enable the `postgres` feature and set `HOARD_DATABASE_URL`.
//!
//! Persistent storage matters for:
//! - the instance public key, checked against the private key on every boot
//! - revocation, which is the deletion of a token record
//! - purges interrupted by a restart

#[cfg(feature = "postgres")]
pub mod postgres;

pub use hoard_core::store::{AuthStore, FileStore, MemoryStore, StoreError};
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
