//! One-shot ledger for mirror challenge nonces
//!
//! A nonce is recorded when a challenge is minted and can be consumed
//! exactly once. Entries expire together with the challenge, so the ledger
//! never holds more than the challenges currently in flight.

use std::time::{Duration, Instant};

use moka::future::Cache;

/// URL pair a nonce was minted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeBinding {
    pub home_url: String,
    pub mirror_url: String,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    binding: ChallengeBinding,
    expires_at: Instant,
}

/// Per-entry expiry: each nonce lives exactly as long as its challenge
struct NonceExpiry;

impl moka::Expiry<String, LedgerEntry> for NonceExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LedgerEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }
}

/// In-memory nonce ledger backed by a [`moka::future::Cache`]
#[derive(Clone)]
pub struct ChallengeLedger {
    pending: Cache<String, LedgerEntry>,
}

impl std::fmt::Debug for ChallengeLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeLedger")
            .field("entries", &self.pending.entry_count())
            .finish()
    }
}

impl ChallengeLedger {
    /// Create a ledger tracking at most `max_capacity` challenges in flight
    pub fn new(max_capacity: u64) -> Self {
        let pending = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(NonceExpiry)
            .build();
        Self { pending }
    }

    /// Record a freshly minted nonce
    pub async fn record(&self, nonce: &str, binding: ChallengeBinding, ttl: Duration) {
        let entry = LedgerEntry {
            binding,
            expires_at: Instant::now() + ttl,
        };
        self.pending.insert(nonce.to_owned(), entry).await;
    }

    /// Consume a nonce. Returns its binding the first time, `None` afterwards
    /// or once the challenge has expired.
    pub async fn consume(&self, nonce: &str) -> Option<ChallengeBinding> {
        let entry = self.pending.remove(nonce).await?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.binding)
    }

    /// Drop a nonce without consuming it
    pub async fn discard(&self, nonce: &str) {
        self.pending.invalidate(nonce).await;
    }
}
