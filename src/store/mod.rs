//! Token storage backends.
//!
//! The store is a plain key-value table keyed by token. It knows nothing
//! about expiry semantics beyond physical garbage collection; logical
//! expiry is enforced by [`crate::TokenService`] on every read.

pub mod cached;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{EmbedRecord, EmbedToken};

/// Outcome of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written.
    Inserted,
    /// A record with the same token already exists; nothing was written.
    Collision,
}

/// Trait for token storage backends.
///
/// Implementations must make `insert_if_absent` atomic: two concurrent
/// inserts of the same token must produce exactly one `Inserted`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert a record unless its token is already present.
    async fn insert_if_absent(&self, record: &EmbedRecord) -> Result<InsertOutcome, Self::Error>;

    /// Fetch the record for a token, live or not.
    async fn get(&self, token: &EmbedToken) -> Result<Option<EmbedRecord>, Self::Error>;

    /// Physically delete records with `expires_at <= now`.
    ///
    /// Returns the number of deleted records.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, Self::Error>;

    /// Check whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use cached::{CacheConfig, CacheStats, CachedTokenStore};
pub use memory::{InMemoryError, InMemoryTokenStore};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresError, PostgresTokenStore, EMBED_TOKENS_TABLE_SCHEMA};
