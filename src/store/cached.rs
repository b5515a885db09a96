//! LRU read-through cache in front of any [`TokenStore`].
//!
//! Records are immutable once written, so a cached record can never be
//! stale. Expiry is still evaluated by the token service on every read, so
//! caching never extends a token's life.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;

use super::{InsertOutcome, TokenStore};
use crate::types::{EmbedRecord, EmbedToken};

/// Configuration for the token record cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Load from `TOKEN_CACHE_ENTRIES` (0 disables the cache).
    pub fn from_env() -> Self {
        let max_entries = std::env::var("TOKEN_CACHE_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);
        Self {
            max_entries,
            enabled: max_entries > 0,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the inner store.
    pub misses: u64,
}

/// Token store wrapper that caches live records.
pub struct CachedTokenStore<S: TokenStore> {
    inner: S,
    cache: Option<Mutex<LruCache<EmbedToken, EmbedRecord>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: TokenStore> CachedTokenStore<S> {
    /// Wrap `inner` with a cache sized by `config`.
    pub fn new(inner: S, config: CacheConfig) -> Self {
        let cache = if config.enabled {
            NonZeroUsize::new(config.max_entries).map(|size| Mutex::new(LruCache::new(size)))
        } else {
            None
        };

        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.lock();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
            }
        })
    }

    fn remember(&self, record: &EmbedRecord) {
        if let Some(cache) = &self.cache {
            if record.is_live_at(Utc::now()) {
                cache.lock().put(record.token().clone(), record.clone());
            }
        }
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for CachedTokenStore<S> {
    type Error = S::Error;

    async fn insert_if_absent(&self, record: &EmbedRecord) -> Result<InsertOutcome, Self::Error> {
        let outcome = self.inner.insert_if_absent(record).await?;
        if outcome == InsertOutcome::Inserted {
            self.remember(record);
        }
        Ok(outcome)
    }

    async fn get(&self, token: &EmbedToken) -> Result<Option<EmbedRecord>, Self::Error> {
        if let Some(cache) = &self.cache {
            let cached = cache.lock().get(token).cloned();
            if let Some(record) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(record));
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        let record = self.inner.get(token).await?;
        if let Some(record) = &record {
            self.remember(record);
        }
        Ok(record)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, Self::Error> {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            let dead: Vec<EmbedToken> = cache
                .iter()
                .filter(|(_, record)| !record.is_live_at(now))
                .map(|(token, _)| token.clone())
                .collect();
            for token in dead {
                cache.pop(&token);
            }
        }
        self.inner.purge_expired(now).await
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }
}
