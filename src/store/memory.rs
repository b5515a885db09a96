//! In-memory token store for testing and single-node development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{InsertOutcome, TokenStore};
use crate::types::{EmbedRecord, EmbedToken};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// The store was switched offline with [`InMemoryTokenStore::set_available`].
    #[error("in-memory store is unavailable")]
    Unavailable,
}

/// In-memory token store.
///
/// Inserts take the write lock for the whole check-and-insert, which gives
/// the atomic insert-if-absent the [`TokenStore`] contract requires.
#[derive(Debug)]
pub struct InMemoryTokenStore {
    records: RwLock<HashMap<EmbedToken, EmbedRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryTokenStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record unconditionally, replacing any existing one.
    ///
    /// Bypasses collision detection; meant for seeding fixtures such as
    /// records that are already expired.
    pub fn put(&self, record: EmbedRecord) {
        self.records.write().insert(record.token().clone(), record);
    }

    /// Number of physically stored records (live and expired).
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), InMemoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(InMemoryError::Unavailable)
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    type Error = InMemoryError;

    async fn insert_if_absent(&self, record: &EmbedRecord) -> Result<InsertOutcome, Self::Error> {
        self.ensure_available()?;
        let mut records = self.records.write();
        if records.contains_key(record.token()) {
            return Ok(InsertOutcome::Collision);
        }
        records.insert(record.token().clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, token: &EmbedToken) -> Result<Option<EmbedRecord>, Self::Error> {
        self.ensure_available()?;
        Ok(self.records.read().get(token).cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, Self::Error> {
        self.ensure_available()?;
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| record.is_live_at(now));
        Ok((before - records.len()) as u64)
    }

    async fn is_healthy(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
