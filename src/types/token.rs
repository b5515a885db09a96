//! Embed token and stored record types.
//!
//! ## Lifecycle
//!
//! ```text
//! nonexistent ──issue──▶ live ──(now >= expires_at)──▶ expired
//! ```
//!
//! `expired` is terminal. A record is never mutated after creation, so
//! concurrent readers of the same token never need coordination.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of random bytes behind every token (192 bits of entropy).
pub const TOKEN_BYTES: usize = 24;

/// Length of the hex-encoded token string.
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Number of leading characters that may appear in logs.
const LOG_PREFIX_LEN: usize = 8;

/// Opaque, URL-safe embed token.
///
/// Tokens are lowercase hex encodings of [`TOKEN_BYTES`] bytes drawn from the
/// operating system CSPRNG. Possession of a token is the only credential the
/// viewer holds, so only [`EmbedToken::prefix`] should ever be logged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbedToken(String);

impl EmbedToken {
    /// Generate a fresh token from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parse a token received from a client.
    ///
    /// Returns `None` unless the input has the exact length and alphabet of a
    /// generated token, so malformed input never reaches the store.
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == TOKEN_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(s.to_string()))
    }

    /// Wrap a token string loaded from a trusted source (the store).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Get the token as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the token, safe to log.
    pub fn prefix(&self) -> &str {
        let end = self.0.len().min(LOG_PREFIX_LEN);
        self.0.get(..end).unwrap_or_default()
    }
}

impl fmt::Display for EmbedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Debug output ends up in logs and panics; keep the secret part out of it.
impl fmt::Debug for EmbedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmbedToken({}…)", self.prefix())
    }
}

/// Logical state of a stored record at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// `now < expires_at`.
    Live,
    /// `now >= expires_at`.
    Expired,
}

/// A stored embed: the token, its Cypher query and its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedRecord {
    id: Uuid,
    token: EmbedToken,
    query: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl EmbedRecord {
    /// Create a record valid for `ttl` starting at `created_at`.
    ///
    /// Callers are expected to pass a positive `ttl`; the token service
    /// validates it before getting here.
    pub fn new(token: EmbedToken, query: impl Into<String>, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            query: query.into(),
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Rebuild a record from stored columns.
    pub fn from_parts(
        id: Uuid,
        token: EmbedToken,
        query: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            token,
            query,
            created_at,
            expires_at,
        }
    }

    /// Row identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The embed token.
    pub fn token(&self) -> &EmbedToken {
        &self.token
    }

    /// The stored Cypher query.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expiry timestamp (exclusive end of the validity window).
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Length of the validity window in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        (self.expires_at - self.created_at).num_seconds()
    }

    /// Logical state at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if now < self.expires_at {
            TokenState::Live
        } else {
            TokenState::Expired
        }
    }

    /// Whether the record is live at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == TokenState::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = EmbedToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_LEN);
        assert!(EmbedToken::parse(token.as_str()).is_some());
    }

    #[test]
    fn test_parse_rejects_bad_alphabet_and_length() {
        assert!(EmbedToken::parse("").is_none());
        assert!(EmbedToken::parse("abc").is_none());
        assert!(EmbedToken::parse(&"G".repeat(TOKEN_LEN)).is_none());
        assert!(EmbedToken::parse(&"A".repeat(TOKEN_LEN)).is_none());
        assert!(EmbedToken::parse(&"a".repeat(TOKEN_LEN + 1)).is_none());
        assert!(EmbedToken::parse(&"0".repeat(TOKEN_LEN)).is_some());
    }

    #[test]
    fn test_debug_hides_token() {
        let token = EmbedToken::generate();
        let debug = format!("{:?}", token);
        assert!(!debug.contains(token.as_str()));
        assert!(debug.contains(token.prefix()));
    }

    #[test]
    fn test_record_expiry_boundary() {
        let created = Utc::now();
        let record = EmbedRecord::new(EmbedToken::generate(), "MATCH (n) RETURN n", created, Duration::days(1));

        assert_eq!(record.ttl_seconds(), 86_400);
        assert_eq!(record.state_at(created), TokenState::Live);
        assert_eq!(record.state_at(record.expires_at() - Duration::milliseconds(1)), TokenState::Live);
        // Expiry instant itself is already dead
        assert_eq!(record.state_at(record.expires_at()), TokenState::Expired);
        assert!(!record.is_live_at(record.expires_at() + Duration::seconds(1)));
    }
}
