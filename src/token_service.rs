//! Token lifecycle: issuance, lookup with expiry enforcement, and purging.
//!
//! ## Invariants
//!
//! 1. Tokens are generated from a CSPRNG and never reused: a collision on
//!    insert triggers regeneration, never an overwrite.
//! 2. A lookup at `now >= expires_at` fails exactly like a lookup of an
//!    unknown token, whether or not the record is still stored.
//! 3. Records are immutable after issuance.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::store::{InsertOutcome, TokenStore};
use crate::types::{EmbedRecord, EmbedToken};

/// Token issuance limits.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// TTL used when the caller does not request one (default: 1 day).
    pub default_ttl_days: i64,
    /// Largest TTL a caller may request (default: 90 days).
    pub max_ttl_days: i64,
    /// Total insert attempts before giving up on collisions (default: 3).
    pub max_issue_attempts: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_ttl_days: 1,
            max_ttl_days: 90,
            max_issue_attempts: 3,
        }
    }
}

impl TokenConfig {
    /// Load from `DEFAULT_TOKEN_EXPIRY_DAYS` and `MAX_TOKEN_EXPIRY_DAYS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_days: std::env::var("DEFAULT_TOKEN_EXPIRY_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_ttl_days),
            max_ttl_days: std::env::var("MAX_TOKEN_EXPIRY_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_ttl_days),
            max_issue_attempts: defaults.max_issue_attempts,
        }
    }
}

impl TokenConfig {
    /// Reject TTL bounds that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_days <= 0 {
            return Err(ConfigError::Zero("DEFAULT_TOKEN_EXPIRY_DAYS"));
        }
        if self.max_issue_attempts == 0 {
            return Err(ConfigError::Zero("max_issue_attempts"));
        }
        if self.default_ttl_days > self.max_ttl_days {
            return Err(ConfigError::Inverted {
                lower: "DEFAULT_TOKEN_EXPIRY_DAYS",
                upper: "MAX_TOKEN_EXPIRY_DAYS",
            });
        }
        Ok(())
    }
}

/// Source of fresh tokens.
pub trait TokenSource: Send + Sync {
    /// Produce the next candidate token.
    fn next_token(&self) -> EmbedToken;
}

/// Default source backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

impl TokenSource for OsRandomSource {
    fn next_token(&self) -> EmbedToken {
        EmbedToken::generate()
    }
}

/// Token service errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenError {
    /// Caller input is malformed.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Token is unknown, malformed, or expired.
    #[error("embed token not found")]
    NotFound,
    /// Every generated token collided with an existing one.
    #[error("no unique token after {attempts} attempts")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// The backing store failed.
    #[error("token store failure: {0}")]
    Store(String),
}

/// Issues and resolves embed tokens.
pub struct TokenService<S: TokenStore> {
    store: Arc<S>,
    config: TokenConfig,
    source: Arc<dyn TokenSource>,
}

impl<S: TokenStore> TokenService<S> {
    /// Create a service using the OS random source.
    pub fn new(store: Arc<S>, config: TokenConfig) -> Self {
        Self {
            store,
            config,
            source: Arc::new(OsRandomSource),
        }
    }

    /// Replace the token source.
    pub fn with_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.source = source;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The active limits.
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Resolve the requested TTL against the configured default and maximum.
    fn resolve_ttl(&self, ttl_days: Option<i64>) -> Result<Duration, TokenError> {
        let days = ttl_days.unwrap_or(self.config.default_ttl_days);
        if days < 1 {
            return Err(TokenError::Validation(format!(
                "expiry must be a positive number of days, got {}",
                days
            )));
        }
        if days > self.config.max_ttl_days {
            return Err(TokenError::Validation(format!(
                "expiry of {} days exceeds the maximum of {} days",
                days, self.config.max_ttl_days
            )));
        }
        Ok(Duration::days(days))
    }

    /// Issue a new token bound to `cypher`.
    ///
    /// The query is stored trimmed. Performs exactly one successful write.
    pub async fn issue_embed(&self, cypher: &str, ttl_days: Option<i64>) -> Result<EmbedRecord, TokenError> {
        let query = cypher.trim();
        if query.is_empty() {
            return Err(TokenError::Validation("cypher query is required".to_string()));
        }
        let ttl = self.resolve_ttl(ttl_days)?;

        let attempts = self.config.max_issue_attempts.max(1);
        for attempt in 1..=attempts {
            let record = EmbedRecord::new(self.source.next_token(), query, Utc::now(), ttl);

            let outcome = self
                .store
                .insert_if_absent(&record)
                .await
                .map_err(|e| TokenError::Store(e.to_string()))?;

            match outcome {
                InsertOutcome::Inserted => {
                    info!(
                        token_prefix = %record.token().prefix(),
                        ttl_seconds = record.ttl_seconds(),
                        attempt = attempt,
                        "Embed token issued"
                    );
                    return Ok(record);
                }
                InsertOutcome::Collision => {
                    warn!(attempt = attempt, "Embed token collision, regenerating");
                }
            }
        }

        Err(TokenError::Exhausted { attempts })
    }

    /// Look up a live token.
    pub async fn get_embed_data(&self, token: &str) -> Result<EmbedRecord, TokenError> {
        self.get_embed_data_at(token, Utc::now()).await
    }

    /// Look up a token as of `now`.
    ///
    /// Malformed, unknown and expired tokens all yield [`TokenError::NotFound`].
    pub async fn get_embed_data_at(&self, token: &str, now: DateTime<Utc>) -> Result<EmbedRecord, TokenError> {
        let Some(token) = EmbedToken::parse(token) else {
            debug!("Rejected malformed embed token");
            return Err(TokenError::NotFound);
        };

        let record = self
            .store
            .get(&token)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?;

        match record {
            Some(record) if record.is_live_at(now) => Ok(record),
            Some(record) => {
                debug!(token_prefix = %record.token().prefix(), "Embed token expired");
                Err(TokenError::NotFound)
            }
            None => Err(TokenError::NotFound),
        }
    }

    /// Physically delete expired records. Never changes logical state.
    pub async fn purge_expired(&self) -> Result<u64, TokenError> {
        let purged = self
            .store
            .purge_expired(Utc::now())
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?;
        if purged > 0 {
            info!(purged = purged, "Purged expired embed tokens");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenStore;

    struct FixedSource(EmbedToken);

    impl TokenSource for FixedSource {
        fn next_token(&self) -> EmbedToken {
            self.0.clone()
        }
    }

    fn service() -> TokenService<InMemoryTokenStore> {
        TokenService::new(Arc::new(InMemoryTokenStore::new()), TokenConfig::default())
    }

    #[tokio::test]
    async fn test_issue_then_lookup_roundtrip() {
        let service = service();
        let issued = service.issue_embed("  MATCH (n) RETURN n  ", Some(3)).await.unwrap();

        let found = service.get_embed_data(issued.token().as_str()).await.unwrap();
        assert_eq!(found.query(), "MATCH (n) RETURN n");
        assert_eq!(found.expires_at(), issued.expires_at());
        assert_eq!(found.ttl_seconds(), 3 * 86_400);
    }

    #[tokio::test]
    async fn test_default_ttl_is_one_day() {
        let service = service();
        let issued = service.issue_embed("MATCH (n) RETURN n", None).await.unwrap();
        assert_eq!(issued.ttl_seconds(), 86_400);
        assert!(issued.expires_at() > issued.created_at());
    }

    #[tokio::test]
    async fn test_rejects_blank_query() {
        let service = service();
        let err = service.issue_embed("   ", None).await.unwrap_err();
        assert!(matches!(err, TokenError::Validation(_)));
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_and_oversized_ttl() {
        let service = service();
        for days in [0, -1, 91] {
            let err = service.issue_embed("MATCH (n) RETURN n", Some(days)).await.unwrap_err();
            assert!(matches!(err, TokenError::Validation(_)), "days = {}", days);
        }
    }

    #[tokio::test]
    async fn test_collision_exhausts_after_bounded_retries() {
        let store = Arc::new(InMemoryTokenStore::new());
        let fixed = EmbedToken::generate();
        let service = TokenService::new(Arc::clone(&store), TokenConfig::default())
            .with_source(Arc::new(FixedSource(fixed.clone())));

        service.issue_embed("MATCH (a) RETURN a", None).await.unwrap();
        let err = service.issue_embed("MATCH (b) RETURN b", None).await.unwrap_err();

        assert!(matches!(err, TokenError::Exhausted { attempts: 3 }));
        // First record is never overwritten
        let kept = service.get_embed_data(fixed.as_str()).await.unwrap();
        assert_eq!(kept.query(), "MATCH (a) RETURN a");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_not_found_even_if_stored() {
        let service = service();
        let stale = EmbedRecord::new(
            EmbedToken::generate(),
            "MATCH (n) RETURN n",
            Utc::now() - Duration::days(2),
            Duration::days(1),
        );
        service.store().put(stale.clone());

        let err = service.get_embed_data(stale.token().as_str()).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
        assert_eq!(service.store().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_at_expiry_instant_is_not_found() {
        let service = service();
        let issued = service.issue_embed("MATCH (n) RETURN n", Some(1)).await.unwrap();
        let token = issued.token().as_str();

        let just_before = issued.expires_at() - Duration::milliseconds(1);
        assert!(service.get_embed_data_at(token, just_before).await.is_ok());

        let err = service.get_embed_data_at(token, issued.expires_at()).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_tokens_are_not_found() {
        let service = service();
        let unknown = EmbedToken::generate().to_string();
        for token in ["", "not-a-token", "../../etc/passwd", unknown.as_str()] {
            let err = service.get_embed_data(token).await.unwrap_err();
            assert!(matches!(err, TokenError::NotFound));
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_classified() {
        let service = service();
        service.store().set_available(false);

        let err = service.issue_embed("MATCH (n) RETURN n", None).await.unwrap_err();
        assert!(matches!(err, TokenError::Store(_)));
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_tokens() {
        let service = service();
        let live = service.issue_embed("MATCH (n) RETURN n", None).await.unwrap();
        service.store().put(EmbedRecord::new(
            EmbedToken::generate(),
            "MATCH (n) RETURN n",
            Utc::now() - Duration::days(3),
            Duration::days(1),
        ));

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert!(service.get_embed_data(live.token().as_str()).await.is_ok());
    }
}
