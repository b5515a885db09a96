//! User-facing error kinds.
//!
//! Every lower-layer error is folded into one [`EmbedError`] here; nothing
//! below the façade knows about status codes.
//!
//! | Kind | Code | Status |
//! |------|------|--------|
//! | `Validation` | `VALIDATION_ERROR` | 400 |
//! | `NotFound` | `NOT_FOUND` | 404 |
//! | `Rejected`, `DirectQueriesDisabled` | `REJECTED_QUERY` | 403 |
//! | `ResourceExhausted` | `RESOURCE_EXHAUSTED` | 503 |
//! | `UpstreamTimeout` | `UPSTREAM_TIMEOUT` | 504 |
//! | `UpstreamUnavailable` | `UPSTREAM_UNAVAILABLE` | 503 |
//! | `QueryError` | `QUERY_ERROR` | 400 |
//! | `StoreUnavailable` | `STORE_UNAVAILABLE` | 503 |

use crate::executor::ExecutorError;
use crate::gate::RejectionReason;
use crate::token_service::TokenError;

/// Façade error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbedError {
    /// Malformed request.
    #[error("{0}")]
    Validation(String),
    /// Unknown, malformed or expired token.
    #[error("embed token not found or expired")]
    NotFound,
    /// Refused by the query gate.
    #[error("query rejected: {0}")]
    Rejected(RejectionReason),
    /// Direct queries are switched off; only token-bound queries run.
    #[error("query rejected: direct queries are disabled, use an embed token")]
    DirectQueriesDisabled,
    /// A bounded resource is saturated.
    #[error("{0}")]
    ResourceExhausted(String),
    /// The graph database did not answer in time.
    #[error("{0}")]
    UpstreamTimeout(String),
    /// The graph database could not be reached.
    #[error("graph database is temporarily unavailable")]
    UpstreamUnavailable(String),
    /// The graph database rejected the query.
    #[error("cypher query error: {0}")]
    QueryError(String),
    /// The token store failed.
    #[error("token store is temporarily unavailable")]
    StoreUnavailable(String),
}

impl EmbedError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EmbedError::Validation(_) => "VALIDATION_ERROR",
            EmbedError::NotFound => "NOT_FOUND",
            EmbedError::Rejected(_) | EmbedError::DirectQueriesDisabled => "REJECTED_QUERY",
            EmbedError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            EmbedError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            EmbedError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            EmbedError::QueryError(_) => "QUERY_ERROR",
            EmbedError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// HTTP status.
    pub fn status(&self) -> u16 {
        match self {
            EmbedError::Validation(_) | EmbedError::QueryError(_) => 400,
            EmbedError::NotFound => 404,
            EmbedError::Rejected(_) | EmbedError::DirectQueriesDisabled => 403,
            EmbedError::ResourceExhausted(_)
            | EmbedError::UpstreamUnavailable(_)
            | EmbedError::StoreUnavailable(_) => 503,
            EmbedError::UpstreamTimeout(_) => 504,
        }
    }

    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status(), 503 | 504)
    }
}

impl From<TokenError> for EmbedError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Validation(message) => EmbedError::Validation(message),
            TokenError::NotFound => EmbedError::NotFound,
            TokenError::Exhausted { .. } => EmbedError::ResourceExhausted(err.to_string()),
            TokenError::Store(message) => EmbedError::StoreUnavailable(message),
        }
    }
}

impl From<RejectionReason> for EmbedError {
    fn from(reason: RejectionReason) -> Self {
        EmbedError::Rejected(reason)
    }
}

impl From<ExecutorError> for EmbedError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Timeout { .. } => EmbedError::UpstreamTimeout(err.to_string()),
            ExecutorError::PoolExhausted { .. } => EmbedError::ResourceExhausted(err.to_string()),
            ExecutorError::Unavailable(message) => EmbedError::UpstreamUnavailable(message),
            ExecutorError::Query(message) => EmbedError::QueryError(message),
        }
    }
}
