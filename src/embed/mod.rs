//! Embed façade.
//!
//! Composes the token service, the query gate and the graph executor into
//! the three user-facing operations, and is the only layer that turns error
//! kinds into status codes and messages.
//!
//! ```text
//! issue_embed      → validate_structure → TokenService::issue_embed → URL
//! view_embed_data  → TokenService::get_embed_data
//! proxy_query      → (token lookup) → QueryGate::validate → GraphExecutor::execute
//! ```

pub mod envelope;
pub mod error;
pub mod request;

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::executor::{GraphConnector, GraphExecutor, SessionPoolStats};
use crate::fingerprint::query_fingerprint;
use crate::gate::{env_flag, QueryGate, RejectionReason};
use crate::metrics;
use crate::store::TokenStore;
use crate::token_service::TokenService;
use crate::types::{EmbedToken, QueryResult};

pub use envelope::{Envelope, ErrorBody, Reply};
pub use error::EmbedError;
pub use request::{EmbedIssued, EmbedView, IssueEmbedRequest, ProxyQuery, ProxyQueryRequest, ProxyTarget};

/// Façade settings.
#[derive(Debug, Clone)]
pub struct FacadeConfig {
    /// Base URL viewer links are built on, without trailing slash.
    pub base_url: String,
    /// Accept `cypher` in proxy requests (default: true).
    pub allow_direct_queries: bool,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            allow_direct_queries: true,
        }
    }
}

impl FacadeConfig {
    /// Load from `EMBED_BASE_URL` and `ALLOW_DIRECT_QUERIES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("EMBED_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            allow_direct_queries: env_flag("ALLOW_DIRECT_QUERIES").unwrap_or(defaults.allow_direct_queries),
        }
    }
}

/// Reachability of the façade's dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Token store answered.
    pub store: bool,
    /// A graph session could be checked out and reset.
    pub upstream: bool,
    /// Session pool counters.
    pub pool: SessionPoolStats,
}

impl HealthReport {
    /// Every dependency is reachable.
    pub fn is_healthy(&self) -> bool {
        self.store && self.upstream
    }
}

/// The embed service.
pub struct EmbedFacade<S: TokenStore, C: GraphConnector> {
    tokens: TokenService<S>,
    gate: QueryGate,
    executor: GraphExecutor<C>,
    config: FacadeConfig,
}

impl<S: TokenStore, C: GraphConnector> EmbedFacade<S, C> {
    /// Assemble the façade from its parts.
    pub fn new(tokens: TokenService<S>, gate: QueryGate, executor: GraphExecutor<C>, config: FacadeConfig) -> Self {
        Self {
            tokens,
            gate,
            executor,
            config,
        }
    }

    /// Token service.
    pub fn tokens(&self) -> &TokenService<S> {
        &self.tokens
    }

    /// Query gate.
    pub fn gate(&self) -> &QueryGate {
        &self.gate
    }

    /// Graph executor.
    pub fn executor(&self) -> &GraphExecutor<C> {
        &self.executor
    }

    /// Settings.
    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    /// Viewer URL for a token.
    pub fn embed_url(&self, token: &EmbedToken) -> String {
        format!("{}/view/{}", self.config.base_url, token)
    }

    fn reject(&self, cypher: &str, reason: RejectionReason) -> EmbedError {
        info!(
            query_fingerprint = %query_fingerprint(cypher),
            code = reason.code(),
            reason = %reason,
            "Rejected query"
        );
        debug!(query = %cypher, "Rejected query text");
        EmbedError::Rejected(reason)
    }

    /// Issue an embed token for a query.
    pub async fn issue_embed(&self, request: IssueEmbedRequest) -> Reply<EmbedIssued> {
        let result = self.try_issue_embed(request).await;
        match &result {
            Ok(issued) => metrics::record_embed_issued("issued", Some(issued.expires_in)),
            Err(err) => metrics::record_embed_issued(err.code(), None),
        }
        result.into()
    }

    /// [`issue_embed`](Self::issue_embed) without the envelope.
    pub async fn try_issue_embed(&self, request: IssueEmbedRequest) -> Result<EmbedIssued, EmbedError> {
        let cypher = request.cypher_query.trim();
        if cypher.is_empty() {
            return Err(EmbedError::Validation("cypherQuery is required".to_string()));
        }
        self.gate
            .validate_structure(cypher)
            .map_err(|reason| self.reject(cypher, reason))?;

        let record = self.tokens.issue_embed(cypher, request.expires_in_days).await?;

        Ok(EmbedIssued {
            embed_url: self.embed_url(record.token()),
            embed_token: record.token().to_string(),
            expires_at: record.expires_at(),
            expires_in: record.ttl_seconds(),
        })
    }

    /// Resolve a token to its stored query.
    pub async fn view_embed_data(&self, token: &str) -> Reply<EmbedView> {
        let result = self.try_view_embed_data(token).await;
        metrics::record_embed_viewed(result.is_ok());
        result.into()
    }

    /// [`view_embed_data`](Self::view_embed_data) without the envelope.
    pub async fn try_view_embed_data(&self, token: &str) -> Result<EmbedView, EmbedError> {
        let record = self.tokens.get_embed_data(token).await?;
        Ok(EmbedView {
            cypher_query: record.query().to_string(),
            token: record.token().to_string(),
            expires_at: record.expires_at(),
        })
    }

    /// Run a token-bound or direct query through the gate and executor.
    pub async fn proxy_query(&self, request: ProxyQueryRequest) -> Reply<QueryResult> {
        let started = Instant::now();
        let (target, result) = match ProxyQuery::try_from(request) {
            Ok(query) => (query.target.kind(), self.run_proxy_query(query).await),
            Err(err) => ("invalid", Err(err)),
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(rows) => metrics::record_proxy_query(target, "ok", rows.len(), latency_ms),
            Err(err) => metrics::record_proxy_query(target, err.code(), 0, latency_ms),
        }
        result.into()
    }

    /// [`proxy_query`](Self::proxy_query) on an already-validated request.
    pub async fn run_proxy_query(&self, query: ProxyQuery) -> Result<QueryResult, EmbedError> {
        let cypher = match query.target {
            ProxyTarget::Token(token) => {
                let record = self.tokens.get_embed_data(&token).await?;
                debug!(token_prefix = %record.token().prefix(), "Proxying token-bound query");
                record.query().to_string()
            }
            ProxyTarget::Direct(_) if !self.config.allow_direct_queries => {
                return Err(EmbedError::DirectQueriesDisabled);
            }
            ProxyTarget::Direct(cypher) => cypher,
        };

        self.gate
            .validate(&cypher, &query.params)
            .map_err(|reason| self.reject(&cypher, reason))?;

        let result = self.executor.execute(&cypher, &query.params, query.timeout).await?;
        if result.truncated {
            info!(
                query_fingerprint = %query_fingerprint(&cypher),
                rows = result.len(),
                "Query result truncated at row limit"
            );
        }
        Ok(result)
    }

    /// Delete expired tokens from the store.
    pub async fn purge_expired(&self) -> Result<u64, EmbedError> {
        Ok(self.tokens.purge_expired().await?)
    }

    /// Probe the store and the graph database.
    pub async fn health(&self, wait: Duration) -> HealthReport {
        let (store, upstream) = tokio::join!(self.tokens.store().is_healthy(), self.executor.is_healthy(wait));
        HealthReport {
            store,
            upstream,
            pool: self.executor.pool_stats(),
        }
    }

    /// Close the session pool.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}
