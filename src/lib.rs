//! # cypher-embed
//!
//! Shareable, expiring links to read-only Cypher queries, plus a guarded
//! query proxy in front of a Neo4j-compatible graph database.
//!
//! A client stores a query and gets back an opaque embed token; a viewer
//! holding the token can fetch the query and run it through the proxy
//! until the token expires.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌─────────────── EmbedFacade ───────────────┐
//! issue_embed  →  │ QueryGate::validate_structure → TokenService │ → TokenStore (Postgres / memory, LRU cached)
//! view_embed   →  │ TokenService::get_embed_data                 │
//! proxy_query  →  │ QueryGate::validate → GraphExecutor          │ → SessionPool → GraphSession (neo4rs / fixture)
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Tokens carry 192 bits from the OS CSPRNG and are never overwritten
//! - An expired token behaves exactly like an unknown one
//! - No query reaches the graph database without passing the gate
//! - Every upstream call is bounded by a timeout and a row limit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod embed;
pub mod executor;
pub mod fingerprint;
pub mod gate;
pub mod metrics;
pub mod store;
pub mod token_service;
pub mod types;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use config::{ConfigError, EmbedConfig};
pub use embed::{
    EmbedError, EmbedFacade, EmbedIssued, EmbedView, Envelope, FacadeConfig, HealthReport, IssueEmbedRequest,
    ProxyQuery, ProxyQueryRequest, ProxyTarget, Reply,
};
pub use executor::{
    ExecutorConfig, ExecutorError, FixtureConnector, FixtureResponse, GraphConnector, GraphExecutor, GraphSession,
    SessionPool, SessionPoolStats, Statement, UpstreamError, UpstreamRows, UpstreamValue,
};
#[cfg(feature = "neo4j")]
pub use executor::{Neo4jConfig, Neo4jConnector};
pub use fingerprint::query_fingerprint;
pub use gate::{GateConfig, QueryGate, QueryShape, RejectionReason};
pub use store::{CacheConfig, CacheStats, CachedTokenStore, InMemoryTokenStore, InsertOutcome, TokenStore};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresTokenStore};
pub use token_service::{TokenConfig, TokenError, TokenService, TokenSource};
pub use types::{EmbedRecord, EmbedToken, GraphValue, Params, QueryResult, Row, TokenState};
