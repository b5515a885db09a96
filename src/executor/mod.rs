//! Graph Query Executor.
//!
//! Runs an already-gated Cypher statement against the graph database through
//! a bounded [`SessionPool`], under a wall-clock timeout and a row limit, and
//! flattens graph-native values into [`GraphValue`](crate::GraphValue)s.
//!
//! ## Timeouts
//!
//! One deadline covers the whole call: waiting for a pooled session, opening
//! or resetting it, and running the statement. When the deadline passes
//! during the run, the in-flight upstream future is dropped and the session
//! goes back to the pool dirty.

pub mod fixture;
pub mod flatten;
#[cfg(feature = "neo4j")]
pub mod neo4j;
pub mod pool;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::metrics;
use crate::types::{Params, QueryResult};

pub use fixture::{FixtureConnector, FixtureResponse, FixtureSession};
pub use flatten::{flatten_rows, flatten_value};
#[cfg(feature = "neo4j")]
pub use neo4j::{Neo4jConfig, Neo4jConnector, Neo4jSession};
pub use pool::{PoolError, PooledSession, SessionPool, SessionPoolStats};
pub use upstream::{
    GraphConnector, GraphSession, Statement, UpstreamError, UpstreamNode, UpstreamPath, UpstreamRelationship,
    UpstreamRows, UpstreamValue,
};

/// Executor limits.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout when the caller does not ask for one (default: 10 s).
    pub default_timeout: Duration,
    /// Upper bound on any requested timeout (default: 30 s).
    pub max_timeout: Duration,
    /// Rows read per query before truncating (default: 1000).
    pub max_rows: usize,
    /// Concurrently checked-out sessions (default: 10).
    pub pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(30),
            max_rows: 1000,
            pool_size: 10,
        }
    }
}

impl ExecutorConfig {
    /// Load from environment variables.
    ///
    /// - `QUERY_DEFAULT_TIMEOUT_MS`
    /// - `QUERY_MAX_TIMEOUT_MS`
    /// - `QUERY_MAX_ROWS`
    /// - `GRAPH_POOL_SIZE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            default_timeout: millis("QUERY_DEFAULT_TIMEOUT_MS", defaults.default_timeout),
            max_timeout: millis("QUERY_MAX_TIMEOUT_MS", defaults.max_timeout),
            max_rows: std::env::var("QUERY_MAX_ROWS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_rows),
            pool_size: std::env::var("GRAPH_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
        }
    }
}

impl ExecutorConfig {
    /// Reject limits the executor cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Zero("GRAPH_POOL_SIZE"));
        }
        if self.max_rows == 0 {
            return Err(ConfigError::Zero("QUERY_MAX_ROWS"));
        }
        if self.default_timeout.is_zero() {
            return Err(ConfigError::Zero("QUERY_DEFAULT_TIMEOUT_MS"));
        }
        if self.default_timeout > self.max_timeout {
            return Err(ConfigError::Inverted {
                lower: "QUERY_DEFAULT_TIMEOUT_MS",
                upper: "QUERY_MAX_TIMEOUT_MS",
            });
        }
        Ok(())
    }
}

/// Execution failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// The call did not finish within its timeout.
    #[error("graph query exceeded the {limit_ms} ms timeout")]
    Timeout {
        /// Effective timeout.
        limit_ms: u64,
    },
    /// No session freed up within the timeout.
    #[error("no graph session available after {waited_ms} ms")]
    PoolExhausted {
        /// Time spent waiting.
        waited_ms: u64,
    },
    /// Transport or connection failure.
    #[error("graph database unavailable: {0}")]
    Unavailable(String),
    /// The database rejected the statement.
    #[error("graph query failed: {0}")]
    Query(String),
}

impl From<PoolError> for ExecutorError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { waited_ms } => ExecutorError::PoolExhausted { waited_ms },
            PoolError::Timeout { limit_ms } => ExecutorError::Timeout { limit_ms },
            PoolError::Closed => ExecutorError::Unavailable("graph session pool is closed".to_string()),
            PoolError::Upstream(e) => ExecutorError::Unavailable(e.to_string()),
        }
    }
}

/// Executes statements against a pooled upstream.
pub struct GraphExecutor<C: GraphConnector> {
    pool: SessionPool<C>,
    config: ExecutorConfig,
}

impl<C: GraphConnector> GraphExecutor<C> {
    /// Create an executor with a pool of `config.pool_size` sessions.
    pub fn new(connector: Arc<C>, config: ExecutorConfig) -> Self {
        Self {
            pool: SessionPool::new(connector, config.pool_size),
            config,
        }
    }

    /// Active limits.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The session pool.
    pub fn pool(&self) -> &SessionPool<C> {
        &self.pool
    }

    /// Resolve a requested timeout: absent or zero means the default, and
    /// anything above the maximum is clamped.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .filter(|d| !d.is_zero())
            .unwrap_or(self.config.default_timeout)
            .min(self.config.max_timeout)
    }

    /// Execute a statement and return flattened rows.
    pub async fn execute(
        &self,
        cypher: &str,
        params: &Params,
        timeout: Option<Duration>,
    ) -> Result<QueryResult, ExecutorError> {
        let limit = self.effective_timeout(timeout);
        let limit_ms = limit.as_millis() as u64;
        let started = Instant::now();
        let deadline = started + limit;

        let mut session = self.pool.acquire(limit).await.map_err(|e| {
            warn!(error = %e, "Failed to acquire graph session");
            ExecutorError::from(e)
        })?;

        let statement = Statement::new(cypher, params.clone());
        let outcome = tokio::time::timeout_at(deadline, session.run(&statement, self.config.max_rows)).await;

        let mut rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(UpstreamError::Unavailable(message))) => {
                warn!(error = %message, "Graph session failed, discarding");
                session.discard();
                return Err(ExecutorError::Unavailable(message));
            }
            Ok(Err(UpstreamError::Query(message))) => {
                debug!(error = %message, "Graph database rejected query");
                return Err(ExecutorError::Query(message));
            }
            Err(_) => {
                warn!(timeout_ms = limit_ms, "Graph query timed out");
                return Err(ExecutorError::Timeout { limit_ms });
            }
        };
        drop(session);

        if rows.rows.len() > self.config.max_rows {
            rows.rows.truncate(self.config.max_rows);
            rows.truncated = true;
        }

        let result = flatten_rows(rows);
        debug!(
            rows = result.len(),
            truncated = result.truncated,
            latency_ms = started.elapsed().as_millis() as u64,
            "Graph query executed"
        );
        Ok(result)
    }

    /// Check out a session and reset it within `wait`.
    pub async fn is_healthy(&self, wait: Duration) -> bool {
        let Ok(mut session) = self.pool.acquire(wait).await else {
            return false;
        };
        matches!(tokio::time::timeout(wait, session.reset()).await, Ok(Ok(())))
    }

    /// Pool counters, also emitted as a metric event.
    pub fn pool_stats(&self) -> SessionPoolStats {
        let stats = self.pool.stats();
        metrics::record_pool(&stats);
        stats
    }

    /// Close the session pool.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphValue;

    fn executor(connector: &Arc<FixtureConnector>, config: ExecutorConfig) -> GraphExecutor<FixtureConnector> {
        GraphExecutor::new(Arc::clone(connector), config)
    }

    fn people(n: usize) -> UpstreamRows {
        FixtureConnector::nodes(
            "n",
            "Person",
            (0..n).map(|i| vec![("name".to_string(), UpstreamValue::String(format!("p{}", i)))]),
        )
    }

    #[test]
    fn test_effective_timeout() {
        let connector = Arc::new(FixtureConnector::new());
        let exec = executor(&connector, ExecutorConfig::default());

        assert_eq!(exec.effective_timeout(None), Duration::from_secs(10));
        assert_eq!(exec.effective_timeout(Some(Duration::ZERO)), Duration::from_secs(10));
        assert_eq!(exec.effective_timeout(Some(Duration::from_millis(50))), Duration::from_millis(50));
        assert_eq!(exec.effective_timeout(Some(Duration::from_secs(600))), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_rows_are_flattened() {
        let connector = Arc::new(FixtureConnector::new());
        connector.respond("MATCH (n) RETURN n", FixtureResponse::Rows(people(2)));
        let exec = executor(&connector, ExecutorConfig::default());

        let result = exec.execute("MATCH (n) RETURN n", &Params::new(), None).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.rows[1]["n"].get("properties").and_then(|p| p.get("name")),
            Some(&GraphValue::from("p1"))
        );
    }

    #[tokio::test]
    async fn test_row_limit_truncates() {
        let connector = Arc::new(FixtureConnector::new());
        connector.respond("MATCH (n) RETURN n", FixtureResponse::Rows(people(5)));
        let config = ExecutorConfig {
            max_rows: 3,
            ..ExecutorConfig::default()
        };
        let exec = executor(&connector, config);

        let result = exec.execute("MATCH (n) RETURN n", &Params::new(), None).await.unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_timeout_returns_session_dirty_for_reuse() {
        let connector = Arc::new(FixtureConnector::new());
        connector.respond("SLOW", FixtureResponse::Stall(Duration::from_millis(500)));
        connector.respond("RETURN 1 AS one", FixtureResponse::Rows(UpstreamRows::default()));
        let exec = executor(&connector, ExecutorConfig::default());

        let started = std::time::Instant::now();
        let err = exec
            .execute("SLOW", &Params::new(), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { limit_ms: 50 }));
        assert!(started.elapsed() < Duration::from_millis(400));

        exec.execute("RETURN 1 AS one", &Params::new(), None).await.unwrap();
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connector.reset_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_discards_session() {
        let connector = Arc::new(FixtureConnector::new());
        connector.respond(
            "BROKEN",
            FixtureResponse::Fail(UpstreamError::Unavailable("connection reset".to_string())),
        );
        connector.respond("RETURN 1 AS one", FixtureResponse::Rows(UpstreamRows::default()));
        let exec = executor(&connector, ExecutorConfig::default());

        let err = exec.execute("BROKEN", &Params::new(), None).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Unavailable(_)));

        exec.execute("RETURN 1 AS one", &Params::new(), None).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_query_error_keeps_session() {
        let connector = Arc::new(FixtureConnector::new());
        let exec = executor(&connector, ExecutorConfig::default());

        let err = exec.execute("RETURN nope", &Params::new(), None).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Query(_)));
        assert_eq!(exec.pool_stats().idle, 1);
    }

    #[tokio::test]
    async fn test_parameters_reach_upstream() {
        let connector = Arc::new(FixtureConnector::new());
        connector.respond(
            "MATCH (n {id: $id}) RETURN n",
            FixtureResponse::Rows(UpstreamRows::default()),
        );
        let exec = executor(&connector, ExecutorConfig::default());

        let mut params = Params::new();
        params.insert("id".to_string(), GraphValue::Int(7));
        exec.execute("MATCH (n {id: $id}) RETURN n", &params, None).await.unwrap();

        assert_eq!(connector.statements()[0].params, params);
    }

    #[tokio::test]
    async fn test_shutdown_makes_executor_unavailable() {
        let connector = Arc::new(FixtureConnector::new());
        let exec = executor(&connector, ExecutorConfig::default());
        assert!(exec.is_healthy(Duration::from_secs(1)).await);

        exec.shutdown();
        let err = exec.execute("RETURN 1", &Params::new(), None).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Unavailable(_)));
        assert!(!exec.is_healthy(Duration::from_millis(10)).await);
    }
}
