//! Process configuration.
//!
//! Every component owns a config struct with a `from_env` constructor;
//! [`EmbedConfig`] gathers them for the service binary.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` / `PORT` | `0.0.0.0` / `8000` |
//! | `EMBED_BASE_URL` | `http://localhost:8000` |
//! | `DEFAULT_TOKEN_EXPIRY_DAYS` / `MAX_TOKEN_EXPIRY_DAYS` | 1 / 90 |
//! | `QUERY_DEFAULT_TIMEOUT_MS` / `QUERY_MAX_TIMEOUT_MS` | 10000 / 30000 |
//! | `QUERY_MAX_ROWS` / `QUERY_MAX_LENGTH` | 1000 / 10000 |
//! | `GRAPH_POOL_SIZE` | 10 |
//! | `ALLOW_WRITE_QUERIES` / `ALLOW_STRING_LITERALS` / `ALLOW_DIRECT_QUERIES` | false / false / true |
//! | `TOKEN_CACHE_ENTRIES` | 10000 (0 disables) |
//! | `TOKEN_PURGE_INTERVAL_SECS` | 3600 (0 disables) |

use std::time::Duration;

use crate::embed::FacadeConfig;
use crate::executor::ExecutorConfig;
use crate::gate::GateConfig;
use crate::store::CacheConfig;
use crate::token_service::TokenConfig;

#[cfg(feature = "neo4j")]
use crate::executor::Neo4jConfig;
#[cfg(feature = "postgres")]
use crate::store::PostgresConfig;

/// A setting that would leave the service unable to serve requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A count or duration that must be positive.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// A default larger than its upper bound.
    #[error("{lower} must not exceed {upper}")]
    Inverted {
        /// Setting holding the default.
        lower: &'static str,
        /// Setting holding the bound.
        upper: &'static str,
    },
}

/// Default interval between expired-token purges.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Aggregated configuration.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Token issuance limits.
    pub tokens: TokenConfig,
    /// Query gate policy.
    pub gate: GateConfig,
    /// Executor limits.
    pub executor: ExecutorConfig,
    /// Façade settings.
    pub facade: FacadeConfig,
    /// Token cache.
    pub cache: CacheConfig,
    /// Interval of the expired-token reaper; `None` disables it.
    pub purge_interval: Option<Duration>,
    /// Token table connection.
    #[cfg(feature = "postgres")]
    pub postgres: PostgresConfig,
    /// Graph database connection.
    #[cfg(feature = "neo4j")]
    pub neo4j: Neo4jConfig,
}

impl EmbedConfig {
    /// Load every section from the environment.
    pub fn from_env() -> Self {
        let purge_secs = std::env::var("TOKEN_PURGE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PURGE_INTERVAL.as_secs());

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            tokens: TokenConfig::from_env(),
            gate: GateConfig::from_env(),
            executor: ExecutorConfig::from_env(),
            facade: FacadeConfig::from_env(),
            cache: CacheConfig::from_env(),
            purge_interval: (purge_secs > 0).then(|| Duration::from_secs(purge_secs)),
            #[cfg(feature = "postgres")]
            postgres: PostgresConfig::from_env(),
            #[cfg(feature = "neo4j")]
            neo4j: Neo4jConfig::from_env(),
        }
    }

    /// Check every section; the service refuses to start on the first error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tokens.validate()?;
        self.executor.validate()?;
        if self.gate.max_query_length == 0 {
            return Err(ConfigError::Zero("QUERY_MAX_LENGTH"));
        }
        Ok(())
    }

    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
