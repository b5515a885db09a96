//! Shared service state and background tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::embed::EmbedFacade;
use crate::executor::GraphConnector;
use crate::store::TokenStore;

/// Default wait for health probes.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared by every handler.
pub struct ServiceState<S: TokenStore, C: GraphConnector> {
    facade: Arc<EmbedFacade<S, C>>,
    started_at: DateTime<Utc>,
    probe_timeout: Duration,
}

impl<S: TokenStore + 'static, C: GraphConnector> ServiceState<S, C> {
    /// Wrap a façade.
    pub fn new(facade: Arc<EmbedFacade<S, C>>) -> Self {
        Self {
            facade,
            started_at: Utc::now(),
            probe_timeout: HEALTH_PROBE_TIMEOUT,
        }
    }

    /// Override the health probe wait.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// The façade.
    pub fn facade(&self) -> &Arc<EmbedFacade<S, C>> {
        &self.facade
    }

    /// Health probe wait.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Seconds since the state was built.
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// Periodically purge expired tokens until the task is aborted.
///
/// Failures are logged and retried on the next tick.
pub fn spawn_token_reaper<S, C>(facade: Arc<EmbedFacade<S, C>>, every: Duration) -> JoinHandle<()>
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    info!(interval_secs = every.as_secs(), "Starting expired token reaper");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = facade.purge_expired().await {
                warn!(error = %e, "Expired token purge failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::FacadeConfig;
    use crate::executor::{ExecutorConfig, FixtureConnector, GraphExecutor};
    use crate::gate::QueryGate;
    use crate::store::InMemoryTokenStore;
    use crate::token_service::{TokenConfig, TokenService};
    use crate::types::{EmbedRecord, EmbedToken};

    #[tokio::test]
    async fn test_reaper_purges_expired_tokens() {
        let store = Arc::new(InMemoryTokenStore::new());
        store.put(EmbedRecord::new(
            EmbedToken::generate(),
            "MATCH (n) RETURN n",
            Utc::now() - chrono::Duration::days(2),
            chrono::Duration::days(1),
        ));
        let facade = Arc::new(EmbedFacade::new(
            TokenService::new(Arc::clone(&store), TokenConfig::default()),
            QueryGate::default(),
            GraphExecutor::new(Arc::new(FixtureConnector::new()), ExecutorConfig::default()),
            FacadeConfig::default(),
        ));

        let reaper = spawn_token_reaper(facade, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        reaper.abort();

        assert!(store.is_empty());
    }
}
