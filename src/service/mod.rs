//! Embed REST Service
//!
//! Exposes the embed façade over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/embed` - Issue an embed token for a query
//! - `GET /api/embed/:token` - Resolve a token to its stored query
//! - `POST /api/proxy/query` - Run a token-bound or direct query
//! - `GET /` - Service banner
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{access_log_middleware, metrics_middleware, normalize_path, REQUEST_ID_HEADER};
#[cfg(all(feature = "postgres", feature = "neo4j"))]
pub use routes::AppState;
pub use routes::{create_router, HealthResponse, LivenessResponse, ReadinessResponse, RootResponse};
pub use state::{spawn_token_reaper, ServiceState, HEALTH_PROBE_TIMEOUT};
