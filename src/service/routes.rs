//! Axum routes for the embed service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::embed::{EmbedError, IssueEmbedRequest, ProxyQueryRequest, Reply};
use crate::executor::{GraphConnector, SessionPoolStats};
use crate::store::TokenStore;

use super::state::ServiceState;

/// Service state of the production binary.
#[cfg(all(feature = "postgres", feature = "neo4j"))]
pub type AppState =
    ServiceState<crate::store::CachedTokenStore<crate::store::PostgresTokenStore>, crate::executor::Neo4jConnector>;

// ============================================================================
// Response Types
// ============================================================================

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    /// Always true.
    pub success: bool,
    /// Greeting.
    pub message: String,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Seconds since startup.
    pub uptime_seconds: i64,
    /// Token store reachable.
    pub store: bool,
    /// Graph database reachable.
    pub upstream: bool,
    /// Session pool counters.
    pub pool: SessionPoolStats,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Both dependencies reachable.
    pub ready: bool,
    /// Token store reachable.
    pub store: bool,
    /// Graph database reachable.
    pub upstream: bool,
    /// What is missing, when not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn reply<T: Serialize>(reply: Reply<T>) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !reply.is_success() {
        tracing::debug!(
            status = reply.status,
            code = reply.error_code().unwrap_or_default(),
            "Request failed"
        );
    }
    (status, Json(reply.body)).into_response()
}

/// Malformed JSON bodies get the same envelope as any other validation error.
fn invalid_body(rejection: JsonRejection) -> Response {
    reply(Reply::<()>::from_error(&EmbedError::Validation(format!(
        "invalid request body: {}",
        rejection.body_text()
    ))))
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        success: true,
        message: "Cypher embed service is running".to_string(),
    })
}

/// Issue an embed token.
async fn issue_embed_handler<S, C>(
    State(state): State<Arc<ServiceState<S, C>>>,
    payload: Result<Json<IssueEmbedRequest>, JsonRejection>,
) -> Response
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    match payload {
        Ok(Json(request)) => reply(state.facade().issue_embed(request).await),
        Err(rejection) => invalid_body(rejection),
    }
}

/// Resolve a token to its stored query.
async fn view_embed_handler<S, C>(
    State(state): State<Arc<ServiceState<S, C>>>,
    Path(token): Path<String>,
) -> Response
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    reply(state.facade().view_embed_data(&token).await)
}

/// Run a token-bound or direct query.
async fn proxy_query_handler<S, C>(
    State(state): State<Arc<ServiceState<S, C>>>,
    payload: Result<Json<ProxyQueryRequest>, JsonRejection>,
) -> Response
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    match payload {
        Ok(Json(request)) => reply(state.facade().proxy_query(request).await),
        Err(rejection) => invalid_body(rejection),
    }
}

/// Health check endpoint (detailed).
async fn health_handler<S, C>(State(state): State<Arc<ServiceState<S, C>>>) -> Json<HealthResponse>
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    let report = state.facade().health(state.probe_timeout()).await;
    Json(HealthResponse {
        status: if report.is_healthy() { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        store: report.store,
        upstream: report.upstream,
        pool: report.pool,
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the token store and graph database are reachable, 503
/// otherwise.
async fn readiness_handler<S, C>(
    State(state): State<Arc<ServiceState<S, C>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)>
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    let report = state.facade().health(state.probe_timeout()).await;

    if report.is_healthy() {
        return Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            upstream: true,
            details: None,
        }));
    }

    let details = match (report.store, report.upstream) {
        (false, false) => "Token store and graph database unreachable",
        (false, true) => "Token store unreachable",
        _ => "Graph database unreachable",
    };
    Err((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            ready: false,
            store: report.store,
            upstream: report.upstream,
            details: Some(details.to_string()),
        }),
    ))
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the embed service.
pub fn create_router<S, C>(state: ServiceState<S, C>) -> Router
where
    S: TokenStore + 'static,
    C: GraphConnector,
{
    let state = Arc::new(state);

    Router::new()
        .route("/", get(root_handler))
        // Embed tokens
        .route("/api/embed", post(issue_embed_handler::<S, C>))
        .route("/api/embed/:token", get(view_embed_handler::<S, C>))
        // Query proxy
        .route("/api/proxy/query", post(proxy_query_handler::<S, C>))
        // Health checks
        .route("/health", get(health_handler::<S, C>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S, C>))
        .with_state(state)
}
