//! HTTP front end for the embed service.
//!
//! Wires the Postgres token table and the Neo4j session pool into an
//! [`EmbedFacade`] and serves it over axum. Logs are JSON lines unless
//! `LOG_FORMAT=pretty`; every response carries an `X-Request-Id` (generated
//! when the caller sends none). Expired tokens are purged in the background.
//!
//! ## Configuration
//!
//! Environment variables (see `cypher_embed::config` for the full table):
//! - `DATABASE_URL`: PostgreSQL connection string for the token table
//! - `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`, `NEO4J_DATABASE`: graph database
//! - `EMBED_BASE_URL`: base of generated viewer links
//! - `HOST` / `PORT`: bind address (default `0.0.0.0:8000`)
//! - `RUST_LOG`: filter directives (default `cypher_embed=info`)
//! - `LOG_FORMAT`: `json` or `pretty`
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... NEO4J_URI=bolt://... cargo run --bin cypher_embed_service --features service
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::Request, middleware};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use cypher_embed::service::{
    access_log_middleware, create_router, metrics_middleware, normalize_path, spawn_token_reaper, ServiceState,
};
use cypher_embed::{
    CachedTokenStore, EmbedConfig, EmbedFacade, GraphExecutor, Neo4jConnector, PostgresTokenStore, QueryGate,
    TokenService,
};

/// JSON lines by default; `LOG_FORMAT=pretty` for a terminal.
fn init_tracing() {
    let pretty = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("pretty"));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cypher_embed=info,cypher_embed_service=info,tower_http=info,sqlx=warn"));

    let json = (!pretty).then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .flatten_event(true)
    });
    let human = pretty.then(|| fmt::layer().compact().with_span_events(FmtSpan::CLOSE));

    tracing_subscriber::registry().with(filter).with(json).with(human).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "SIGINT", "Draining connections"),
        _ = terminate => info!(signal = "SIGTERM", "Draining connections"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    info!(version = version, git = option_env!("BUILD_SHA").unwrap_or("dev"), "Starting");

    let config = EmbedConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    info!(
        read_write = config.gate.read_write,
        allow_direct_queries = config.facade.allow_direct_queries,
        max_rows = config.executor.max_rows,
        pool_size = config.executor.pool_size,
        "Configuration loaded"
    );
    if config.gate.read_write {
        warn!("ALLOW_WRITE_QUERIES is enabled; proxied queries may modify the graph");
    }

    // Token table
    let connect_start = Instant::now();
    let postgres = match tokio::time::timeout(
        Duration::from_secs(30),
        PostgresTokenStore::new(config.postgres.clone()),
    )
    .await
    {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            error!(timeout_secs = 30, "Token store did not answer");
            return Err("token store connection timed out".into());
        }
    };
    postgres.migrate().await?;
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "Token store ready"
    );
    let store = Arc::new(CachedTokenStore::new(postgres, config.cache.clone()));

    // Graph database; sessions open lazily, so an unreachable database only
    // degrades readiness
    let connector = Arc::new(Neo4jConnector::new(config.neo4j.clone()));
    let executor = GraphExecutor::new(connector, config.executor.clone());

    let facade = Arc::new(EmbedFacade::new(
        TokenService::new(Arc::clone(&store), config.tokens.clone()),
        QueryGate::new(config.gate.clone()),
        executor,
        config.facade.clone(),
    ));

    if facade.executor().is_healthy(Duration::from_secs(5)).await {
        info!(uri = %config.neo4j.uri, "Graph database reachable");
    } else {
        warn!(uri = %config.neo4j.uri, "Graph database not reachable yet");
    }

    let reaper = config
        .purge_interval
        .map(|every| spawn_token_reaper(Arc::clone(&facade), every));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(ServiceState::new(Arc::clone(&facade)))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(access_log_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            info_span!(
                "http",
                method = %request.method(),
                path = %normalize_path(request.uri().path()),
            )
        }))
        .layer(cors);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!(address = %addr, version = version, "Cypher Embed Service listening");

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    facade.shutdown();
    store.inner().close().await;

    info!("Cypher Embed Service shutdown complete");

    Ok(())
}
