//! Metric events.
//!
//! Metrics are structured `tracing` events on the `cypher_embed::metrics`
//! target, aggregated downstream from logs:
//!
//! - `request_metric` - HTTP request by normalized path, method, status
//! - `embed_issued_metric` - token issuance outcome
//! - `embed_viewed_metric` - token lookup outcome
//! - `proxy_query_metric` - proxied query outcome, rows and latency
//! - `pool_metric` - session pool occupancy

use tracing::info;

use crate::executor::SessionPoolStats;

/// Record an HTTP request.
pub fn record_request(path: &str, method: &str, status: u16, latency_ms: u64) {
    info!(
        target: "cypher_embed::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency_ms,
        "request_metric"
    );
}

/// Record an issuance attempt. `outcome` is `"issued"` or an error code.
pub fn record_embed_issued(outcome: &str, ttl_seconds: Option<i64>) {
    info!(
        target: "cypher_embed::metrics",
        metric_type = "embed_issued",
        outcome = outcome,
        ttl_seconds = ttl_seconds,
        "embed_issued_metric"
    );
}

/// Record a token lookup.
pub fn record_embed_viewed(found: bool) {
    let result = if found { "found" } else { "not_found" };
    info!(
        target: "cypher_embed::metrics",
        metric_type = "embed_viewed",
        result = result,
        "embed_viewed_metric"
    );
}

/// Record a proxied query. `outcome` is `"ok"` or an error code.
pub fn record_proxy_query(target: &str, outcome: &str, rows: usize, latency_ms: u64) {
    info!(
        target: "cypher_embed::metrics",
        metric_type = "proxy_query",
        query_target = target,
        outcome = outcome,
        rows = rows,
        latency_ms = latency_ms,
        "proxy_query_metric"
    );
}

/// Record session pool occupancy.
pub fn record_pool(stats: &SessionPoolStats) {
    info!(
        target: "cypher_embed::metrics",
        metric_type = "pool",
        size = stats.size,
        available = stats.available,
        idle = stats.idle,
        opened = stats.opened,
        "pool_metric"
    );
}
