//! Service middleware for request metrics and access logging.
//!
//! Embed tokens are bearer secrets that appear in request paths, so every
//! path is normalized before it reaches a log line.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;
use tracing::{info, info_span, Instrument};

use crate::metrics;

/// Correlation header read from the caller and echoed on every response.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    metrics::record_request(
        &path,
        method.as_str(),
        response.status().as_u16(),
        start.elapsed().as_millis() as u64,
    );

    response
}

/// Access-log middleware.
///
/// Runs the request inside a `request` span keyed by its request id and
/// emits one `cypher_embed::access` line when the response is ready. A
/// caller-supplied id is kept when it is short printable ASCII; anything
/// else is replaced by a fresh one.
pub async fn access_log_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| is_usable_request_id(id))
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let span = info_span!("request", request_id = %request_id, method = %method, path = %path);
    let mut response = next.run(request).instrument(span).await;

    info!(
        target: "cypher_embed::access",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

fn is_usable_request_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

fn token_segment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9A-Fa-f]{16,}").expect("static pattern"))
}

fn uuid_segment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").expect("static pattern")
    })
}

/// Normalize a path for logging.
///
/// Long hex runs (tokens, including malformed ones) become `:token`, UUIDs
/// become `:id`.
pub fn normalize_path(path: &str) -> String {
    let path = uuid_segment().replace_all(path, ":id");
    token_segment().replace_all(&path, ":token").into_owned()
}
