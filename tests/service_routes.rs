//! HTTP routing tests against the in-memory store and fixture upstream.

#![cfg(feature = "service")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use cypher_embed::service::{access_log_middleware, create_router, ServiceState, REQUEST_ID_HEADER};
use cypher_embed::{
    EmbedFacade, ExecutorConfig, FacadeConfig, FixtureConnector, FixtureResponse, GateConfig, GraphExecutor,
    InMemoryTokenStore, QueryGate, TokenConfig, TokenService,
};

fn app() -> (Arc<FixtureConnector>, Router) {
    let connector = Arc::new(FixtureConnector::new());
    connector.respond(
        "MATCH (n) RETURN n LIMIT 5",
        FixtureResponse::Rows(FixtureConnector::nodes(
            "n",
            "Person",
            ["Ada", "Grace", "Edsger"].map(|name| {
                vec![(
                    "name".to_string(),
                    cypher_embed::UpstreamValue::String(name.to_string()),
                )]
            }),
        )),
    );

    let facade = EmbedFacade::new(
        TokenService::new(Arc::new(InMemoryTokenStore::new()), TokenConfig::default()),
        QueryGate::new(GateConfig::default()),
        GraphExecutor::new(Arc::clone(&connector), ExecutorConfig::default()),
        FacadeConfig::default(),
    );
    let router = create_router(ServiceState::new(Arc::new(facade)));
    (connector, router)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_root_and_liveness() {
    let (_, app) = app();

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_issue_view_and_proxy_by_token() {
    let (_, app) = app();

    let (status, body) = send(
        &app,
        post_json("/api/embed", json!({"cypherQuery": "MATCH (n) RETURN n LIMIT 5"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["expiresIn"], 86_400);
    let token = body["data"]["embedToken"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 48);

    let (status, body) = send(&app, get(&format!("/api/embed/{}", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cypherQuery"], "MATCH (n) RETURN n LIMIT 5");

    let (status, body) = send(&app, post_json("/api/proxy/query", json!({"token": token}))).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["n"]["properties"]["name"], "Edsger");
}

#[tokio::test]
async fn test_validation_errors_use_the_envelope() {
    let (_, app) = app();

    let (status, body) = send(
        &app,
        post_json(
            "/api/embed",
            json!({"cypherQuery": "MATCH (n) RETURN n", "expiresInDays": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let bad_json = Request::post("/api/embed")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, bad_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(&app, post_json("/api/proxy/query", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_params_and_parameters_together_is_a_validation_error() {
    let (connector, app) = app();
    let (status, body) = send(
        &app,
        post_json(
            "/api/proxy/query",
            json!({"cypher": "RETURN $x", "params": {"x": 1}, "parameters": {"x": 2}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"].as_str().unwrap_or_default().contains("duplicate field"));
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_unknown_token_is_404() {
    let (_, app) = app();
    let (status, body) = send(&app, get(&format!("/api/embed/{}", "0".repeat(48)))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_write_query_is_forbidden() {
    let (connector, app) = app();
    let (status, body) = send(
        &app,
        post_json("/api/proxy/query", json!({"cypher": "MATCH (n) DETACH DELETE n"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "REJECTED_QUERY");
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_readiness_follows_upstream() {
    let (connector, app) = app();

    let (status, body) = send(&app, get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    connector.set_available(false);
    let (status, body) = send(&app, get("/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["upstream"], false);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_access_log_echoes_request_id() {
    let (_, app) = app();
    let app = app.layer(middleware::from_fn(access_log_middleware));

    let request = Request::get("/health/live")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[&REQUEST_ID_HEADER], "req-42");

    let response = app.clone().oneshot(get("/health/live")).await.unwrap();
    let generated = response.headers()[&REQUEST_ID_HEADER].to_str().unwrap();
    assert_eq!(generated.len(), 32);

    let request = Request::get("/health/live")
        .header("x-request-id", "two words")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_ne!(response.headers()[&REQUEST_ID_HEADER], "two words");
}
