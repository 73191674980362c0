use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use axum::{body::Body, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{header, Request, Response, StatusCode};
use rategate::{
    build_app, build_gate,
    config::GateConfig,
    error::{GateError, Result},
    rate_limit::{MemoryWindowStore, WindowBatch, WindowOutcome, WindowStore},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const LIMITED: &str = "/api/ratelimited/limited";
const INDIRECT: &str = "/api/ratelimited/indirectly-limited";

struct UnreachableStore;

#[async_trait]
impl WindowStore for UnreachableStore {
    async fn check_and_record(&self, _batch: &WindowBatch) -> Result<WindowOutcome> {
        Err(GateError::StoreUnavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(GateError::StoreUnavailable("connection refused".to_string()))
    }
}

fn config(policy: &str, rules: &str) -> GateConfig {
    let yaml = format!(
        r#"
redis:
  url: "redis://127.0.0.1:6379"
rate_limiting:
  on_store_error: {}
  rules:
{}
"#,
        policy, rules
    );
    let config = GateConfig::from_yaml(&yaml).unwrap();
    config.validate().unwrap();
    config
}

/// Helper function to create a test app backed by an in-process store
fn setup_app(rules: &str) -> (Router, Arc<MemoryWindowStore>) {
    let store = Arc::new(MemoryWindowStore::new());
    let gate = build_gate(&config("fail_closed", rules), store.clone()).unwrap();
    (build_app(Arc::new(gate)), store)
}

fn get(path: &str, identity: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path).method("GET");
    if let Some(identity) = identity {
        let credentials = STANDARD.encode(format!("{}:secret", identity));
        builder = builder.header(header::AUTHORIZATION, format!("Basic {}", credentials));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn remaining(response: &Response<Body>) -> &str {
    response
        .headers()
        .get("x-ratelimit-remaining")
        .unwrap()
        .to_str()
        .unwrap()
}

const SINGLE_RULE: &str = r#"
    - path_pattern: "/api/ratelimited/limited"
      path_key: "limited"
      window_secs: 60
      max_requests: 3
"#;

#[tokio::test]
async fn test_first_m_requests_admitted_then_limited() {
    let (app, _store) = setup_app(SINGLE_RULE);

    for i in 0..3 {
        let response = send(&app, get(LIMITED, Some("alice"))).await;
        assert_eq!(response.status(), StatusCode::OK, "request {}", i);
        assert_json_eq!(json_body(response).await, json!({ "limited": false }));
    }

    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    assert_eq!(remaining(&response), "0");

    let body = json_body(response).await;
    assert_eq!(body["status"], 429);
    assert_eq!(body["path_key"], "limited");
}

#[tokio::test]
async fn test_admitted_responses_carry_rate_limit_headers() {
    let (app, _store) = setup_app(SINGLE_RULE);

    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "3");
    assert_eq!(remaining(&response), "2");
    assert_eq!(response.headers().get("x-ratelimit-reset").unwrap(), "60");

    // No rule applies, so no headers
    let response = send(&app, get(INDIRECT, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn test_callers_are_limited_independently() {
    let (app, _store) = setup_app(SINGLE_RULE);

    for _ in 0..3 {
        send(&app, get(LIMITED, Some("alice"))).await;
    }
    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = send(&app, get(LIMITED, Some("bob"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_window_slides() {
    let (app, _store) = setup_app(
        r#"
    - path_pattern: "/api/ratelimited/limited"
      path_key: "limited"
      window_secs: 1
      max_requests: 2
"#,
    );

    for _ in 0..2 {
        let response = send(&app, get(LIMITED, Some("alice"))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_strictest_overlapping_rule_is_enforced() {
    let (app, _store) = setup_app(
        r#"
    - path_pattern: "/api/ratelimited"
      path_key: "A"
      window_secs: 60
      max_requests: 10
    - path_pattern: "/api/ratelimited/limited"
      match_type: exact
      path_key: "A"
      window_secs: 60
      max_requests: 5
"#,
    );

    for _ in 0..5 {
        let response = send(&app, get(LIMITED, Some("alice"))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "5");

    // Same counter, looser rule: five of ten slots already used
    let response = send(&app, get(INDIRECT, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining(&response), "4");
}

#[tokio::test]
async fn test_rejected_request_is_not_counted_against_any_rule() {
    let (app, _store) = setup_app(
        r#"
    - path_pattern: "/api/ratelimited"
      path_key: "group"
      window_secs: 60
      max_requests: 3
    - path_pattern: "/api/ratelimited/limited"
      match_type: exact
      path_key: "direct"
      window_secs: 60
      max_requests: 1
"#,
    );

    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Only the first request was charged to the group counter
    let response = send(&app, get(INDIRECT, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining(&response), "1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_admit_exactly_the_limit() {
    let (app, _store) = setup_app(
        r#"
    - path_pattern: "/api/ratelimited/limited"
      path_key: "limited"
      window_secs: 60
      max_requests: 7
"#,
    );

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.oneshot(get(LIMITED, Some("alice"))).await.unwrap() })
        })
        .collect();

    let statuses: Vec<StatusCode> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().status())
        .collect();

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, 7);
    assert_eq!(limited, 18);
}

#[tokio::test]
async fn test_missing_credentials_rejected_on_every_path() {
    let (app, store) = setup_app(SINGLE_RULE);

    for path in [LIMITED, INDIRECT, "/does/not/exist"] {
        let response = send(&app, get(path, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "path {}", path);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());
    }

    let malformed = Request::builder()
        .uri(LIMITED)
        .header(header::AUTHORIZATION, "Basic not-base64!")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, malformed).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(store.transactions(), 0);
}

#[tokio::test]
async fn test_unmatched_path_never_touches_store() {
    let (app, store) = setup_app(SINGLE_RULE);

    for _ in 0..10 {
        let response = send(&app, get(INDIRECT, Some("alice"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(json_body(response).await, json!({ "neverLimited": true }));
    }

    let response = send(&app, get("/does/not/exist", Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(store.transactions(), 0);
}

#[tokio::test]
async fn test_store_failure_policy() {
    let fail_open = build_gate(&config("fail_open", SINGLE_RULE), Arc::new(UnreachableStore)).unwrap();
    let app = build_app(Arc::new(fail_open));
    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let fail_closed =
        build_gate(&config("fail_closed", SINGLE_RULE), Arc::new(UnreachableStore)).unwrap();
    let app = build_app(Arc::new(fail_closed));
    let response = send(&app, get(LIMITED, Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], 503);

    // Unauthenticated requests are still rejected before the store is involved
    let response = send(&app, get(LIMITED, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_post_requests_are_gated() {
    let (app, _store) = setup_app(SINGLE_RULE);

    let request = Request::builder()
        .uri(LIMITED)
        .method("POST")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("alice:secret")),
        )
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining(&response), "2");
}
