use super::gate::AdmissionGate;
use super::types::RateLimitResult;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Axum middleware function for admission control
///
/// Install with `axum::middleware::from_fn_with_state(gate, admission_middleware)`.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    gate.process(request, |request| next.run(request)).await
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(result.reset_after));
}

/// Create a 429 Too Many Requests response with rate limit headers
pub fn create_rate_limit_response(result: &RateLimitResult) -> Response {
    let mut headers = HeaderMap::new();
    insert_rate_limit_headers(&mut headers, result);

    if let Some(retry) = result.retry_after {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(retry));
    }

    let body = serde_json::json!({
        "error": "Rate limit exceeded",
        "status": 429,
        "path_key": result.path_key,
        "limit": result.limit,
        "remaining": result.remaining,
        "reset_after": result.reset_after,
        "retry_after": result.retry_after,
    });

    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        axum::Json(body),
    )
        .into_response()
}

/// Add rate limit headers to successful responses
pub fn add_rate_limit_headers(mut response: Response, result: &RateLimitResult) -> Response {
    insert_rate_limit_headers(response.headers_mut(), result);
    response
}
