//! Demo endpoints served behind the admission gate.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

/// Routes for the demo resource group
pub fn routes() -> Router {
    Router::new()
        .route("/api/ratelimited/limited", get(limited).post(limited))
        .route(
            "/api/ratelimited/indirectly-limited",
            get(indirectly_limited).post(indirectly_limited),
        )
}

async fn limited() -> Json<Value> {
    Json(json!({ "limited": false }))
}

async fn indirectly_limited() -> Json<Value> {
    Json(json!({ "neverLimited": true }))
}
