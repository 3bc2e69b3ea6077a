//! Health endpoints.

use crate::AppState;
use axum::{http::StatusCode, response::IntoResponse, response::Response, Extension, Json};
use std::sync::Arc;

/// `GET /health` — full report: every registered check with its last result.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let report = state.health.report();
    Json(serde_json::json!({
        "status": report.status,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": report.uptime_secs,
        "checks": report.checks,
    }))
}

/// `GET /health/live` — answers whenever the process can serve requests.
pub async fn liveness_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// `GET /health/ready` — 200 only while every critical check passes.
pub async fn readiness_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    if state.health.ready() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not ready" })),
        )
            .into_response()
    }
}
