use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::AppState;

/// Middleware guarding the management API with a shared key.
///
/// When no key is configured the API is open; this is the expected mode for
/// local development. With a key configured, every `/api/*` request must carry
/// `Authorization: Bearer <key>`. Webhooks and health endpoints are routed
/// outside this layer, since vendors and orchestrators cannot present the key.
pub async fn api_key_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    if state.api_key.is_empty() {
        return Ok(next.run(req).await);
    }

    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|key| constant_time_eq(key.as_bytes(), state.api_key.as_bytes()));

    if authorized {
        Ok(next.run(req).await)
    } else {
        tracing::warn!(path = %req.uri().path(), "rejected request with missing or bad api key");
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Comparison that does not leak the match prefix length through timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
