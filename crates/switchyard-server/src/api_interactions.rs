//! Interaction history API.

use crate::AppState;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

fn clamp_limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

fn store_error(e: switchyard_store::StoreError) -> Response {
    tracing::error!("interaction query failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "interaction store unavailable" })),
    )
        .into_response()
}

/// `GET /api/interactions` — most recent interactions, newest first.
pub async fn list_interactions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.recorder.recent(clamp_limit(query.limit)).await {
        Ok(records) => Json(serde_json::json!({ "interactions": records })).into_response(),
        Err(e) => store_error(e),
    }
}

/// `GET /api/interactions/{owner_id}` — interactions for one call or
/// channel session, newest first.
pub async fn owner_interactions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state
        .recorder
        .for_owner(&owner_id, clamp_limit(query.limit))
        .await
    {
        Ok(records) => Json(serde_json::json!({
            "owner_id": owner_id,
            "interactions": records,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}
