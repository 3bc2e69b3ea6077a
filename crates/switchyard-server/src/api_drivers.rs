//! Driver management API.

use crate::AppState;
use axum::{http::StatusCode, response::IntoResponse, response::Response, Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use switchyard_drivers::RegistryError;

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub name: String,
}

/// `GET /api/drivers` — every configured driver, flagging the active one.
pub async fn list_drivers_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "drivers": state.registry.known() }))
}

/// `GET /api/drivers/active` — the active driver's status snapshot.
pub async fn active_driver_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let status = state.registry.active().status();
    Json(serde_json::json!(status))
}

/// `POST /api/drivers/switch` — validated switch to another configured
/// driver. On any failure the previously active driver keeps serving.
pub async fn switch_driver_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SwitchRequest>,
) -> Response {
    match state.registry.switch(&req.name).await {
        Ok(status) => (StatusCode::OK, Json(serde_json::json!(status))).into_response(),
        Err(RegistryError::UnknownDriver(name)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown driver '{name}'") })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(driver = %req.name, error = %e, "driver switch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
