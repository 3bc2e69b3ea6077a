//! Outbound call, message, and speech-synthesis API.

use crate::AppState;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use switchyard_drivers::{DriverError, DriverErrorKind, OutboundRequest};

fn driver_error_response(e: DriverError) -> Response {
    let status = match e.kind {
        DriverErrorKind::Validation => StatusCode::BAD_REQUEST,
        DriverErrorKind::Unsupported => StatusCode::UNPROCESSABLE_ENTITY,
        DriverErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
        DriverErrorKind::Vendor => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind.label() })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateCallRequest {
    pub to: String,
    /// Spoken once the callee answers.
    pub message: String,
    pub voice: Option<String>,
}

/// `POST /api/calls` — places an outbound call through the active driver.
pub async fn create_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CreateCallRequest>,
) -> Response {
    if req.to.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "'to' is required" })),
        )
            .into_response();
    }

    let driver = state.registry.active();
    if !driver.status().capabilities.voice {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": "active driver cannot place calls" })),
        )
            .into_response();
    }

    let request = OutboundRequest {
        to: req.to,
        message: req.message,
        voice: req.voice,
    };
    match driver.handle_outbound_request(&request).await {
        Ok(call) => {
            tracing::info!(
                vendor_call_id = %call.vendor_call_id,
                to = %request.to,
                "outbound call placed"
            );
            state.calls.track(call.clone());
            state.recorder.record_call(&call).await;
            (StatusCode::CREATED, Json(serde_json::json!(call))).into_response()
        }
        Err(e) => driver_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub message: String,
}

/// `POST /api/messages` — sends a text message through the active driver.
pub async fn send_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    if req.to.is_empty() || req.message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "'to' and 'message' are required" })),
        )
            .into_response();
    }

    let driver = state.registry.active();
    match driver.send_text(&req.to, &req.message).await {
        Ok(receipt) => (StatusCode::OK, Json(serde_json::json!(receipt))).into_response(),
        Err(e) => driver_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: Option<String>,
}

/// `POST /api/tts` — synthesizes speech via the active driver; the body
/// shape is whatever the vendor produces.
pub async fn synthesize_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SynthesizeRequest>,
) -> Response {
    if req.text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "'text' is required" })),
        )
            .into_response();
    }

    let driver = state.registry.active();
    match driver.text_to_speech(&req.text, req.voice.as_deref()).await {
        Ok(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, reply.content_type)],
            reply.body,
        )
            .into_response(),
        Err(e) => driver_error_response(e),
    }
}

/// `GET /api/calls/{vendor_call_id}` — current reconciled state of a call.
pub async fn get_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    axum::extract::Path(vendor_call_id): axum::extract::Path<String>,
) -> Response {
    match state.calls.get(&vendor_call_id) {
        Some(call) => (StatusCode::OK, Json(serde_json::json!(call))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "call not found" })),
        )
            .into_response(),
    }
}
