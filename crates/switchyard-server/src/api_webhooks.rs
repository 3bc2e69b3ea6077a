//! Vendor webhook endpoint.
//!
//! `POST /webhooks/{vendor}` receives status callbacks and speech results.
//! The path vendor must match the active driver; events for a driver that is
//! not active are refused with 409 so a half-finished vendor migration
//! cannot silently mix call state.

use crate::AppState;
use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;
use switchyard_drivers::{DriverErrorKind, InboundPayload, ReplyContent, VendorReply};
use switchyard_types::{Call, CallStatus, TurnOwner};

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn vendor_response(reply: VendorReply) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, reply.content_type)],
        reply.body,
    )
        .into_response()
}

/// Pushes the reconciled call state to channel subscribers and the store.
async fn publish_call_state(state: &Arc<AppState>, call: &Call) {
    let frame = crate::api_channel::OutboundFrame::CallUpdate {
        call_id: call.vendor_call_id.clone(),
        status: call.status.label().to_string(),
        recording_url: call.recording_url.clone(),
    };
    match serde_json::to_string(&frame) {
        Ok(json) => {
            state
                .sessions
                .broadcast_call_update(&call.vendor_call_id, json)
                .await;
        }
        Err(e) => tracing::error!("failed to serialize call update: {}", e),
    }
    state.recorder.record_call(call).await;
}

/// `POST /webhooks/{vendor}` — one inbound vendor event.
pub async fn webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(vendor): Path<String>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let driver = state.registry.active();
    if driver.name() != vendor {
        tracing::warn!(
            requested = %vendor,
            active = driver.name(),
            "webhook for inactive vendor refused"
        );
        return json_error(
            StatusCode::CONFLICT,
            &format!("driver '{}' is not active", vendor),
        );
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let payload = InboundPayload::new(content_type, body.to_vec());

    let inbound = match driver.handle_inbound_event(&payload) {
        Ok(inbound) => inbound,
        Err(e) if e.kind == DriverErrorKind::Validation => {
            tracing::warn!(vendor = %vendor, error = %e, "rejected malformed webhook");
            return json_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
        Err(e) => {
            tracing::error!(vendor = %vendor, error = %e, "webhook normalization failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let call = state.calls.reconcile(&inbound.event);
    publish_call_state(&state, &call).await;

    // Events carrying a turn enter the conversation; everything else is a
    // status callback and only needs acknowledging.
    if let Some(input) = inbound.turn {
        let turn = state
            .router
            .route(input, TurnOwner::Call(call.correlation_id))
            .await;
        state.recorder.record_turn(&turn).await;

        let reply = match &turn.output {
            Some(text) => ReplyContent::speak(text.clone()),
            // A failed turn still needs to say something before hanging up.
            None => ReplyContent::hangup(state.router.fallback_text().to_string()),
        };
        return vendor_response(driver.render_reply(&reply));
    }

    // An answered inbound call with no speech yet gets the greeting and an
    // open microphone. A driver with a language of its own overrides the
    // gateway default.
    if call.status == CallStatus::InProgress
        && call.direction == switchyard_types::Direction::Inbound
    {
        let greeting = driver
            .greeting()
            .unwrap_or_else(|| state.router.greeting())
            .to_string();
        let reply = ReplyContent::speak(greeting);
        return vendor_response(driver.render_reply(&reply));
    }

    vendor_response(driver.render_ack())
}
