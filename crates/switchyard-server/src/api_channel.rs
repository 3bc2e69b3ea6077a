//! Duplex channel API: WebSocket sessions for text and audio turns.
//!
//! Clients authenticate before the upgrade with a short-lived HMAC-signed
//! session token minted by `POST /api/channel/token`. Inside a session,
//! frames are processed strictly in arrival order: the receive loop awaits
//! the turn router inline, so responses for one session can never overtake
//! each other. Acknowledgements go out before routing starts, carrying the
//! correlation id the eventual response will repeat.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, Query, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_types::{TurnInput, TurnOwner};
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

/// Duration for which a channel session token is valid (60 seconds).
/// The short TTL limits replay risk for unused tokens.
const CHANNEL_TOKEN_TTL_SECS: u64 = 60;

/// Generates an HMAC-SHA256 signed channel session token.
///
/// Token format: `base64(client_id|expires_unix_secs|hmac_signature)`.
/// The token binds the client id to a time window, preventing both
/// impersonation and replay after expiry.
pub fn generate_channel_token(client_id: &str, secret: &[u8; 32]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let expires = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        + CHANNEL_TOKEN_TTL_SECS;

    let payload = format!("{}|{}", client_id, expires);

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    use base64::Engine;
    let token_bytes = format!("{}|{}", payload, hex::encode(signature));
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes.as_bytes())
}

/// Verifies an HMAC-SHA256 signed channel session token.
/// Returns the client id if valid and not expired.
fn verify_channel_token(token: &str, secret: &[u8; 32]) -> Result<String, StatusCode> {
    use base64::Engine;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token_str = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let parts: Vec<&str> = token_str.splitn(3, '|').collect();
    if parts.len() != 3 {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let client_id = parts[0];
    let expires_str = parts[1];
    let sig_hex = parts[2];

    let payload = format!("{}|{}", client_id, expires_str);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    let expected_sig = mac.finalize().into_bytes();
    let provided_sig = hex::decode(sig_hex).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if expected_sig.as_slice() != provided_sig.as_slice() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let expires: u64 = expires_str.parse().map_err(|_| StatusCode::UNAUTHORIZED)?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if now > expires {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(client_id.to_string())
}

/// Query parameters for the channel connection.
#[derive(Debug, Deserialize)]
pub struct ChannelConnectParams {
    pub token: Option<String>,
}

/// Incoming channel frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A text turn for the processor.
    Text { content: String },
    /// An audio turn; content is a base64 payload or a media URL.
    Audio { content: String },
    /// Start receiving status updates for a call.
    Subscribe { call_id: String },
    /// Stop receiving status updates for a call.
    Unsubscribe { call_id: String },
    /// Application-level heartbeat.
    Ping,
}

/// Outgoing channel frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// First frame of every session.
    Connection {
        session_id: Uuid,
        heartbeat_interval_secs: u64,
    },
    /// Sent before a text turn is routed.
    TextAck { correlation_id: Uuid },
    /// Sent before an audio turn is routed.
    AudioAck { correlation_id: Uuid },
    /// Answer to a text turn.
    TextResponse {
        correlation_id: Uuid,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        intent: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        latency_ms: u64,
    },
    /// Answer to an audio turn.
    AudioResponse {
        correlation_id: Uuid,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        latency_ms: u64,
    },
    /// Confirms a subscription change.
    SubscribeAck { call_id: String, subscribed: bool },
    /// Status change on a subscribed call.
    CallUpdate {
        call_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_url: Option<String>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
    },
    Pong,
}

struct SessionHandle {
    tx: mpsc::Sender<String>,
    close_tx: watch::Sender<bool>,
    last_activity: std::sync::Mutex<Instant>,
}

type SessionMap = HashMap<Uuid, Arc<SessionHandle>>;

/// Manages active channel sessions and their call subscriptions.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<SessionMap>>,
    /// vendor call id -> subscribed session ids.
    call_subscriptions: Arc<RwLock<HashMap<String, HashSet<Uuid>>>>,
    /// Reverse mapping: session id -> subscribed call ids.
    session_subscriptions: Arc<RwLock<HashMap<Uuid, HashSet<String>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its id.
    async fn add_session(&self, tx: mpsc::Sender<String>, close_tx: watch::Sender<bool>) -> Uuid {
        let session_id = Uuid::new_v4();
        self.sessions.write().await.insert(
            session_id,
            Arc::new(SessionHandle {
                tx,
                close_tx,
                last_activity: std::sync::Mutex::new(Instant::now()),
            }),
        );
        session_id
    }

    /// Removes a session and its subscriptions.
    ///
    /// Lock ordering: sessions, then call_subscriptions, then
    /// session_subscriptions; `subscribe`/`unsubscribe` use the same order.
    pub async fn remove_session(&self, session_id: Uuid) {
        self.sessions.write().await.remove(&session_id);

        let calls = {
            let session_subs = self.session_subscriptions.read().await;
            session_subs.get(&session_id).cloned()
        };

        if let Some(ref calls) = calls {
            let mut call_subs = self.call_subscriptions.write().await;
            for call_id in calls {
                if let Some(listeners) = call_subs.get_mut(call_id) {
                    listeners.remove(&session_id);
                    if listeners.is_empty() {
                        call_subs.remove(call_id);
                    }
                }
            }
        }

        if calls.is_some() {
            let mut session_subs = self.session_subscriptions.write().await;
            session_subs.remove(&session_id);
        }
    }

    /// Subscribes a session to a call's status updates.
    pub async fn subscribe(&self, call_id: String, session_id: Uuid) {
        let mut call_subs = self.call_subscriptions.write().await;
        call_subs
            .entry(call_id.clone())
            .or_default()
            .insert(session_id);

        let mut session_subs = self.session_subscriptions.write().await;
        session_subs.entry(session_id).or_default().insert(call_id);
    }

    /// Unsubscribes a session from a call.
    pub async fn unsubscribe(&self, call_id: &str, session_id: Uuid) {
        let mut call_subs = self.call_subscriptions.write().await;
        if let Some(listeners) = call_subs.get_mut(call_id) {
            listeners.remove(&session_id);
            if listeners.is_empty() {
                call_subs.remove(call_id);
            }
        }

        let mut session_subs = self.session_subscriptions.write().await;
        if let Some(calls) = session_subs.get_mut(&session_id) {
            calls.remove(call_id);
            if calls.is_empty() {
                session_subs.remove(&session_id);
            }
        }
    }

    /// Fans a call update out to every subscribed session.
    pub async fn broadcast_call_update(&self, call_id: &str, frame_json: String) {
        let call_subs = self.call_subscriptions.read().await;
        if let Some(listeners) = call_subs.get(call_id) {
            let sessions = self.sessions.read().await;
            for session_id in listeners {
                if let Some(handle) = sessions.get(session_id) {
                    if let Err(e) = handle.tx.try_send(frame_json.clone()) {
                        tracing::warn!(
                            session_id = %session_id,
                            call_id = %call_id,
                            "dropping call update for slow consumer: {}",
                            e
                        );
                    }
                }
            }
        }
    }

    /// Marks a session active now.
    async fn touch(&self, session_id: Uuid) {
        let sessions = self.sessions.read().await;
        if let Some(handle) = sessions.get(&session_id) {
            let mut last = handle
                .last_activity
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *last = Instant::now();
        }
    }

    /// Signals close to every session idle longer than `max_idle`; returns
    /// the ids that were reaped. Actual teardown happens in each session's
    /// receive loop.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let sessions = self.sessions.read().await;
        let mut reaped = Vec::new();
        for (session_id, handle) in sessions.iter() {
            let idle = {
                let last = handle
                    .last_activity
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                last.elapsed()
            };
            if idle > max_idle {
                if handle.close_tx.send(true).is_ok() {
                    reaped.push(*session_id);
                }
            }
        }
        reaped
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// `POST /api/channel/token` — issues a short-lived, HMAC-signed channel
/// session token. Clients call this (behind API auth) and then connect to
/// `/channel?token=<token>`.
pub async fn create_channel_token_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::Json<serde_json::Value> {
    let client_id = Uuid::new_v4().to_string();
    let token = generate_channel_token(&client_id, &state.ws_token_secret);
    axum::Json(serde_json::json!({
        "token": token,
        "client_id": client_id,
        "expires_in_secs": CHANNEL_TOKEN_TTL_SECS,
    }))
}

/// Channel handler: `GET /channel?token=...`.
///
/// The token is verified before the protocol upgrade; a bad or missing token
/// is rejected with 401 and no WebSocket is established.
pub async fn channel_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
    Query(params): Query<ChannelConnectParams>,
) -> impl IntoResponse {
    let token = match params.token {
        Some(ref token) => token,
        None => {
            tracing::warn!("channel connect missing token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let client_id = match verify_channel_token(token, &state.ws_token_secret) {
        Ok(id) => id,
        Err(code) => {
            tracing::warn!(status = %code, "channel token verification failed");
            return code.into_response();
        }
    };

    tracing::info!(client_id = %client_id, "channel auth success");
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Serializes and queues a frame for one session, dropping it if the
/// outbound queue is full.
fn send_frame(tx: &mpsc::Sender<String>, frame: &OutboundFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to queue channel frame: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize channel frame: {}", e);
        }
    }
}

async fn handle_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded queue per session: a consumer that stops reading gets frames
    // dropped rather than growing server memory.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let (close_tx, mut close_rx) = watch::channel(false);

    let session_id = state.sessions.add_session(tx.clone(), close_tx).await;
    let owner = TurnOwner::Session(session_id);
    tracing::info!(session_id = %session_id, "channel session opened");

    send_frame(
        &tx,
        &OutboundFrame::Connection {
            session_id,
            heartbeat_interval_secs: state.channel.heartbeat_interval_secs,
        },
    );

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let max_frame_bytes = state.channel.max_frame_bytes;

    loop {
        let msg = tokio::select! {
            _ = close_rx.changed() => {
                if *close_rx.borrow() {
                    tracing::info!(session_id = %session_id, "closing idle channel session");
                    send_frame(
                        &tx,
                        &OutboundFrame::Error {
                            code: "session_timeout".to_string(),
                            message: "session closed after missed heartbeats".to_string(),
                            correlation_id: None,
                        },
                    );
                    break;
                }
                continue;
            }
            msg = receiver.next() => match msg {
                Some(Ok(msg)) => msg,
                _ => break,
            },
        };

        let text = match msg {
            AxumMessage::Text(text) => text,
            AxumMessage::Binary(bytes) => {
                if bytes.len() > max_frame_bytes {
                    send_frame(&tx, &frame_too_large(max_frame_bytes));
                } else {
                    send_frame(
                        &tx,
                        &OutboundFrame::Error {
                            code: "unsupported_frame".to_string(),
                            message: "binary frames are not supported; send JSON text frames"
                                .to_string(),
                            correlation_id: None,
                        },
                    );
                }
                continue;
            }
            AxumMessage::Close(_) => break,
            // Protocol-level ping/pong is handled by axum.
            _ => continue,
        };

        // The ceiling applies before parsing: an oversized frame is answered
        // with an error and the session stays open.
        if text.len() > max_frame_bytes {
            tracing::warn!(
                session_id = %session_id,
                size = text.len(),
                "rejecting oversized channel frame"
            );
            send_frame(&tx, &frame_too_large(max_frame_bytes));
            continue;
        }

        state.sessions.touch(session_id).await;

        let frame = match serde_json::from_str::<InboundFrame>(&text) {
            Ok(frame) => frame,
            Err(e) => {
                send_frame(
                    &tx,
                    &OutboundFrame::Error {
                        code: "bad_frame".to_string(),
                        message: format!("unparseable frame: {e}"),
                        correlation_id: None,
                    },
                );
                continue;
            }
        };

        match frame {
            InboundFrame::Ping => {
                send_frame(&tx, &OutboundFrame::Pong);
            }
            InboundFrame::Subscribe { call_id } => {
                state.sessions.subscribe(call_id.clone(), session_id).await;
                send_frame(
                    &tx,
                    &OutboundFrame::SubscribeAck {
                        call_id,
                        subscribed: true,
                    },
                );
            }
            InboundFrame::Unsubscribe { call_id } => {
                state.sessions.unsubscribe(&call_id, session_id).await;
                send_frame(
                    &tx,
                    &OutboundFrame::SubscribeAck {
                        call_id,
                        subscribed: false,
                    },
                );
            }
            InboundFrame::Text { content } => {
                let correlation_id = switchyard_types::new_correlation_id();
                send_frame(&tx, &OutboundFrame::TextAck { correlation_id });

                // Routing inline keeps responses in arrival order for this
                // session.
                let turn = state
                    .router
                    .route_with_id(correlation_id, TurnInput::Text(content), owner)
                    .await;
                state.recorder.record_turn(&turn).await;

                // A session closed mid-turn discards the late result.
                if *close_rx.borrow() {
                    continue;
                }

                match turn.output {
                    Some(content) => send_frame(
                        &tx,
                        &OutboundFrame::TextResponse {
                            correlation_id,
                            content,
                            intent: turn.intent,
                            confidence: turn.confidence,
                            latency_ms: turn.latency_ms,
                        },
                    ),
                    None => send_frame(&tx, &turn_error(correlation_id, &turn, &state)),
                }
            }
            InboundFrame::Audio { content } => {
                let correlation_id = switchyard_types::new_correlation_id();
                send_frame(&tx, &OutboundFrame::AudioAck { correlation_id });

                let turn = state
                    .router
                    .route_with_id(correlation_id, TurnInput::Audio(content), owner)
                    .await;
                state.recorder.record_turn(&turn).await;

                if *close_rx.borrow() {
                    continue;
                }

                match turn.output {
                    Some(content) => send_frame(
                        &tx,
                        &OutboundFrame::AudioResponse {
                            correlation_id,
                            content,
                            media_url: turn.media_url,
                            latency_ms: turn.latency_ms,
                        },
                    ),
                    None => send_frame(&tx, &turn_error(correlation_id, &turn, &state)),
                }
            }
        }
    }

    state.sessions.remove_session(session_id).await;
    send_task.abort();
    tracing::info!(session_id = %session_id, "channel session closed");
}

fn frame_too_large(max_frame_bytes: usize) -> OutboundFrame {
    OutboundFrame::Error {
        code: "frame_too_large".to_string(),
        message: format!("frame exceeds the {max_frame_bytes} byte ceiling"),
        correlation_id: None,
    }
}

fn turn_error(
    correlation_id: Uuid,
    turn: &switchyard_types::Turn,
    state: &AppState,
) -> OutboundFrame {
    let code = turn
        .error
        .map(|k| k.label().to_string())
        .unwrap_or_else(|| "processor".to_string());
    OutboundFrame::Error {
        code,
        message: state.router.fallback_text().to_string(),
        correlation_id: Some(correlation_id),
    }
}
