//! Telephony gateway server: HTTP management API, vendor webhooks, and the
//! duplex channel, wired over the driver registry, turn router, and
//! interaction store.

pub mod api_calls;
pub mod api_channel;
pub mod api_drivers;
pub mod api_health;
pub mod api_interactions;
pub mod api_webhooks;
pub mod background;
pub mod calls;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use switchyard_drivers::{DriverRegistry, RegistryError};
use switchyard_health::HealthRegistry;
use switchyard_router::{RouterError, TurnRouter};
use switchyard_store::{build_store, FailureWindow, Recorder, StoreError};
use tower_http::cors::{Any, CorsLayer};

use calls::CallTable;
use config::{ChannelConfig, Config};

/// Maximum request body size (1 MiB). Vendor webhooks and API requests are
/// small; anything larger is rejected before it reaches a handler.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Timeout applied to each registered health probe.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configured vendor drivers; one active at a time.
    pub registry: Arc<DriverRegistry>,
    /// Forwards turns to the conversation processor.
    pub router: Arc<TurnRouter>,
    /// Best-effort interaction persistence.
    pub recorder: Recorder,
    /// Named health checks and their cached results.
    pub health: Arc<HealthRegistry>,
    /// Live duplex channel sessions.
    pub sessions: api_channel::SessionManager,
    /// In-memory call state keyed by vendor call id.
    pub calls: CallTable,
    /// Duplex channel limits.
    pub channel: ChannelConfig,
    /// Key the channel session tokens are signed with.
    pub ws_token_secret: [u8; 32],
    /// Bearer key for `/api/*`; empty disables API auth.
    pub api_key: String,
}

/// Failures while assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("drivers: {0}")]
    Registry(#[from] RegistryError),
    #[error("processor: {0}")]
    Router(#[from] RouterError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Derives the fixed-size channel token key from the configured secret.
///
/// An empty secret yields a random key, which deliberately invalidates
/// outstanding tokens across restarts.
fn derive_token_secret(configured: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    if configured.is_empty() {
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
    } else {
        hasher.update(b"switchyard-channel-token-v1:");
        hasher.update(configured.as_bytes());
    }
    hasher.finalize().into()
}

/// Builds every component and registers the health checks against them.
pub async fn build_state(config: &Config) -> Result<AppState, BuildError> {
    let store = build_store(&config.storage)?;
    let recorder = Recorder::new(store, Arc::new(FailureWindow::default()));
    let router = Arc::new(TurnRouter::new(config.processor.clone())?);
    let registry = Arc::new(DriverRegistry::from_config(&config.drivers).await?);
    let sessions = api_channel::SessionManager::new();
    let calls = CallTable::new();

    let mut health = HealthRegistry::new();

    let storage_recorder = recorder.clone();
    let backend = config.storage.backend.clone();
    health.register("storage", HEALTH_PROBE_TIMEOUT, true, move || {
        let recorder = storage_recorder.clone();
        let backend = backend.clone();
        async move {
            recorder.recent(1).await.map_err(|e| e.to_string())?;
            if recorder.degraded() {
                return Err("recent writes failing".to_string());
            }
            Ok(Some(backend))
        }
    });

    // Any HTTP answer counts: the processor may not route GET /, but a
    // response proves it is up and reachable.
    let probe_client = reqwest::Client::builder().build()?;
    let endpoint = config.processor.endpoint.clone();
    health.register("processor", HEALTH_PROBE_TIMEOUT, true, move || {
        let client = probe_client.clone();
        let endpoint = endpoint.clone();
        async move {
            client
                .get(&endpoint)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            Ok(None)
        }
    });

    let driver_registry = Arc::clone(&registry);
    health.register("driver", HEALTH_PROBE_TIMEOUT, true, move || {
        let registry = Arc::clone(&driver_registry);
        async move {
            let status = registry.active().status();
            if status.ready {
                Ok(Some(status.name))
            } else {
                Err(format!("driver '{}' not ready", status.name))
            }
        }
    });

    let session_manager = sessions.clone();
    health.register("sessions", HEALTH_PROBE_TIMEOUT, false, move || {
        let sessions = session_manager.clone();
        async move { Ok(Some(format!("{} active", sessions.session_count().await))) }
    });

    health.register("memory", HEALTH_PROBE_TIMEOUT, false, || async {
        match rss_kib() {
            Some(kib) => Ok(Some(format!("{} KiB resident", kib))),
            None => Ok(None),
        }
    });

    Ok(AppState {
        registry,
        router,
        recorder,
        health: Arc::new(health),
        sessions,
        calls,
        channel: config.channel.clone(),
        ws_token_secret: derive_token_secret(&config.auth.token_secret),
        api_key: config.auth.api_key.clone(),
    })
}

/// Resident set size in KiB from `/proc/self/statm`, where available.
fn rss_kib() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4)
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/calls", post(api_calls::create_call_handler))
        .route("/api/calls/{vendorCallId}", get(api_calls::get_call_handler))
        .route("/api/messages", post(api_calls::send_message_handler))
        .route("/api/tts", post(api_calls::synthesize_handler))
        .route("/api/drivers", get(api_drivers::list_drivers_handler))
        .route("/api/drivers/active", get(api_drivers::active_driver_handler))
        .route("/api/drivers/switch", post(api_drivers::switch_driver_handler))
        .route(
            "/api/interactions",
            get(api_interactions::list_interactions_handler),
        )
        .route(
            "/api/interactions/{ownerId}",
            get(api_interactions::owner_interactions_handler),
        )
        .route(
            "/api/channel/token",
            post(api_channel::create_channel_token_handler),
        )
        .layer(axum::middleware::from_fn(middleware::api_key_middleware));

    Router::new()
        .route("/health", get(api_health::health_handler))
        .route("/health/live", get(api_health::liveness_handler))
        .route("/health/ready", get(api_health::readiness_handler))
        .route("/webhooks/{vendor}", post(api_webhooks::webhook_handler))
        .route("/channel", get(api_channel::channel_handler))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
