use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use switchyard_drivers::{DriversConfig, SarvamConfig, TwilioConfig};
use switchyard_server::config::Config;
use switchyard_server::{app, build_state};
use tower::ServiceExt; // for oneshot

fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = "memory".to_string();
    // The processor is not exercised by these tests; an unroutable port keeps
    // accidental calls from hanging.
    config.processor.endpoint = "http://127.0.0.1:9/process".to_string();
    config.processor.timeout_ms = 200;
    config.processor.max_retries = 0;
    config.drivers = DriversConfig {
        active: "twilio".to_string(),
        twilio: Some(TwilioConfig {
            account_sid: "AC0".to_string(),
            auth_token: "tok".to_string(),
            from_number: "+15550000".to_string(),
            api_base: "https://api.twilio.com".to_string(),
            voice: "alice".to_string(),
            sandbox: true,
        }),
        telnyx: None,
        sarvam: Some(SarvamConfig {
            api_key: "key".to_string(),
            api_base: "https://api.sarvam.ai".to_string(),
            language: "hi".to_string(),
            voice: "female".to_string(),
            sandbox: true,
        }),
    };
    config
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_status_and_version() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["checks"].is_object());
}

#[tokio::test]
async fn liveness_always_answers() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "alive");
}

#[tokio::test]
async fn readiness_flips_when_critical_checks_fail() {
    let state = build_state(&test_config()).await.unwrap();
    let health = state.health.clone();
    let app = app(state);

    // Checks that have never run do not block readiness.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The processor endpoint is unreachable, so a probe cycle marks the
    // gateway not ready.
    health.run_all().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn api_routes_require_the_configured_key() {
    let mut config = test_config();
    config.auth.api_key = "gateway-key".to_string();
    let state = build_state(&config).await.unwrap();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/drivers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/drivers")
                .header("Authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/drivers")
                .header("Authorization", "Bearer gateway-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health stays open: orchestrators cannot present the key.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn drivers_can_be_listed_and_switched() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/drivers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let drivers = json["drivers"].as_array().unwrap();
    assert_eq!(drivers.len(), 2);
    let active: Vec<&Value> = drivers.iter().filter(|d| d["active"] == true).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["name"], "twilio");

    // Unknown vendors are refused and the active driver stays in place.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/drivers/switch")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"plivo"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/drivers/switch")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"sarvam"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "sarvam");
    assert_eq!(json["ready"], true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/drivers/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["name"], "sarvam");
}

#[tokio::test]
async fn sandbox_outbound_call_is_tracked() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"to":"+15553333","message":"Your order shipped"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let call_id = json["vendor_call_id"].as_str().unwrap().to_string();
    assert!(call_id.starts_with("CA-sandbox-"));
    assert_eq!(json["direction"], "outbound");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/calls/{call_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["vendor_call_id"], call_id.as_str());
}

#[tokio::test]
async fn empty_call_target_is_rejected() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"to":"","message":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sandbox_message_returns_receipt() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/messages")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"to":"+15553333","message":"hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["message_id"]
        .as_str()
        .unwrap()
        .starts_with("SM-sandbox-"));
    assert_eq!(json["vendor"], "twilio");
}

#[tokio::test]
async fn tts_returns_vendor_body() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tts")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"text":"welcome aboard"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "application/xml");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("welcome aboard"));
}

#[tokio::test]
async fn sqlite_backend_creates_and_reopens_its_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("gateway.db");

    let mut config = test_config();
    config.storage.backend = "sqlite".to_string();
    config.storage.path = db_path.to_str().unwrap().to_string();

    let state = build_state(&config).await.unwrap();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"to":"+15553333","message":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(db_path.exists(), "database file should be created on disk");

    // Reopening the same file re-runs the migration check without error.
    build_state(&config).await.unwrap();
}

#[tokio::test]
async fn interactions_endpoint_answers_empty_history() {
    let state = build_state(&test_config()).await.unwrap();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/interactions?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["interactions"].as_array().unwrap().len(), 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/interactions/no-such-owner")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["owner_id"], "no-such-owner");
}
