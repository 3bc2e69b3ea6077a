use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{routing::post, Json, Router};
use switchyard_drivers::{DriversConfig, SarvamConfig, TwilioConfig};
use switchyard_server::config::Config;
use switchyard_server::{app, build_state};
use tokio::net::TcpListener;
use tower::ServiceExt; // for oneshot

/// Stub conversation processor that echoes the turn text.
async fn process(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "response": format!("heard: {}", body["text"].as_str().unwrap_or_default()),
        "intent": "echo",
        "confidence": 0.9,
    }))
}

async fn spawn_processor() -> String {
    let stub = Router::new().route("/process", post(process));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub).await.unwrap();
    });
    format!("http://{}/process", addr)
}

async fn gateway(processor_endpoint: String) -> Router {
    let mut config = Config::default();
    config.storage.backend = "memory".to_string();
    config.processor.endpoint = processor_endpoint;
    config.processor.timeout_ms = 2_000;
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
        sarvam: None,
    };
    let state = build_state(&config).await.unwrap();
    app(state)
}

fn webhook(vendor: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{vendor}"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn status_callback_is_acknowledged() {
    let app = gateway(spawn_processor().await).await;

    let response = app
        .oneshot(webhook(
            "twilio",
            "CallSid=CA100&CallStatus=ringing&From=%2B15551111&To=%2B15552222&Direction=inbound",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("<Response/>"));
}

#[tokio::test]
async fn answered_call_gets_the_greeting() {
    let app = gateway(spawn_processor().await).await;

    let response = app
        .oneshot(webhook(
            "twilio",
            "CallSid=CA101&CallStatus=in-progress&Direction=inbound",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    // Greeting plus an open microphone for the caller's first utterance.
    assert!(body.contains("<Gather"));
    assert!(body.contains("How can I help you today"));
}

#[tokio::test]
async fn sarvam_answered_call_greets_in_its_language() {
    let mut config = Config::default();
    config.storage.backend = "memory".to_string();
    config.processor.endpoint = spawn_processor().await;
    config.drivers = DriversConfig {
        active: "sarvam".to_string(),
        twilio: None,
        telnyx: None,
        sarvam: Some(SarvamConfig {
            api_key: "key".to_string(),
            api_base: "https://api.sarvam.ai".to_string(),
            language: "hi".to_string(),
            voice: "female".to_string(),
            sandbox: true,
        }),
    };
    let app = app(build_state(&config).await.unwrap());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/sarvam")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"call_id":"sc-42","event":"call_answered","from":"+915551111"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("नमस्ते"));
}

#[tokio::test]
async fn speech_result_is_routed_and_spoken_back() {
    let app = gateway(spawn_processor().await).await;

    let response = app
        .oneshot(webhook(
            "twilio",
            "CallSid=CA102&CallStatus=in-progress&SpeechResult=book%20a%20table&Direction=inbound",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("heard: book a table"));
    assert!(body.contains("<Gather"));
}

#[tokio::test]
async fn failed_turn_speaks_fallback_and_hangs_up() {
    // No processor listening: every attempt is a connect failure.
    let app = gateway("http://127.0.0.1:9/process".to_string()).await;

    let response = app
        .oneshot(webhook(
            "twilio",
            "CallSid=CA103&CallStatus=in-progress&SpeechResult=hello&Direction=inbound",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("having trouble"));
    assert!(body.contains("<Hangup/>"));
}

#[tokio::test]
async fn inactive_vendor_webhook_is_refused() {
    let app = gateway(spawn_processor().await).await;

    let response = app
        .oneshot(webhook("telnyx", "CallSid=CA104&CallStatus=ringing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_webhook_is_rejected() {
    let app = gateway(spawn_processor().await).await;

    let response = app
        .oneshot(webhook("twilio", "CallStatus=ringing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn call_status_never_moves_backwards() {
    let app = gateway(spawn_processor().await).await;

    let response = app
        .clone()
        .oneshot(webhook("twilio", "CallSid=CA105&CallStatus=completed"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A late, out-of-order callback must not resurrect the call.
    let response = app
        .clone()
        .oneshot(webhook("twilio", "CallSid=CA105&CallStatus=ringing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/calls/CA105")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "completed");
}
