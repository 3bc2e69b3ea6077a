use axum::{routing::post, Json, Router};
use futures_util::{SinkExt, StreamExt};
use switchyard_drivers::{DriversConfig, TwilioConfig};
use switchyard_server::config::Config;
use switchyard_server::{app, build_state};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

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

/// Starts a gateway with a small frame ceiling and returns its address.
async fn spawn_gateway(processor_endpoint: String) -> std::net::SocketAddr {
    let mut config = Config::default();
    config.storage.backend = "memory".to_string();
    config.processor.endpoint = processor_endpoint;
    config.processor.timeout_ms = 2_000;
    config.processor.max_retries = 0;
    config.channel.max_frame_bytes = 1024;
    config.auth.token_secret = "channel-test-secret".to_string();
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
    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn mint_token(addr: std::net::SocketAddr) -> String {
    let resp: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{}/api/channel/token", addr))
        .send()
        .await
        .expect("token endpoint answers")
        .json()
        .await
        .expect("token response is json");
    resp["token"].as_str().expect("token present").to_string()
}

async fn next_frame<S>(stream: &mut S) -> serde_json::Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
            .await
            .expect("frame arrives in time")
            .expect("stream open")
            .expect("frame reads");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is json");
        }
    }
}

#[tokio::test]
async fn session_handshake_and_text_turn() {
    let addr = spawn_gateway(spawn_processor().await).await;
    let token = mint_token(addr).await;

    let (mut ws, _) = connect_async(format!("ws://{}/channel?token={}", addr, token))
        .await
        .expect("channel connects");

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["type"], "connection");
    assert!(frame["session_id"].is_string());

    ws.send(Message::Text(
        r#"{"type":"text","content":"what time is it"}"#.into(),
    ))
    .await
    .unwrap();

    let ack = next_frame(&mut ws).await;
    assert_eq!(ack["type"], "text_ack");
    let correlation_id = ack["correlation_id"].as_str().unwrap().to_string();

    let response = next_frame(&mut ws).await;
    assert_eq!(response["type"], "text_response");
    assert_eq!(response["correlation_id"], correlation_id.as_str());
    assert_eq!(response["content"], "heard: what time is it");
    assert_eq!(response["intent"], "echo");
}

#[tokio::test]
async fn responses_keep_arrival_order() {
    let addr = spawn_gateway(spawn_processor().await).await;
    let token = mint_token(addr).await;

    let (mut ws, _) = connect_async(format!("ws://{}/channel?token={}", addr, token))
        .await
        .expect("channel connects");
    let _connection = next_frame(&mut ws).await;

    ws.send(Message::Text(r#"{"type":"text","content":"first"}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"text","content":"second"}"#.into()))
        .await
        .unwrap();

    let first_ack = next_frame(&mut ws).await;
    assert_eq!(first_ack["type"], "text_ack");
    let first_response = next_frame(&mut ws).await;
    assert_eq!(first_response["content"], "heard: first");

    let second_ack = next_frame(&mut ws).await;
    assert_eq!(second_ack["type"], "text_ack");
    let second_response = next_frame(&mut ws).await;
    assert_eq!(second_response["content"], "heard: second");
}

#[tokio::test]
async fn oversized_frame_is_refused_without_closing() {
    let addr = spawn_gateway(spawn_processor().await).await;
    let token = mint_token(addr).await;

    let (mut ws, _) = connect_async(format!("ws://{}/channel?token={}", addr, token))
        .await
        .expect("channel connects");
    let _connection = next_frame(&mut ws).await;

    let oversized = format!(
        r#"{{"type":"text","content":"{}"}}"#,
        "x".repeat(2 * 1024)
    );
    ws.send(Message::Text(oversized.into())).await.unwrap();

    let error = next_frame(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "frame_too_large");

    // The session survives the refusal.
    ws.send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let pong = next_frame(&mut ws).await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn unparseable_frame_gets_error_frame() {
    let addr = spawn_gateway(spawn_processor().await).await;
    let token = mint_token(addr).await;

    let (mut ws, _) = connect_async(format!("ws://{}/channel?token={}", addr, token))
        .await
        .expect("channel connects");
    let _connection = next_frame(&mut ws).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let error = next_frame(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "bad_frame");
}

#[tokio::test]
async fn subscription_delivers_call_updates() {
    let addr = spawn_gateway(spawn_processor().await).await;
    let token = mint_token(addr).await;

    let (mut ws, _) = connect_async(format!("ws://{}/channel?token={}", addr, token))
        .await
        .expect("channel connects");
    let _connection = next_frame(&mut ws).await;

    ws.send(Message::Text(
        r#"{"type":"subscribe","call_id":"CA200"}"#.into(),
    ))
    .await
    .unwrap();
    let ack = next_frame(&mut ws).await;
    assert_eq!(ack["type"], "subscribe_ack");
    assert_eq!(ack["subscribed"], true);

    // A vendor callback for the subscribed call fans out to the session.
    let status = reqwest::Client::new()
        .post(format!("http://{}/webhooks/twilio", addr))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("CallSid=CA200&CallStatus=in-progress&Direction=inbound")
        .send()
        .await
        .expect("webhook answers")
        .status();
    assert!(status.is_success());

    let update = next_frame(&mut ws).await;
    assert_eq!(update["type"], "call_update");
    assert_eq!(update["call_id"], "CA200");
    assert_eq!(update["status"], "in-progress");
}

#[tokio::test]
async fn missing_or_forged_token_is_refused_before_upgrade() {
    let addr = spawn_gateway(spawn_processor().await).await;

    let err = connect_async(format!("ws://{}/channel", addr))
        .await
        .expect_err("missing token refused");
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref resp) if resp.status() == 401
    ));

    let err = connect_async(format!("ws://{}/channel?token=forged", addr))
        .await
        .expect_err("forged token refused");
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref resp) if resp.status() == 401
    ));
}
