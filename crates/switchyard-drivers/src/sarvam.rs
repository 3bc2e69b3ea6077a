//! Sarvam adapter: JSON speech-result payloads and multilingual TTS.

use crate::{
    Driver, DriverError, DriverStatus, InboundEvent, InboundPayload, MessageReceipt,
    OutboundRequest, ReplyContent, SarvamConfig, VendorReply,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use switchyard_types::{Call, CallEvent, CallStatus, Capabilities, Direction, TurnInput};
use uuid::Uuid;

const VENDOR: &str = "sarvam";

const API_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SarvamDriver {
    config: SarvamConfig,
    client: reqwest::Client,
    ready: AtomicBool,
}

impl SarvamDriver {
    pub fn new(config: SarvamConfig) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| DriverError::configuration(VENDOR, format!("http client: {e}")))?;
        Ok(Self {
            config,
            client,
            ready: AtomicBool::new(false),
        })
    }

    fn map_event(event: &str) -> Option<CallStatus> {
        match event {
            "call_started" => Some(CallStatus::Initiated),
            "call_ringing" => Some(CallStatus::Ringing),
            "call_answered" | "speech_result" => Some(CallStatus::InProgress),
            "call_ended" => Some(CallStatus::Completed),
            "call_failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

#[async_trait]
impl Driver for SarvamDriver {
    fn name(&self) -> &'static str {
        VENDOR
    }

    async fn initialize(&self) -> Result<(), DriverError> {
        if !self.validate_config() {
            return Err(DriverError::configuration(VENDOR, "api_key is required"));
        }

        if !self.config.sandbox {
            let url = format!("{}/v1/models", self.config.api_base);
            let resp = self
                .client
                .get(&url)
                .header("api-subscription-key", &self.config.api_key)
                .send()
                .await
                .map_err(|e| DriverError::vendor(VENDOR, format!("unreachable: {e}")))?;
            if resp.status().is_server_error() {
                return Err(DriverError::vendor(
                    VENDOR,
                    format!("model probe returned {}", resp.status()),
                ));
            }
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(
            vendor = VENDOR,
            sandbox = self.config.sandbox,
            language = %self.config.language,
            "driver initialized"
        );
        Ok(())
    }

    fn validate_config(&self) -> bool {
        self.config.sandbox || !self.config.api_key.is_empty()
    }

    fn handle_inbound_event(&self, payload: &InboundPayload) -> Result<InboundEvent, DriverError> {
        let doc = payload
            .json()
            .map_err(|e| DriverError::validation(VENDOR, format!("bad json body: {e}")))?;

        let vendor_call_id = doc["call_id"]
            .as_str()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DriverError::validation(VENDOR, "missing call_id"))?
            .to_string();
        let event = doc["event"]
            .as_str()
            .ok_or_else(|| DriverError::validation(VENDOR, "missing event"))?;
        let status = Self::map_event(event)
            .ok_or_else(|| DriverError::validation(VENDOR, format!("unknown event {event}")))?;

        let transcript = doc["transcript"].as_str().filter(|t| !t.is_empty());

        Ok(InboundEvent {
            event: CallEvent {
                vendor: VENDOR.to_string(),
                vendor_call_id,
                status,
                from: doc["from"].as_str().map(str::to_string),
                to: doc["to"].as_str().map(str::to_string),
                direction: Direction::Inbound,
                recording_url: doc["recording_url"].as_str().map(str::to_string),
            },
            turn: transcript.map(|t| TurnInput::Text(t.to_string())),
            confidence: doc["confidence"].as_f64(),
        })
    }

    fn render_reply(&self, reply: &ReplyContent) -> VendorReply {
        let voice = reply.voice.as_deref().unwrap_or(&self.config.voice);
        let body = json!({
            "action": "speak",
            "text": reply.text,
            "language": self.config.language,
            "voice": voice,
            "gather": reply.gather,
        });
        VendorReply {
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    fn render_ack(&self) -> VendorReply {
        VendorReply {
            content_type: "application/json",
            body: json!({"status": "received"}).to_string(),
        }
    }

    /// Greets callers in the configured language.
    fn greeting(&self) -> Option<&str> {
        Some(match self.config.language.as_str() {
            "hi" => "नमस्ते, मैं आपकी कैसे मदद कर सकती हूँ?",
            _ => "Hello, how can I help you today?",
        })
    }

    async fn handle_outbound_request(&self, request: &OutboundRequest) -> Result<Call, DriverError> {
        if self.config.sandbox {
            let event = CallEvent {
                vendor: VENDOR.to_string(),
                vendor_call_id: format!("sarvam-sandbox-{}", Uuid::new_v4().simple()),
                status: CallStatus::Initiated,
                from: None,
                to: Some(request.to.clone()),
                direction: Direction::Outbound,
                recording_url: None,
            };
            return Ok(Call::from_event(&event));
        }

        let resp = self
            .client
            .post(format!("{}/v1/calls", self.config.api_base))
            .header("api-subscription-key", &self.config.api_key)
            .json(&json!({
                "to": request.to,
                "message": request.message,
                "language": self.config.language,
                "voice": request.voice.as_deref().unwrap_or(&self.config.voice),
            }))
            .send()
            .await
            .map_err(|e| DriverError::vendor(VENDOR, format!("call create failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(DriverError::vendor(
                VENDOR,
                format!("call create returned {}", resp.status()),
            ));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DriverError::vendor(VENDOR, format!("bad call response: {e}")))?;
        let call_id = body["call_id"]
            .as_str()
            .ok_or_else(|| DriverError::vendor(VENDOR, "call response missing call_id"))?;

        let event = CallEvent {
            vendor: VENDOR.to_string(),
            vendor_call_id: call_id.to_string(),
            status: CallStatus::Initiated,
            from: None,
            to: Some(request.to.clone()),
            direction: Direction::Outbound,
            recording_url: None,
        };
        Ok(Call::from_event(&event))
    }

    async fn text_to_speech(
        &self,
        text: &str,
        voice: Option<&str>,
    ) -> Result<VendorReply, DriverError> {
        let voice = voice.unwrap_or(&self.config.voice);

        if self.config.sandbox {
            let body = json!({
                "audio_url": format!("sandbox://tts/{}", Uuid::new_v4().simple()),
                "language": self.config.language,
                "voice": voice,
                "format": "wav",
            });
            return Ok(VendorReply {
                content_type: "application/json",
                body: body.to_string(),
            });
        }

        let resp = self
            .client
            .post(format!("{}/text-to-speech", self.config.api_base))
            .header("api-subscription-key", &self.config.api_key)
            .json(&json!({
                "inputs": [text],
                "target_language_code": self.config.language,
                "speaker": voice,
            }))
            .send()
            .await
            .map_err(|e| DriverError::vendor(VENDOR, format!("tts request failed: {e}")))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(DriverError::validation(
                VENDOR,
                format!("tts rejected input: {status}"),
            ));
        }
        if !status.is_success() {
            return Err(DriverError::vendor(VENDOR, format!("tts returned {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DriverError::vendor(VENDOR, format!("bad tts response: {e}")))?;
        let audio_url = body["audio_url"].as_str();
        let audio_b64 = body["audios"].get(0).and_then(|a| a.as_str());
        if audio_url.is_none() && audio_b64.is_none() {
            return Err(DriverError::vendor(VENDOR, "tts response carried no audio"));
        }

        let out = json!({
            "audio_url": audio_url,
            "audio_base64": audio_b64,
            "language": self.config.language,
            "voice": voice,
            "format": "wav",
        });
        Ok(VendorReply {
            content_type: "application/json",
            body: out.to_string(),
        })
    }

    async fn send_text(&self, _to: &str, _message: &str) -> Result<MessageReceipt, DriverError> {
        Err(DriverError::unsupported(VENDOR, "send_text"))
    }

    fn status(&self) -> DriverStatus {
        DriverStatus {
            name: VENDOR.to_string(),
            ready: self.ready.load(Ordering::SeqCst),
            sandbox: self.config.sandbox,
            capabilities: Capabilities {
                voice: true,
                sms: false,
                tts: true,
                stt: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_driver(language: &str) -> SarvamDriver {
        SarvamDriver::new(SarvamConfig {
            api_key: "key".to_string(),
            api_base: "https://api.sarvam.ai".to_string(),
            language: language.to_string(),
            voice: "female".to_string(),
            sandbox: true,
        })
        .expect("driver construction should succeed")
    }

    fn json_payload(value: serde_json::Value) -> InboundPayload {
        InboundPayload::new("application/json", value.to_string().into_bytes())
    }

    #[test]
    fn parses_speech_result_payload() {
        let driver = sandbox_driver("hi");
        let inbound = driver
            .handle_inbound_event(&json_payload(json!({
                "call_id": "sc-1",
                "event": "speech_result",
                "transcript": "कमरा बुक करना है",
                "confidence": 0.95,
                "language": "hi"
            })))
            .expect("should parse");

        assert_eq!(inbound.event.status, CallStatus::InProgress);
        assert_eq!(
            inbound.turn,
            Some(TurnInput::Text("कमरा बुक करना है".to_string()))
        );
        assert_eq!(inbound.confidence, Some(0.95));
    }

    #[test]
    fn greeting_follows_language() {
        assert!(sandbox_driver("hi").greeting().expect("greeting").contains("नमस्ते"));
        assert!(sandbox_driver("en").greeting().expect("greeting").contains("Hello"));
    }

    #[test]
    fn missing_call_id_is_validation_error() {
        let driver = sandbox_driver("hi");
        let err = driver
            .handle_inbound_event(&json_payload(json!({"event": "call_started"})))
            .expect_err("should reject");
        assert_eq!(err.kind, crate::DriverErrorKind::Validation);
    }

    #[tokio::test]
    async fn send_text_is_unsupported() {
        let driver = sandbox_driver("hi");
        let err = driver
            .send_text("+15550000", "hi")
            .await
            .expect_err("should be unsupported");
        assert_eq!(err.kind, crate::DriverErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn sandbox_tts_fabricates_audio_reference() {
        let driver = sandbox_driver("hi");
        let reply = driver
            .text_to_speech("नमस्ते", None)
            .await
            .expect("sandbox tts succeeds");
        let doc: serde_json::Value = serde_json::from_str(&reply.body).expect("valid json");
        assert!(doc["audio_url"]
            .as_str()
            .expect("audio_url present")
            .starts_with("sandbox://tts/"));
        assert_eq!(doc["language"], "hi");
    }
}
