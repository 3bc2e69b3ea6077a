//! Telnyx adapter: JSON call-control events in, command documents out.

use crate::{
    Driver, DriverError, DriverStatus, InboundEvent, InboundPayload, MessageReceipt,
    OutboundRequest, ReplyContent, TelnyxConfig, VendorReply,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use switchyard_types::{Call, CallEvent, CallStatus, Capabilities, Direction, TurnInput};
use uuid::Uuid;

const VENDOR: &str = "telnyx";

const API_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TelnyxDriver {
    config: TelnyxConfig,
    client: reqwest::Client,
    ready: AtomicBool,
}

impl TelnyxDriver {
    pub fn new(config: TelnyxConfig) -> Result<Self, DriverError> {
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

    fn map_event_type(event_type: &str) -> Option<CallStatus> {
        match event_type {
            "call.initiated" => Some(CallStatus::Initiated),
            "call.ringing" => Some(CallStatus::Ringing),
            "call.answered" | "call.transcription" | "call.gather.ended" => {
                Some(CallStatus::InProgress)
            }
            "call.hangup" => Some(CallStatus::Completed),
            "call.failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

#[async_trait]
impl Driver for TelnyxDriver {
    fn name(&self) -> &'static str {
        VENDOR
    }

    async fn initialize(&self) -> Result<(), DriverError> {
        if !self.validate_config() {
            return Err(DriverError::configuration(
                VENDOR,
                "api_key, from_number, and connection_id are required",
            ));
        }

        if !self.config.sandbox {
            let url = format!("{}/v2/whoami", self.config.api_base);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .send()
                .await
                .map_err(|e| DriverError::vendor(VENDOR, format!("unreachable: {e}")))?;
            if !resp.status().is_success() {
                return Err(DriverError::vendor(
                    VENDOR,
                    format!("credential probe returned {}", resp.status()),
                ));
            }
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(vendor = VENDOR, sandbox = self.config.sandbox, "driver initialized");
        Ok(())
    }

    fn validate_config(&self) -> bool {
        self.config.sandbox
            || (!self.config.api_key.is_empty()
                && !self.config.from_number.is_empty()
                && !self.config.connection_id.is_empty())
    }

    fn handle_inbound_event(&self, payload: &InboundPayload) -> Result<InboundEvent, DriverError> {
        let doc = payload
            .json()
            .map_err(|e| DriverError::validation(VENDOR, format!("bad json body: {e}")))?;
        let data = &doc["data"];

        let event_type = data["event_type"]
            .as_str()
            .ok_or_else(|| DriverError::validation(VENDOR, "missing data.event_type"))?;
        let status = Self::map_event_type(event_type).ok_or_else(|| {
            DriverError::validation(VENDOR, format!("unknown event_type {event_type}"))
        })?;

        let call_payload = &data["payload"];
        let vendor_call_id = call_payload["call_control_id"]
            .as_str()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DriverError::validation(VENDOR, "missing payload.call_control_id"))?
            .to_string();

        let direction = match call_payload["direction"].as_str() {
            Some("outgoing") => Direction::Outbound,
            _ => Direction::Inbound,
        };

        // Transcribed speech arrives either as a transcription event or as
        // the result of a gather-using-speak command.
        let transcript = call_payload["transcription_data"]["transcript"]
            .as_str()
            .or_else(|| call_payload["speech"].as_str())
            .filter(|t| !t.is_empty());
        let confidence = call_payload["transcription_data"]["confidence"].as_f64();

        Ok(InboundEvent {
            event: CallEvent {
                vendor: VENDOR.to_string(),
                vendor_call_id,
                status,
                from: call_payload["from"].as_str().map(str::to_string),
                to: call_payload["to"].as_str().map(str::to_string),
                direction,
                recording_url: call_payload["recording_urls"]["mp3"]
                    .as_str()
                    .map(str::to_string),
            },
            turn: transcript.map(|t| TurnInput::Text(t.to_string())),
            confidence,
        })
    }

    fn render_reply(&self, reply: &ReplyContent) -> VendorReply {
        let voice = reply.voice.as_deref().unwrap_or(&self.config.voice);
        let command = if reply.gather {
            "gather_using_speak"
        } else {
            "speak"
        };
        let body = json!({
            "commands": [{
                "command": command,
                "payload": {
                    "payload": reply.text,
                    "voice": voice,
                    "payload_type": "text",
                }
            }]
        });
        VendorReply {
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    fn render_ack(&self) -> VendorReply {
        VendorReply {
            content_type: "application/json",
            body: json!({"status": "ok"}).to_string(),
        }
    }

    async fn handle_outbound_request(&self, request: &OutboundRequest) -> Result<Call, DriverError> {
        if self.config.sandbox {
            let event = CallEvent {
                vendor: VENDOR.to_string(),
                vendor_call_id: format!("v3-sandbox-{}", Uuid::new_v4().simple()),
                status: CallStatus::Initiated,
                from: Some(self.config.from_number.clone()),
                to: Some(request.to.clone()),
                direction: Direction::Outbound,
                recording_url: None,
            };
            return Ok(Call::from_event(&event));
        }

        let resp = self
            .client
            .post(format!("{}/v2/calls", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "connection_id": self.config.connection_id,
                "to": request.to,
                "from": self.config.from_number,
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
        let call_control_id = body["data"]["call_control_id"]
            .as_str()
            .ok_or_else(|| DriverError::vendor(VENDOR, "call response missing call_control_id"))?;

        let event = CallEvent {
            vendor: VENDOR.to_string(),
            vendor_call_id: call_control_id.to_string(),
            status: CallStatus::Initiated,
            from: Some(self.config.from_number.clone()),
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
        // Telnyx speaks via a call-control command rather than returning media.
        Ok(self.render_reply(&ReplyContent {
            text: text.to_string(),
            gather: false,
            voice: voice.map(str::to_string),
        }))
    }

    async fn send_text(&self, to: &str, message: &str) -> Result<MessageReceipt, DriverError> {
        if self.config.sandbox {
            return Ok(MessageReceipt {
                message_id: format!("msg-sandbox-{}", Uuid::new_v4().simple()),
                status: "queued".to_string(),
                vendor: VENDOR.to_string(),
                channel: "sms".to_string(),
            });
        }

        let resp = self
            .client
            .post(format!("{}/v2/messages", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "from": self.config.from_number,
                "to": to,
                "text": message,
            }))
            .send()
            .await
            .map_err(|e| DriverError::vendor(VENDOR, format!("message send failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(DriverError::vendor(
                VENDOR,
                format!("message send returned {}", resp.status()),
            ));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DriverError::vendor(VENDOR, format!("bad message response: {e}")))?;
        Ok(MessageReceipt {
            message_id: body["data"]["id"].as_str().unwrap_or_default().to_string(),
            status: "queued".to_string(),
            vendor: VENDOR.to_string(),
            channel: "sms".to_string(),
        })
    }

    fn status(&self) -> DriverStatus {
        DriverStatus {
            name: VENDOR.to_string(),
            ready: self.ready.load(Ordering::SeqCst),
            sandbox: self.config.sandbox,
            capabilities: Capabilities {
                voice: true,
                sms: true,
                tts: true,
                stt: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_driver() -> TelnyxDriver {
        TelnyxDriver::new(TelnyxConfig {
            api_key: "key".to_string(),
            from_number: "+15550000".to_string(),
            connection_id: "conn-1".to_string(),
            api_base: "https://api.telnyx.com".to_string(),
            voice: "female".to_string(),
            sandbox: true,
        })
        .expect("driver construction should succeed")
    }

    fn json_payload(value: serde_json::Value) -> InboundPayload {
        InboundPayload::new("application/json", value.to_string().into_bytes())
    }

    #[test]
    fn parses_call_answered_event() {
        let driver = sandbox_driver();
        let inbound = driver
            .handle_inbound_event(&json_payload(json!({
                "data": {
                    "event_type": "call.answered",
                    "payload": {
                        "call_control_id": "v3:abc",
                        "from": "+15551111",
                        "to": "+15552222",
                        "direction": "incoming"
                    }
                }
            })))
            .expect("should parse");

        assert_eq!(inbound.event.vendor_call_id, "v3:abc");
        assert_eq!(inbound.event.status, CallStatus::InProgress);
        assert_eq!(inbound.event.direction, Direction::Inbound);
        assert!(inbound.turn.is_none());
    }

    #[test]
    fn parses_transcription_as_turn() {
        let driver = sandbox_driver();
        let inbound = driver
            .handle_inbound_event(&json_payload(json!({
                "data": {
                    "event_type": "call.transcription",
                    "payload": {
                        "call_control_id": "v3:abc",
                        "transcription_data": {
                            "transcript": "what time do you open",
                            "confidence": 0.87
                        }
                    }
                }
            })))
            .expect("should parse");

        assert_eq!(
            inbound.turn,
            Some(TurnInput::Text("what time do you open".to_string()))
        );
        assert_eq!(inbound.confidence, Some(0.87));
    }

    #[test]
    fn unknown_event_type_is_validation_error() {
        let driver = sandbox_driver();
        let err = driver
            .handle_inbound_event(&json_payload(json!({
                "data": {
                    "event_type": "call.espresso",
                    "payload": { "call_control_id": "v3:abc" }
                }
            })))
            .expect_err("should reject");
        assert_eq!(err.kind, crate::DriverErrorKind::Validation);
    }

    #[test]
    fn reply_uses_gather_command_when_listening() {
        let driver = sandbox_driver();
        let reply = driver.render_reply(&ReplyContent::speak("hello"));
        assert_eq!(reply.content_type, "application/json");
        let doc: serde_json::Value = serde_json::from_str(&reply.body).expect("valid json");
        assert_eq!(doc["commands"][0]["command"], "gather_using_speak");

        let reply = driver.render_reply(&ReplyContent::hangup("bye"));
        let doc: serde_json::Value = serde_json::from_str(&reply.body).expect("valid json");
        assert_eq!(doc["commands"][0]["command"], "speak");
    }
}
