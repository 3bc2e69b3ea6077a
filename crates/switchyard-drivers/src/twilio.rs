//! Twilio adapter: form-encoded webhooks in, TwiML documents out.

use crate::{
    Driver, DriverError, DriverStatus, InboundEvent, InboundPayload, MessageReceipt,
    OutboundRequest, ReplyContent, TwilioConfig, VendorReply,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use switchyard_types::{Call, CallEvent, CallStatus, Capabilities, Direction};
use uuid::Uuid;

const VENDOR: &str = "twilio";

/// Outbound API request timeout.
const API_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TwilioDriver {
    config: TwilioConfig,
    client: reqwest::Client,
    ready: AtomicBool,
}

impl TwilioDriver {
    pub fn new(config: TwilioConfig) -> Result<Self, DriverError> {
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

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}{}",
            self.config.api_base, self.config.account_sid, resource
        )
    }

    /// Maps Twilio's call status vocabulary onto the internal lifecycle.
    fn map_status(raw: &str) -> Option<CallStatus> {
        match raw {
            "queued" | "initiated" => Some(CallStatus::Initiated),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" | "answered" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "busy" | "failed" | "no-answer" | "canceled" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

/// Escapes text for embedding in a TwiML document.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Driver for TwilioDriver {
    fn name(&self) -> &'static str {
        VENDOR
    }

    async fn initialize(&self) -> Result<(), DriverError> {
        if !self.validate_config() {
            return Err(DriverError::configuration(
                VENDOR,
                "account_sid, auth_token, and from_number are required",
            ));
        }

        if !self.config.sandbox {
            // Probe the account resource so a wrong SID or token fails here
            // instead of on the first call.
            let url = self.account_url(".json");
            let resp = self
                .client
                .get(&url)
                .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
                .send()
                .await
                .map_err(|e| DriverError::vendor(VENDOR, format!("unreachable: {e}")))?;
            if !resp.status().is_success() {
                return Err(DriverError::vendor(
                    VENDOR,
                    format!("account probe returned {}", resp.status()),
                ));
            }
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(vendor = VENDOR, sandbox = self.config.sandbox, "driver initialized");
        Ok(())
    }

    fn validate_config(&self) -> bool {
        self.config.sandbox
            || (!self.config.account_sid.is_empty()
                && !self.config.auth_token.is_empty()
                && !self.config.from_number.is_empty())
    }

    fn handle_inbound_event(&self, payload: &InboundPayload) -> Result<InboundEvent, DriverError> {
        let fields = payload
            .form()
            .map_err(|e| DriverError::validation(VENDOR, format!("bad form body: {e}")))?;

        let vendor_call_id = fields
            .get("CallSid")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DriverError::validation(VENDOR, "missing CallSid"))?
            .clone();

        let raw_status = fields.get("CallStatus").map(String::as_str).unwrap_or("in-progress");
        let status = Self::map_status(raw_status)
            .ok_or_else(|| DriverError::validation(VENDOR, format!("unknown CallStatus {raw_status}")))?;

        let direction = match fields.get("Direction").map(String::as_str) {
            Some(d) if d.starts_with("outbound") => Direction::Outbound,
            _ => Direction::Inbound,
        };

        let turn = fields
            .get("SpeechResult")
            .filter(|t| !t.is_empty())
            .map(|t| switchyard_types::TurnInput::Text(t.clone()));
        let confidence = fields.get("Confidence").and_then(|c| c.parse::<f64>().ok());

        Ok(InboundEvent {
            event: CallEvent {
                vendor: VENDOR.to_string(),
                vendor_call_id,
                status,
                from: fields.get("From").cloned(),
                to: fields.get("To").cloned(),
                direction,
                recording_url: fields.get("RecordingUrl").cloned(),
            },
            turn,
            confidence,
        })
    }

    fn render_reply(&self, reply: &ReplyContent) -> VendorReply {
        let voice = reply.voice.as_deref().unwrap_or(&self.config.voice);
        let say = format!(
            r#"<Say voice="{}">{}</Say>"#,
            xml_escape(voice),
            xml_escape(&reply.text)
        );
        let body = if reply.gather {
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Response><Gather input="speech" method="POST">{say}</Gather></Response>"#
            )
        } else {
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Response>{say}<Hangup/></Response>"#
            )
        };
        VendorReply {
            content_type: "application/xml",
            body,
        }
    }

    fn render_ack(&self) -> VendorReply {
        VendorReply {
            content_type: "application/xml",
            body: r#"<?xml version="1.0" encoding="UTF-8"?><Response/>"#.to_string(),
        }
    }

    async fn handle_outbound_request(&self, request: &OutboundRequest) -> Result<Call, DriverError> {
        let twiml = self
            .render_reply(&ReplyContent {
                text: request.message.clone(),
                gather: false,
                voice: request.voice.clone(),
            })
            .body;

        if self.config.sandbox {
            let event = CallEvent {
                vendor: VENDOR.to_string(),
                vendor_call_id: format!("CA-sandbox-{}", Uuid::new_v4().simple()),
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
            .post(self.account_url("/Calls.json"))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", request.to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Twiml", twiml.as_str()),
            ])
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
        let sid = body["sid"]
            .as_str()
            .ok_or_else(|| DriverError::vendor(VENDOR, "call response missing sid"))?;
        let status = body["status"]
            .as_str()
            .and_then(Self::map_status)
            .unwrap_or(CallStatus::Initiated);

        let event = CallEvent {
            vendor: VENDOR.to_string(),
            vendor_call_id: sid.to_string(),
            status,
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
        // Twilio speaks via TwiML rather than returning audio media.
        Ok(self.render_reply(&ReplyContent {
            text: text.to_string(),
            gather: false,
            voice: voice.map(str::to_string),
        }))
    }

    async fn send_text(&self, to: &str, message: &str) -> Result<MessageReceipt, DriverError> {
        if self.config.sandbox {
            return Ok(MessageReceipt {
                message_id: format!("SM-sandbox-{}", Uuid::new_v4().simple()),
                status: "queued".to_string(),
                vendor: VENDOR.to_string(),
                channel: "sms".to_string(),
            });
        }

        let resp = self
            .client
            .post(self.account_url("/Messages.json"))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", message),
            ])
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
            message_id: body["sid"].as_str().unwrap_or_default().to_string(),
            status: body["status"].as_str().unwrap_or("queued").to_string(),
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
