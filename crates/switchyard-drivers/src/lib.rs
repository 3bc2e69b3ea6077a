//! Vendor driver abstraction for the Switchyard gateway.
//!
//! Each telephony vendor is wrapped by one adapter implementing [`Driver`]:
//! the adapter owns exactly the translation between that vendor's wire shape
//! and the internal [`Call`]/turn model, and nothing else. Adapters never
//! call each other, and vendor failures cross the adapter boundary only as
//! typed [`DriverError`] values — the caller decides retry and fallback.
//!
//! The [`DriverRegistry`] holds the single active driver and performs
//! validated, serialized switches between adapters.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use switchyard_types::{Call, Capabilities, CallEvent, TurnInput};

mod config;
mod error;
mod registry;
mod sarvam;
mod telnyx;
mod twilio;

pub use config::{DriversConfig, SarvamConfig, TelnyxConfig, TwilioConfig};
pub use error::{DriverError, DriverErrorKind};
pub use registry::{DriverRegistry, DriverSummary, RegistryError};
pub use sarvam::SarvamDriver;
pub use telnyx::TelnyxDriver;
pub use twilio::TwilioDriver;

/// Raw inbound webhook payload, exactly as the vendor delivered it.
#[derive(Debug, Clone)]
pub struct InboundPayload {
    /// The `Content-Type` header value.
    pub content_type: String,
    /// The raw request body.
    pub body: Vec<u8>,
}

impl InboundPayload {
    pub fn new(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            body,
        }
    }

    /// Parses the body as a form-encoded field map.
    pub fn form(&self) -> Result<HashMap<String, String>, serde_urlencoded::de::Error> {
        serde_urlencoded::from_bytes(&self.body)
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Result of normalizing one inbound vendor event.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// The normalized call event.
    pub event: CallEvent,
    /// Conversational input carried by the event (speech result, gathered
    /// text), if any. Presence of a turn is what makes an event routable.
    pub turn: Option<TurnInput>,
    /// Vendor-reported recognition confidence for the turn input.
    pub confidence: Option<f64>,
}

/// What the gateway wants spoken back to the vendor's caller.
#[derive(Debug, Clone)]
pub struct ReplyContent {
    pub text: String,
    /// When true, keep listening for the caller's next utterance.
    pub gather: bool,
    /// Voice override; adapters fall back to their configured voice.
    pub voice: Option<String>,
}

impl ReplyContent {
    pub fn speak(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            gather: true,
            voice: None,
        }
    }

    pub fn hangup(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            gather: false,
            voice: None,
        }
    }
}

/// A rendered vendor-specific response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorReply {
    /// Response `Content-Type` (XML for TwiML, JSON elsewhere).
    pub content_type: &'static str,
    pub body: String,
}

/// Receipt for a sent text message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReceipt {
    pub message_id: String,
    pub status: String,
    pub vendor: String,
    pub channel: String,
}

/// An outbound call request handed to the active driver.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub to: String,
    /// Text to speak (or play) once the callee answers.
    pub message: String,
    pub voice: Option<String>,
}

/// Snapshot of a driver's identity, readiness, and capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct DriverStatus {
    pub name: String,
    pub ready: bool,
    pub sandbox: bool,
    pub capabilities: Capabilities,
}

/// Contract every vendor adapter must satisfy.
///
/// `initialize` and the outbound operations are the only suspension points;
/// payload normalization and reply rendering are pure.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable vendor name; doubles as the webhook path segment.
    fn name(&self) -> &'static str;

    /// Verifies credentials and vendor reachability, and marks the driver
    /// ready. A driver that cannot reach its vendor reports not-ready; the
    /// registry refuses to activate it.
    async fn initialize(&self) -> Result<(), DriverError>;

    /// Cheap structural validation of the configured credentials.
    fn validate_config(&self) -> bool;

    /// Normalizes one vendor webhook into a [`CallEvent`] plus optional turn.
    fn handle_inbound_event(&self, payload: &InboundPayload) -> Result<InboundEvent, DriverError>;

    /// Renders the vendor-specific call-control document for a reply.
    fn render_reply(&self, reply: &ReplyContent) -> VendorReply;

    /// Renders the vendor-specific acknowledgement for a non-conversational
    /// event (status callbacks and the like).
    fn render_ack(&self) -> VendorReply;

    /// Vendor-specific greeting for an answered call, when the vendor
    /// carries a language of its own. `None` defers to the gateway default.
    fn greeting(&self) -> Option<&str> {
        None
    }

    /// Places an outbound call.
    async fn handle_outbound_request(&self, request: &OutboundRequest) -> Result<Call, DriverError>;

    /// Synthesizes speech; the reply shape is vendor-specific (TwiML for
    /// Twilio, JSON with an audio reference elsewhere).
    async fn text_to_speech(&self, text: &str, voice: Option<&str>)
        -> Result<VendorReply, DriverError>;

    /// Sends a text message.
    async fn send_text(&self, to: &str, message: &str) -> Result<MessageReceipt, DriverError>;

    /// Current readiness and capability snapshot.
    fn status(&self) -> DriverStatus;
}
