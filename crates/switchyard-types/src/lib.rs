//! Shared types for the Switchyard gateway.
//!
//! This crate provides the foundational types used across all Switchyard
//! crates: the normalized call and turn models, interaction records, and
//! driver capability flags.
//!
//! No crate in the workspace depends on anything *except* `switchyard-types`
//! for cross-cutting type definitions. This keeps the dependency graph clean
//! and prevents circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod call;
mod turn;

pub use call::{Call, CallEvent, CallStatus};
pub use turn::{Turn, TurnErrorKind, TurnInput, TurnOwner};

/// Direction of an interaction relative to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Initiated by a vendor webhook or a connected client.
    Inbound,
    /// Initiated by the gateway (outbound call, sent message).
    Outbound,
}

impl Direction {
    /// Returns the string label for this direction.
    pub fn label(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Attempts to parse a direction from its label.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// Capability flags for a telephony driver.
///
/// These flags determine which operations a driver supports; callers consult
/// them instead of probing methods and catching `Unsupported` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can place and receive voice calls.
    pub voice: bool,
    /// Can send text messages (SMS or equivalent).
    pub sms: bool,
    /// Can synthesize speech from text.
    pub tts: bool,
    /// Can deliver speech-recognition results in inbound events.
    pub stt: bool,
}

/// One persisted interaction row: a completed turn or a call status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Row id assigned by the storage backend.
    pub id: i64,
    /// Owning call correlation id or channel session id.
    pub owner_id: String,
    /// Direction of the interaction.
    pub direction: Direction,
    /// Normalized input (turn text, audio reference, or call event label).
    pub input: String,
    /// Processor output, if any.
    pub output: Option<String>,
    /// Detected intent, if any.
    pub intent: Option<String>,
    /// Processor confidence in the range 0.0..=1.0, if reported.
    pub confidence: Option<f64>,
    /// End-to-end latency in milliseconds.
    pub latency_ms: i64,
    /// Error classification label when the turn failed.
    pub error: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Generates a fresh correlation id.
///
/// Correlation ids thread one exchange across logs, persisted records, and
/// responses on both the voice path and the duplex-channel path.
pub fn new_correlation_id() -> Uuid {
    Uuid::new_v4()
}

/// Current time as an RFC 3339 string, the format used in all wire payloads
/// and persisted rows.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Current time as a typed timestamp.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
