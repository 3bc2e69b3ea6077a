//! The turn model: one request/response exchange with the external
//! conversation processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized input for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum TurnInput {
    /// Plain text, either typed by a duplex client or produced by a vendor's
    /// speech recognition.
    Text(String),
    /// A reference to audio content (base64 payload or media URL); the
    /// processor owns transcription.
    Audio(String),
}

impl TurnInput {
    /// A short form suitable for persistence and logs.
    pub fn summary(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::Audio(a) => a,
        }
    }
}

/// The single owner of a turn: a call or a channel session, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "owner", content = "id")]
pub enum TurnOwner {
    /// Owned by a call, keyed by its correlation id.
    Call(Uuid),
    /// Owned by a duplex channel session.
    Session(Uuid),
}

impl TurnOwner {
    /// The owning id as a string, used as the persistence key.
    pub fn id(&self) -> String {
        match self {
            Self::Call(id) | Self::Session(id) => id.to_string(),
        }
    }
}

/// Why a turn ended in an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnErrorKind {
    /// The processor rejected the input (4xx); never retried.
    Validation,
    /// The processor failed after retries were exhausted.
    Processor,
    /// No response within the configured deadline.
    Timeout,
}

impl TurnErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Processor => "processor",
            Self::Timeout => "timeout",
        }
    }
}

/// One terminal request/response exchange with the external processor.
///
/// A turn is created per inbound message and is terminal once answered or
/// errored; it is never reopened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Correlation id threaded through logs, storage, and responses.
    pub correlation_id: Uuid,
    /// The call or session this turn belongs to.
    pub owner: TurnOwner,
    /// The normalized input.
    pub input: TurnInput,
    /// Processor response text; `None` when the turn errored.
    pub output: Option<String>,
    /// Detected intent, if the processor reported one.
    pub intent: Option<String>,
    /// Processor confidence, if reported.
    pub confidence: Option<f64>,
    /// Media URL attached to the response, if any.
    pub media_url: Option<String>,
    /// Time from router entry to terminal outcome.
    pub latency_ms: u64,
    /// Error classification when the turn failed.
    pub error: Option<TurnErrorKind>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// True when this turn ended without an answer.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
