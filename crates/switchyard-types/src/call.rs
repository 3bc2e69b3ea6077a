//! Normalized call model shared by every vendor adapter.

use crate::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a call.
///
/// Statuses are strictly ordered; a call only ever advances through them.
/// `Completed` and `Failed` are both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    /// Position in the forward-only ordering.
    fn rank(self) -> u8 {
        match self {
            Self::Initiated => 0,
            Self::Ringing => 1,
            Self::InProgress => 2,
            Self::Completed => 3,
            Self::Failed => 3,
        }
    }

    /// Returns true if a transition from `self` to `next` moves forward.
    ///
    /// Transitions to the same status are not advances; `Completed` and
    /// `Failed` share a rank so neither can replace the other.
    pub fn can_advance_to(self, next: CallStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the string label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Attempts to parse a status from its label.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A normalized event extracted from one vendor webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    /// The vendor that produced the event.
    pub vendor: String,
    /// The vendor's own call identifier, used for reconciliation.
    pub vendor_call_id: String,
    /// Status reported by this event.
    pub status: CallStatus,
    /// Calling endpoint, when the vendor reports one.
    pub from: Option<String>,
    /// Called endpoint, when the vendor reports one.
    pub to: Option<String>,
    /// Direction of the call from the gateway's perspective.
    pub direction: Direction,
    /// Recording URL, when the vendor attaches one.
    pub recording_url: Option<String>,
}

/// One end-to-end phone interaction, tracked from initiation to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Local correlation id, assigned when the call is first seen.
    pub correlation_id: Uuid,
    /// The vendor that owns the call.
    pub vendor: String,
    /// The vendor's call identifier.
    pub vendor_call_id: String,
    /// Calling endpoint.
    pub from: Option<String>,
    /// Called endpoint.
    pub to: Option<String>,
    /// Current status; advances forward only.
    pub status: CallStatus,
    /// Direction of the call.
    pub direction: Direction,
    /// Recording URL, if one has been reported.
    pub recording_url: Option<String>,
    /// Transcript URL, if one has been reported.
    pub transcript_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Creates a new call from its first observed event.
    pub fn from_event(event: &CallEvent) -> Self {
        let now = Utc::now();
        Self {
            correlation_id: Uuid::new_v4(),
            vendor: event.vendor.clone(),
            vendor_call_id: event.vendor_call_id.clone(),
            from: event.from.clone(),
            to: event.to.clone(),
            status: event.status,
            direction: event.direction,
            recording_url: event.recording_url.clone(),
            transcript_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a subsequent event to this call.
    ///
    /// Status only advances; a stale or replayed event leaves the status
    /// untouched and returns `false`. Ancillary fields (endpoints, recording
    /// URL) are still filled in when previously missing.
    pub fn apply(&mut self, event: &CallEvent) -> bool {
        if self.from.is_none() {
            self.from = event.from.clone();
        }
        if self.to.is_none() {
            self.to = event.to.clone();
        }
        if self.recording_url.is_none() {
            self.recording_url = event.recording_url.clone();
        }

        if self.status.can_advance_to(event.status) {
            self.status = event.status;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: CallStatus) -> CallEvent {
        CallEvent {
            vendor: "twilio".to_string(),
            vendor_call_id: "CA123".to_string(),
            status,
            from: Some("+15550001".to_string()),
            to: Some("+15550002".to_string()),
            direction: Direction::Inbound,
            recording_url: None,
        }
    }

    #[test]
    fn status_only_advances() {
        assert!(CallStatus::Initiated.can_advance_to(CallStatus::Ringing));
        assert!(CallStatus::Ringing.can_advance_to(CallStatus::InProgress));
        assert!(CallStatus::InProgress.can_advance_to(CallStatus::Completed));
        assert!(CallStatus::InProgress.can_advance_to(CallStatus::Failed));

        assert!(!CallStatus::Ringing.can_advance_to(CallStatus::Initiated));
        assert!(!CallStatus::Completed.can_advance_to(CallStatus::InProgress));
        assert!(!CallStatus::Completed.can_advance_to(CallStatus::Failed));
        assert!(!CallStatus::Failed.can_advance_to(CallStatus::Completed));
        assert!(!CallStatus::Ringing.can_advance_to(CallStatus::Ringing));
    }

    #[test]
    fn terminal_statuses() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
    }

    #[test]
    fn status_label_round_trip() {
        for s in [
            CallStatus::Initiated,
            CallStatus::Ringing,
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Failed,
        ] {
            assert_eq!(CallStatus::parse(s.label()), Some(s));
        }
        assert_eq!(CallStatus::parse("on-hold"), None);
    }

    #[test]
    fn apply_ignores_backward_transition() {
        let mut call = Call::from_event(&event(CallStatus::InProgress));
        assert!(!call.apply(&event(CallStatus::Ringing)));
        assert_eq!(call.status, CallStatus::InProgress);

        assert!(call.apply(&event(CallStatus::Completed)));
        assert_eq!(call.status, CallStatus::Completed);
    }

    #[test]
    fn apply_fills_missing_fields_without_advancing() {
        let mut first = event(CallStatus::Initiated);
        first.from = None;
        let mut call = Call::from_event(&first);
        assert!(call.from.is_none());

        // Replay of the same status fills the endpoint but does not advance.
        assert!(!call.apply(&event(CallStatus::Initiated)));
        assert_eq!(call.from.as_deref(), Some("+15550001"));
        assert_eq!(call.status, CallStatus::Initiated);
    }
}
