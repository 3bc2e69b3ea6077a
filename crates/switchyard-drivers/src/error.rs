use thiserror::Error;

/// Classification of a driver failure.
///
/// The kind is what callers branch on; the message is for logs and operator
/// responses, never for parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Missing or invalid credentials; fails at `initialize`, never
    /// mid-request.
    Configuration,
    /// Malformed inbound payload; rejected immediately, no retry.
    Validation,
    /// Upstream vendor failure (API error, unreachable host).
    Vendor,
    /// The operation is not supported by this vendor.
    Unsupported,
}

impl DriverErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::Vendor => "vendor",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Typed error returned across every adapter boundary.
#[derive(Debug, Clone, Error)]
#[error("{vendor} driver {} error: {message}", kind.label())]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub vendor: &'static str,
    pub message: String,
}

impl DriverError {
    pub fn configuration(vendor: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Configuration,
            vendor,
            message: message.into(),
        }
    }

    pub fn validation(vendor: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Validation,
            vendor,
            message: message.into(),
        }
    }

    pub fn vendor(vendor: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Vendor,
            vendor,
            message: message.into(),
        }
    }

    pub fn unsupported(vendor: &'static str, operation: &str) -> Self {
        Self {
            kind: DriverErrorKind::Unsupported,
            vendor,
            message: format!("{operation} is not supported"),
        }
    }
}
