//! Driver configuration tables.
//!
//! A vendor is "known" to the registry exactly when its table is present in
//! the configuration. Credentials are validated structurally by
//! `validate_config` and against the vendor by `initialize`.

use serde::Deserialize;

/// The `[drivers]` section of the gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriversConfig {
    /// Name of the driver activated at startup.
    #[serde(default = "default_active")]
    pub active: String,

    pub twilio: Option<TwilioConfig>,
    pub telnyx: Option<TelnyxConfig>,
    pub sarvam: Option<SarvamConfig>,
}

fn default_active() -> String {
    "twilio".to_string()
}

/// Twilio credentials and behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// E.164 number calls and messages originate from.
    #[serde(default)]
    pub from_number: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
    /// Default TwiML voice.
    #[serde(default = "default_twilio_voice")]
    pub voice: String,
    /// Fabricate vendor ids locally instead of calling the Twilio API.
    #[serde(default)]
    pub sandbox: bool,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_twilio_voice() -> String {
    "alice".to_string()
}

/// Telnyx call-control credentials and behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct TelnyxConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub from_number: String,
    /// Call-control connection used for outbound calls.
    #[serde(default)]
    pub connection_id: String,
    #[serde(default = "default_telnyx_api_base")]
    pub api_base: String,
    #[serde(default = "default_telnyx_voice")]
    pub voice: String,
    #[serde(default)]
    pub sandbox: bool,
}

fn default_telnyx_api_base() -> String {
    "https://api.telnyx.com".to_string()
}

fn default_telnyx_voice() -> String {
    "female".to_string()
}

/// Sarvam speech-platform credentials and behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct SarvamConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_sarvam_api_base")]
    pub api_base: String,
    /// BCP-47-ish language code; drives the greeting and TTS target.
    #[serde(default = "default_sarvam_language")]
    pub language: String,
    #[serde(default = "default_sarvam_voice")]
    pub voice: String,
    #[serde(default)]
    pub sandbox: bool,
}

fn default_sarvam_api_base() -> String {
    "https://api.sarvam.ai".to_string()
}

fn default_sarvam_language() -> String {
    "hi".to_string()
}

fn default_sarvam_voice() -> String {
    "female".to_string()
}
