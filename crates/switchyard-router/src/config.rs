//! Processor endpoint configuration.

use serde::Deserialize;

/// The `[processor]` section of the gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Full URL the processor accepts turn requests on.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-attempt deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt; only transport failures and 5xx
    /// are retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between attempts; multiplied by the attempt number.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Spoken or sent to the end user when a turn fails.
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
    /// Spoken when an inbound call is answered, before the first turn.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fallback_text: default_fallback_text(),
            greeting: default_greeting(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8100/process".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_fallback_text() -> String {
    "I'm sorry, I'm having trouble right now. Please try again in a moment.".to_string()
}

fn default_greeting() -> String {
    "Hello! How can I help you today?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: ProcessorConfig =
            serde_json::from_value(serde_json::json!({"endpoint": "http://proc/turn"}))
                .expect("config parses");
        assert_eq!(cfg.endpoint, "http://proc/turn");
        assert_eq!(cfg.timeout_ms, 5_000);
        assert_eq!(cfg.max_retries, 2);
    }
}
