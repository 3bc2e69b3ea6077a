//! Turn routing: forwards normalized inputs to the external conversation
//! processor and always hands back a terminal [`Turn`].
//!
//! The router never surfaces a transport error to its caller. Every outcome
//! is a `Turn`: either answered, or carrying an error classification the
//! caller can speak a fallback for. Retries cover only failures that a retry
//! can plausibly fix (connect errors, timeouts, 5xx); processor rejections
//! (4xx) are terminal on the first attempt.

use serde::Deserialize;
use std::time::{Duration, Instant};
use switchyard_types::{Turn, TurnErrorKind, TurnInput, TurnOwner};

mod config;

pub use config::ProcessorConfig;

/// Router construction failures.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("processor endpoint is empty")]
    MissingEndpoint,
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Builds the request body sent to the processor for one turn.
///
/// The input arrives under a `text` or `audio` key and the owner under
/// `session_id` or `call_id`, which is the contract the processor was built
/// against.
fn request_body(
    correlation_id: &uuid::Uuid,
    owner: &TurnOwner,
    input: &TurnInput,
) -> serde_json::Value {
    let (input_key, content) = match input {
        TurnInput::Text(text) => ("text", text),
        TurnInput::Audio(audio) => ("audio", audio),
    };
    let (owner_key, owner_id) = match owner {
        TurnOwner::Session(id) => ("session_id", id),
        TurnOwner::Call(id) => ("call_id", id),
    };
    let mut body = serde_json::Map::new();
    body.insert(
        input_key.to_string(),
        serde_json::Value::String(content.clone()),
    );
    body.insert(
        "correlation_id".to_string(),
        serde_json::Value::String(correlation_id.to_string()),
    );
    body.insert(
        owner_key.to_string(),
        serde_json::Value::String(owner_id.to_string()),
    );
    serde_json::Value::Object(body)
}

/// The processor's answer. `response_text` and `output` are accepted as
/// aliases because processor builds have used both field names.
#[derive(Debug, Deserialize)]
struct ProcessorReply {
    #[serde(alias = "response_text", alias = "output")]
    response: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    media_url: Option<String>,
}

/// Per-attempt failure, classified for the retry decision.
enum AttemptError {
    /// Connect failure or timeout; retryable.
    Transport { timeout: bool, detail: String },
    /// Processor-side failure (5xx); retryable.
    Server(u16),
    /// Processor rejected the input (4xx); never retried.
    Rejected(u16),
    /// 2xx with a body the reply schema does not fit; never retried.
    BadReply(String),
}

/// Forwards turns to the configured processor endpoint.
pub struct TurnRouter {
    config: ProcessorConfig,
    client: reqwest::Client,
}

impl TurnRouter {
    pub fn new(config: ProcessorConfig) -> Result<Self, RouterError> {
        if config.endpoint.is_empty() {
            return Err(RouterError::MissingEndpoint);
        }
        // Per-attempt deadlines are applied per request; the client itself
        // carries no global timeout.
        let client = reqwest::Client::builder().build()?;
        Ok(Self { config, client })
    }

    /// The text spoken or sent when a turn ends in an error.
    pub fn fallback_text(&self) -> &str {
        &self.config.fallback_text
    }

    /// The text spoken when an inbound call is answered.
    pub fn greeting(&self) -> &str {
        &self.config.greeting
    }

    /// Routes one input to the processor and returns the terminal turn.
    pub async fn route(&self, input: TurnInput, owner: TurnOwner) -> Turn {
        self.route_with_id(switchyard_types::new_correlation_id(), input, owner)
            .await
    }

    /// Routes one input under a caller-supplied correlation id, so an early
    /// acknowledgement can carry the same id as the eventual response.
    pub async fn route_with_id(
        &self,
        correlation_id: uuid::Uuid,
        input: TurnInput,
        owner: TurnOwner,
    ) -> Turn {
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.timeout_ms);

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(
                    self.config.retry_backoff_ms * attempt as u64,
                ))
                .await;
            }

            match self.attempt(&correlation_id, &owner, &input, deadline).await {
                Ok(reply) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        correlation_id = %correlation_id,
                        owner_id = %owner.id(),
                        latency_ms,
                        attempt,
                        "turn answered"
                    );
                    return Turn {
                        correlation_id,
                        owner,
                        input,
                        output: Some(reply.response),
                        intent: reply.intent,
                        confidence: reply.confidence,
                        media_url: reply.media_url,
                        latency_ms,
                        error: None,
                        created_at: switchyard_types::now(),
                    };
                }
                Err(err) => {
                    let retryable = matches!(
                        err,
                        AttemptError::Transport { .. } | AttemptError::Server(_)
                    );
                    match &err {
                        AttemptError::Transport { timeout, detail } => tracing::warn!(
                            correlation_id = %correlation_id,
                            attempt,
                            timeout,
                            detail = %detail,
                            "processor attempt failed"
                        ),
                        AttemptError::Server(status) => tracing::warn!(
                            correlation_id = %correlation_id,
                            attempt,
                            status,
                            "processor returned server error"
                        ),
                        AttemptError::Rejected(status) => tracing::warn!(
                            correlation_id = %correlation_id,
                            attempt,
                            status,
                            "processor rejected input"
                        ),
                        AttemptError::BadReply(detail) => tracing::warn!(
                            correlation_id = %correlation_id,
                            attempt,
                            detail = %detail,
                            "processor reply unparseable"
                        ),
                    }
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let kind = match last_error {
            Some(AttemptError::Transport { timeout: true, .. }) => TurnErrorKind::Timeout,
            Some(AttemptError::Rejected(_)) => TurnErrorKind::Validation,
            _ => TurnErrorKind::Processor,
        };
        tracing::error!(
            correlation_id = %correlation_id,
            owner_id = %owner.id(),
            latency_ms,
            kind = kind.label(),
            "turn failed"
        );
        Turn {
            correlation_id,
            owner,
            input,
            output: None,
            intent: None,
            confidence: None,
            media_url: None,
            latency_ms,
            error: Some(kind),
            created_at: switchyard_types::now(),
        }
    }

    async fn attempt(
        &self,
        correlation_id: &uuid::Uuid,
        owner: &TurnOwner,
        input: &TurnInput,
        deadline: Duration,
    ) -> Result<ProcessorReply, AttemptError> {
        let body = request_body(correlation_id, owner, input);

        let resp = self
            .client
            .post(&self.config.endpoint)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Transport {
                timeout: e.is_timeout(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(AttemptError::Server(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(AttemptError::Rejected(status.as_u16()));
        }

        resp.json::<ProcessorReply>()
            .await
            .map_err(|e| AttemptError::BadReply(e.to_string()))
    }
}
