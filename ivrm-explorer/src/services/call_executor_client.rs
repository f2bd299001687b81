//! Call executor client
//!
//! Places one outbound call, optionally pressing digits with per-digit
//! delays, and returns the identifier of the recording it produced.
//!
//! Wire format:
//! `POST {base_url}/caller/` `{"number": "18005551234", "dtmf": [[1, 5], ["#", 5]]}`
//! → `{"recording": "<id>", "duration": 42.0}`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::DialPayload;

const USER_AGENT: &str = concat!("ivrm-explorer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum CallExecutorError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Call executor timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Call executor returned no recording")]
    MissingRecording,
}

/// Result of one placed call
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub recording_id: String,
    pub duration_secs: Option<f64>,
}

/// Anything that can place a call
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn place_call(
        &self,
        dial_string: &str,
        payload: &DialPayload,
    ) -> Result<CallOutcome, CallExecutorError>;
}

#[derive(Debug, Deserialize)]
struct CallerResponse {
    recording: Option<String>,
    duration: Option<f64>,
}

/// HTTP implementation talking to the caller service
pub struct HttpCallExecutor {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpCallExecutor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CallExecutorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CallExecutorError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Request body: numeric digits go out as integers, `*` and `#` as strings
pub fn build_call_request(dial_string: &str, payload: &DialPayload) -> Value {
    let dtmf: Vec<Value> = payload
        .steps()
        .iter()
        .map(|step| {
            let digit = match step.digit.numeric() {
                Some(n) => json!(n),
                None => json!(step.digit.to_string()),
            };
            json!([digit, step.delay])
        })
        .collect();

    json!({ "number": dial_string, "dtmf": dtmf })
}

#[async_trait]
impl CallExecutor for HttpCallExecutor {
    async fn place_call(
        &self,
        dial_string: &str,
        payload: &DialPayload,
    ) -> Result<CallOutcome, CallExecutorError> {
        let url = format!("{}/caller/", self.base_url);
        let body = build_call_request(dial_string, payload);

        tracing::debug!(
            dial_string,
            presses = payload.steps().len(),
            "Placing call"
        );

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallExecutorError::Timeout
                } else {
                    CallExecutorError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CallExecutorError::ApiError(status.as_u16(), error_text));
        }

        let parsed: CallerResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                CallExecutorError::Timeout
            } else {
                CallExecutorError::ParseError(e.to_string())
            }
        })?;

        match parsed.recording {
            Some(recording_id) if !recording_id.trim().is_empty() => {
                tracing::info!(dial_string, recording_id = %recording_id, "Call completed");
                Ok(CallOutcome {
                    recording_id,
                    duration_secs: parsed.duration,
                })
            }
            _ => Err(CallExecutorError::MissingRecording),
        }
    }
}
