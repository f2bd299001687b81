//! Menu analysis client
//!
//! Three operations against the analysis service:
//! - `POST /transcribe?recording=<id>` (audio bytes) → `{"text": "..."}`
//! - `POST /extract-options` `{text, context, source}` → raw model output
//! - `POST /summarize` `{dial_string, transcripts}` → `{"summary": "..."}`
//!
//! Option extraction returns the body untouched; turning it into options is
//! the exploration engine's job since the service output is not trusted to
//! be well-formed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::OptionSource;

const USER_AGENT: &str = concat!("ivrm-explorer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Analysis service timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalysisError::Timeout
        } else if e.is_decode() {
            AnalysisError::ParseError(e.to_string())
        } else {
            AnalysisError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
pub trait MenuAnalyzer: Send + Sync {
    /// Speech to text for one recording
    async fn transcribe(&self, recording_id: &str, audio: Vec<u8>) -> Result<String, AnalysisError>;

    /// Raw option-extraction output for a transcript or summary
    ///
    /// `context` describes where in the menu the text was heard, e.g.
    /// `"1->2"` or `"no previous keys pressed"`.
    async fn extract_options(
        &self,
        text: &str,
        context: &str,
        source: OptionSource,
    ) -> Result<String, AnalysisError>;

    /// Aggregate every transcript of a target into one description
    async fn summarize(
        &self,
        dial_string: &str,
        transcripts: &[String],
    ) -> Result<String, AnalysisError>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    context: &'a str,
    source: &'a str,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    dial_string: &'a str,
    transcripts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: String,
}

pub struct HttpMenuAnalyzer {
    http_client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpMenuAnalyzer {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        api_token: Option<String>,
    ) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http_client.post(format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AnalysisError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ApiError(status.as_u16(), error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl MenuAnalyzer for HttpMenuAnalyzer {
    async fn transcribe(
        &self,
        recording_id: &str,
        audio: Vec<u8>,
    ) -> Result<String, AnalysisError> {
        let request = self
            .post("/transcribe")
            .query(&[("recording", recording_id)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio);

        let parsed: TranscribeResponse = self.send(request).await?.json().await?;
        tracing::debug!(recording_id, chars = parsed.text.len(), "Transcription received");
        Ok(parsed.text)
    }

    async fn extract_options(
        &self,
        text: &str,
        context: &str,
        source: OptionSource,
    ) -> Result<String, AnalysisError> {
        let request = self.post("/extract-options").json(&ExtractRequest {
            text,
            context,
            source: source.as_str(),
        });

        Ok(self.send(request).await?.text().await?)
    }

    async fn summarize(
        &self,
        dial_string: &str,
        transcripts: &[String],
    ) -> Result<String, AnalysisError> {
        let request = self.post("/summarize").json(&SummarizeRequest {
            dial_string,
            transcripts,
        });

        let parsed: SummarizeResponse = self.send(request).await?.json().await?;
        Ok(parsed.summary)
    }
}
