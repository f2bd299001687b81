//! In-process stand-ins for the call executor and analysis services

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ivrm_explorer::models::{DialPayload, OptionSource};
use ivrm_explorer::services::{
    AnalysisError, CallExecutor, CallExecutorError, CallOutcome, MenuAnalyzer,
};

/// Records every call and drops a fake recording into the source directory
pub struct FakeExecutor {
    source_dir: PathBuf,
    counter: AtomicUsize,
    pub calls: Mutex<Vec<(String, DialPayload)>>,
    /// When set, every call fails with this message
    pub fail_with: Mutex<Option<String>>,
}

impl FakeExecutor {
    pub fn new(source_dir: PathBuf) -> Self {
        Self {
            source_dir,
            counter: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<(String, DialPayload)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next_calls(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl CallExecutor for FakeExecutor {
    async fn place_call(
        &self,
        dial_string: &str,
        payload: &DialPayload,
    ) -> Result<CallOutcome, CallExecutorError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(CallExecutorError::ApiError(500, message));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let recording_id = format!("rec-{}.wav", n);
        std::fs::write(self.source_dir.join(&recording_id), b"RIFF fake audio")
            .map_err(|e| CallExecutorError::NetworkError(e.to_string()))?;

        self.calls
            .lock()
            .unwrap()
            .push((dial_string.to_string(), payload.clone()));

        Ok(CallOutcome {
            recording_id,
            duration_secs: Some(12.5),
        })
    }
}

/// Scripted analysis service
///
/// Transcripts are handed out in order; option extraction answers by exact
/// text match and returns `[]` for anything unscripted.
#[derive(Default)]
pub struct FakeAnalyzer {
    transcripts: Mutex<VecDeque<String>>,
    options: Mutex<HashMap<String, String>>,
    summary: Mutex<String>,
    pub extract_calls: Mutex<Vec<(String, String, OptionSource)>>,
    pub summarize_calls: AtomicUsize,
    pub fail_transcription: Mutex<bool>,
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_transcript(&self, text: &str) {
        self.transcripts.lock().unwrap().push_back(text.to_string());
    }

    pub fn set_options(&self, text: &str, raw: &str) {
        self.options
            .lock()
            .unwrap()
            .insert(text.to_string(), raw.to_string());
    }

    pub fn set_summary(&self, text: &str) {
        *self.summary.lock().unwrap() = text.to_string();
    }

    pub fn extract_calls(&self) -> Vec<(String, String, OptionSource)> {
        self.extract_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MenuAnalyzer for FakeAnalyzer {
    async fn transcribe(
        &self,
        _recording_id: &str,
        audio: Vec<u8>,
    ) -> Result<String, AnalysisError> {
        if *self.fail_transcription.lock().unwrap() {
            return Err(AnalysisError::ApiError(503, "transcriber offline".to_string()));
        }
        assert!(!audio.is_empty(), "staged recording should carry audio");
        Ok(self.transcripts.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn extract_options(
        &self,
        text: &str,
        context: &str,
        source: OptionSource,
    ) -> Result<String, AnalysisError> {
        self.extract_calls
            .lock()
            .unwrap()
            .push((text.to_string(), context.to_string(), source));
        Ok(self
            .options
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| "[]".to_string()))
    }

    async fn summarize(
        &self,
        _dial_string: &str,
        _transcripts: &[String],
    ) -> Result<String, AnalysisError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summary.lock().unwrap().clone())
    }
}
