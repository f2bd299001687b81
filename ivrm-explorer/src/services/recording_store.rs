//! Recording staging
//!
//! The call executor writes recordings into `source_dir`, named by
//! recording id. Before transcription a recording is copied into
//! `serve_dir` (where the analysis side and operators read it from).

use ivrm_common::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RecordingStore {
    source_dir: PathBuf,
    serve_dir: PathBuf,
}

impl RecordingStore {
    pub fn new(source_dir: PathBuf, serve_dir: PathBuf) -> Self {
        Self {
            source_dir,
            serve_dir,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn serve_dir(&self) -> &Path {
        &self.serve_dir
    }

    /// Recording ids are plain file names; anything that could escape the
    /// recordings directories is rejected
    fn file_name(recording_id: &str) -> Result<&str> {
        let trimmed = recording_id.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return Err(Error::InvalidInput(format!(
                "invalid recording id '{}'",
                recording_id
            )));
        }
        Ok(trimmed)
    }

    /// Copy a recording to the serving directory and return its bytes
    ///
    /// Already-staged recordings are read from the serving directory, so a
    /// retried transcription does not need the source file any more.
    pub async fn stage(&self, recording_id: &str) -> Result<Vec<u8>> {
        let name = Self::file_name(recording_id)?;
        let served = self.serve_dir.join(name);

        if tokio::fs::try_exists(&served).await? {
            return Ok(tokio::fs::read(&served).await?);
        }

        let source = self.source_dir.join(name);
        if !tokio::fs::try_exists(&source).await? {
            return Err(Error::NotFound(format!("recording {}", source.display())));
        }

        tokio::fs::create_dir_all(&self.serve_dir).await?;
        tokio::fs::copy(&source, &served).await?;
        tracing::debug!(
            recording_id = name,
            to = %served.display(),
            "Recording staged"
        );

        Ok(tokio::fs::read(&served).await?)
    }
}
