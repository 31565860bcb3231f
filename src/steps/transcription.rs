use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};
use tracing::info;

use super::media::MediaUpload;
use crate::config::VidscribeConfig;
use crate::error::ClassifiedError;
use crate::openai::{MediaApi, TranscriptSegment, TranscriptionRequest};
use crate::retry::RetryLayers;

/// Output of the speech-to-text stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub duration_seconds: f64,
}

/// Speech-to-text call guarded by validation, a deadline and retries.
#[derive(Debug, Clone)]
pub struct TranscriptionStep {
    pub model: String,
    pub language: String,
    pub timeout: Duration,
    pub retry: RetryLayers,
}

impl TranscriptionStep {
    pub fn from_config(config: &VidscribeConfig) -> Self {
        Self {
            model: config.transcription_model.clone(),
            language: config.language.clone(),
            timeout: config.timeouts.transcription(),
            retry: RetryLayers::from_settings(&config.retry),
        }
    }

    pub async fn run<A: MediaApi>(
        &self,
        api: &A,
        upload: &MediaUpload,
    ) -> Result<TranscriptionResult, ClassifiedError> {
        // Rejected uploads never reach the network or the retry budget.
        upload.validate()?;

        let request = TranscriptionRequest {
            file_name: upload.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            bytes: upload.bytes.clone(),
            model: self.model.clone(),
            language: self.language.clone(),
        };

        let started = Instant::now();
        info!(file = %upload.file_name, size_mb = upload.size_mb(), "transcribing");

        let deadline = self.timeout;
        let request = &request;
        let response = self
            .retry
            .execute("transcription", move || async move {
                match timeout(deadline, api.transcribe(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ClassifiedError::timeout(format!(
                        "Transcription request timed out after {}s. The file may be too large.",
                        deadline.as_secs()
                    ))),
                }
            })
            .await?;

        info!(
            file = %upload.file_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            segments = response.segments.len(),
            "transcription completed"
        );

        Ok(TranscriptionResult {
            text: response.text.trim().to_string(),
            segments: response.segments,
            duration_seconds: response.duration,
        })
    }
}
