use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::VidscribeConfig;
use crate::error::{ClassifiedError, ErrorCategory};
use crate::openai::{MediaApi, TranscriptSegment};
use crate::steps::{AnalysisStep, HighlightSegment, MediaUpload, TranscriptionStep};

/// Everything one job produces: the transcript plus the highlight analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub file_name: String,
    pub transcript: String,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub duration_seconds: f64,
    pub summary: String,
    pub highlights: Vec<String>,
    pub segments: Vec<HighlightSegment>,
    pub processing_ms: u64,
}

/// Drives one upload through transcription and then analysis.
pub struct PipelineOrchestrator<A> {
    api: A,
    transcription: TranscriptionStep,
    analysis: AnalysisStep,
}

impl<A: MediaApi> PipelineOrchestrator<A> {
    pub fn new(api: A, config: &VidscribeConfig) -> Self {
        Self::with_steps(
            api,
            TranscriptionStep::from_config(config),
            AnalysisStep::from_config(config),
        )
    }

    pub fn with_steps(api: A, transcription: TranscriptionStep, analysis: AnalysisStep) -> Self {
        Self {
            api,
            transcription,
            analysis,
        }
    }

    /// Failures from either step are returned as they came out of the retry
    /// layer, classification intact.
    pub async fn run(&self, upload: &MediaUpload) -> Result<PipelineResult, ClassifiedError> {
        let started = Instant::now();
        info!(file = %upload.file_name, "starting analysis pipeline");

        let result = self.run_steps(upload).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut result) => {
                result.processing_ms = elapsed_ms;
                info!(file = %upload.file_name, elapsed_ms, "pipeline finished");
                Ok(result)
            }
            Err(err) => {
                log_failure(&upload.file_name, elapsed_ms, &err);
                Err(err)
            }
        }
    }

    async fn run_steps(&self, upload: &MediaUpload) -> Result<PipelineResult, ClassifiedError> {
        let transcription = self.transcription.run(&self.api, upload).await?;

        if transcription.text.is_empty() {
            return Err(ClassifiedError::validation(
                "Transcription returned empty text. The audio may be too quiet or unclear.",
            ));
        }

        let analysis = self.analysis.run(&self.api, &transcription).await?;

        Ok(PipelineResult {
            file_name: upload.file_name.clone(),
            transcript: transcription.text,
            transcript_segments: transcription.segments,
            duration_seconds: transcription.duration_seconds,
            summary: analysis.summary,
            highlights: analysis.highlights,
            segments: analysis.segments,
            processing_ms: 0,
        })
    }
}

fn log_failure(file: &str, elapsed_ms: u64, err: &ClassifiedError) {
    match err.category() {
        ErrorCategory::BillingQuota => {
            warn!(file, elapsed_ms, status = ?err.http_status(), "billing quota exceeded: {}", err.message());
        }
        ErrorCategory::UsageLimit => {
            warn!(
                file,
                elapsed_ms,
                retry_after_secs = ?err.retry_after_secs(),
                "usage limit hit: {}",
                err.message()
            );
        }
        category => {
            error!(file, elapsed_ms, %category, status = err.status_code(), "pipeline failed: {}", err.message());
        }
    }
}
