use std::sync::Arc;

use tracing::{info, warn};

use crate::config::VidscribeConfig;
use crate::error::ClassifiedError;
use crate::openai::MediaApi;
use crate::orchestrator::{PipelineOrchestrator, PipelineResult};
use crate::queue::{JobHandle, JobQueue, QueueStatus};
use crate::steps::MediaUpload;

/// Public entry point: validates uploads and feeds them to the shared
/// single-concurrency queue.
pub struct MediaAnalysisService<A> {
    queue: JobQueue<PipelineResult>,
    orchestrator: Arc<PipelineOrchestrator<A>>,
    configured: bool,
}

impl<A: MediaApi + 'static> MediaAnalysisService<A> {
    /// Starts the queue worker. Must be called inside a tokio runtime.
    pub fn start(api: A, config: &VidscribeConfig) -> Self {
        Self::with_orchestrator(PipelineOrchestrator::new(api, config), config.is_configured())
    }

    pub fn with_orchestrator(orchestrator: PipelineOrchestrator<A>, configured: bool) -> Self {
        if !configured {
            warn!("OPENAI_API_KEY is not set; media analysis is disabled");
        }
        Self {
            queue: JobQueue::start(),
            orchestrator: Arc::new(orchestrator),
            configured,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Enqueues one upload and returns immediately. Unconfigured services and
    /// invalid uploads are rejected here, before the queue is touched.
    pub fn analyze(&self, upload: MediaUpload) -> Result<JobHandle<PipelineResult>, ClassifiedError> {
        if !self.configured {
            return Err(ClassifiedError::validation(
                "Media analysis is not configured. Set OPENAI_API_KEY.",
            ));
        }
        upload.validate()?;

        let orchestrator = Arc::clone(&self.orchestrator);
        let label = upload.file_name.clone();
        let handle = self
            .queue
            .submit(label, move || async move { orchestrator.run(&upload).await });

        info!(job_id = %handle.id(), file = handle.label(), "upload accepted");
        Ok(handle)
    }

    pub fn status(&self) -> QueueStatus {
        self.queue.status()
    }
}
