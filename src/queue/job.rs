use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{ClassifiedError, ErrorCategory};

pub(crate) type JobFuture<T> = Pin<Box<dyn Future<Output = Result<T, ClassifiedError>> + Send>>;
pub(crate) type JobTask<T> = Box<dyn FnOnce() -> JobFuture<T> + Send>;

/// A unit of queued work. The task is not started until the worker takes it.
pub(crate) struct Job<T> {
    pub id: Uuid,
    pub label: String,
    pub submitted_at: DateTime<Utc>,
    pub task: JobTask<T>,
    pub reply: oneshot::Sender<Result<T, ClassifiedError>>,
}

impl<T: 'static> Job<T> {
    pub fn new<F, Fut>(label: String, task: F) -> (Self, JobHandle<T>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job = Self {
            id: Uuid::new_v4(),
            label,
            submitted_at: Utc::now(),
            task: Box::new(move || Box::pin(task()) as JobFuture<T>),
            reply,
        };
        let handle = JobHandle {
            id: job.id,
            label: job.label.clone(),
            submitted_at: job.submitted_at,
            rx,
        };
        (job, handle)
    }
}

/// Caller's side of a submitted job; resolves once the worker settles it.
#[derive(Debug)]
pub struct JobHandle<T> {
    id: Uuid,
    label: String,
    submitted_at: DateTime<Utc>,
    rx: oneshot::Receiver<Result<T, ClassifiedError>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Waits for the job. A job whose worker went away without answering
    /// settles as an `Unknown` failure instead of hanging.
    pub async fn outcome(self) -> Result<T, ClassifiedError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ClassifiedError::new(
                ErrorCategory::Unknown,
                false,
                None,
                "job was dropped before it completed",
                serde_json::Value::Null,
            )),
        }
    }
}

/// The job the worker is executing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningJob {
    pub id: Uuid,
    pub label: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Submitted and not yet started.
    pub pending: usize,
    pub processing: bool,
    pub current: Option<RunningJob>,
}

/// Structured record logged when a job settles.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub label: String,
    pub category: Option<ErrorCategory>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub wait_ms: i64,
    pub duration_ms: i64,
}

impl JobReport {
    pub fn new<T>(running: &RunningJob, submitted_at: DateTime<Utc>, result: &Result<T, ClassifiedError>) -> Self {
        let now = Utc::now();
        Self {
            job_id: running.id,
            label: running.label.clone(),
            category: result.as_ref().err().map(ClassifiedError::category),
            submitted_at,
            started_at: running.started_at,
            completed_at: now,
            wait_ms: (running.started_at - submitted_at).num_milliseconds(),
            duration_ms: (now - running.started_at).num_milliseconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_mirrors_job_identity() {
        let (job, handle) = Job::new("a.mp3".into(), || async { Ok::<_, ClassifiedError>(1) });
        assert_eq!(handle.id(), job.id);
        assert_eq!(handle.label(), "a.mp3");
        assert_eq!(handle.submitted_at(), job.submitted_at);

        let result = (job.task)().await;
        job.reply.send(result).unwrap();
        assert_eq!(handle.outcome().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_job_settles_as_unknown() {
        let (job, handle) = Job::new("a.mp3".into(), || async { Ok::<_, ClassifiedError>(()) });
        drop(job);

        let err = handle.outcome().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(err.message().contains("dropped"));
    }

    #[test]
    fn report_records_category_of_failures() {
        let running = RunningJob {
            id: Uuid::new_v4(),
            label: "b.wav".into(),
            started_at: Utc::now(),
        };
        let failed: Result<(), _> = Err(ClassifiedError::validation("bad"));
        let report = JobReport::new(&running, running.started_at, &failed);
        assert_eq!(report.category, Some(ErrorCategory::ClientFailure));
        assert_eq!(report.wait_ms, 0);
        assert!(report.duration_ms >= 0);

        assert_eq!(report.job_id, running.id);
        assert_eq!(report.submitted_at, running.started_at);
        assert!(report.completed_at >= report.started_at);

        let ok: Result<(), ClassifiedError> = Ok(());
        assert_eq!(JobReport::new(&running, running.started_at, &ok).category, None);
    }

    #[test]
    fn running_job_serializes_its_id() {
        let running = RunningJob {
            id: Uuid::new_v4(),
            label: "c.mp4".into(),
            started_at: Utc::now(),
        };
        let status = QueueStatus {
            pending: 2,
            processing: true,
            current: Some(running.clone()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["current"]["id"], running.id.to_string());
        assert_eq!(json["current"]["label"], "c.mp4");
        assert_eq!(json["pending"], 2);
    }

    #[test]
    fn status_serializes_for_display() {
        let status = QueueStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["pending"], 0);
        assert_eq!(json["processing"], false);
        assert!(json["current"].is_null());
    }
}
