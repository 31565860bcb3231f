//! Fila FIFO de concorrência única.
//!
//! Um único worker consome os jobs na ordem de submissão e só começa o
//! próximo depois que o atual termina, com sucesso ou falha. Cada job roda
//! em sua própria task, então um panic vira uma falha `Unknown` e a fila
//! continua.

mod job;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ClassifiedError, ErrorCategory};

use job::Job;
pub use job::{JobHandle, JobReport, QueueStatus, RunningJob};

#[derive(Debug, Default)]
struct QueueState {
    pending: AtomicUsize,
    current: Mutex<Option<RunningJob>>,
}

impl QueueState {
    fn set_current(&self, running: Option<RunningJob>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = running;
    }

    fn current(&self) -> Option<RunningJob> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to the queue. Clones share the same worker; the worker drains the
/// remaining jobs and exits once every clone is dropped.
pub struct JobQueue<T> {
    tx: mpsc::UnboundedSender<Job<T>>,
    state: Arc<QueueState>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> JobQueue<T> {
    /// Spawns the worker. Must be called inside a tokio runtime.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(run_worker(rx, Arc::clone(&state)));
        Self { tx, state }
    }

    /// Enqueues `task` without waiting for it. The task is only invoked once
    /// every job submitted before it has settled.
    pub fn submit<F, Fut>(&self, label: impl Into<String>, task: F) -> JobHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    {
        let (job, handle) = Job::new(label.into(), task);
        let id = job.id;

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            // The dropped job's reply sender settles the handle.
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(job_id = %id, "job queue worker is gone; job dropped");
            return handle;
        }

        info!(
            job_id = %id,
            file = handle.label(),
            pending = self.state.pending.load(Ordering::SeqCst),
            "job enqueued"
        );
        handle
    }

    pub fn status(&self) -> QueueStatus {
        let current = self.state.current();
        QueueStatus {
            pending: self.state.pending.load(Ordering::SeqCst),
            processing: current.is_some(),
            current,
        }
    }
}

async fn run_worker<T: Send + 'static>(mut rx: mpsc::UnboundedReceiver<Job<T>>, state: Arc<QueueState>) {
    while let Some(job) = rx.recv().await {
        state.pending.fetch_sub(1, Ordering::SeqCst);

        let Job {
            id,
            label,
            submitted_at,
            task,
            reply,
        } = job;
        let running = RunningJob {
            id,
            label,
            started_at: Utc::now(),
        };
        state.set_current(Some(running.clone()));
        info!(
            job_id = %id,
            file = %running.label,
            pending = state.pending.load(Ordering::SeqCst),
            "job started"
        );

        let result = match tokio::spawn(async move { task().await }).await {
            Ok(result) => result,
            Err(join_err) => Err(ClassifiedError::new(
                ErrorCategory::Unknown,
                false,
                None,
                format!("job panicked: {join_err}"),
                Value::Null,
            )),
        };

        let report = JobReport::new(&running, submitted_at, &result);
        match &result {
            Ok(_) => info!(
                job_id = %report.job_id,
                file = %report.label,
                submitted_at = %report.submitted_at,
                started_at = %report.started_at,
                completed_at = %report.completed_at,
                wait_ms = report.wait_ms,
                duration_ms = report.duration_ms,
                "job finished"
            ),
            Err(err) => warn!(
                job_id = %report.job_id,
                file = %report.label,
                category = ?report.category,
                submitted_at = %report.submitted_at,
                started_at = %report.started_at,
                completed_at = %report.completed_at,
                wait_ms = report.wait_ms,
                duration_ms = report.duration_ms,
                "job failed: {}",
                err.message()
            ),
        }

        state.set_current(None);
        if reply.send(result).is_err() {
            debug!(job_id = %id, "job handle dropped before the outcome was read");
        }
    }

    debug!("job queue closed; worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn runs_jobs_in_order_one_at_a_time() {
        let queue = JobQueue::<usize>::start();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = [50u64, 10, 30, 0, 20]
            .into_iter()
            .enumerate()
            .map(|(i, ms)| {
                let (active, peak, order) = (active.clone(), peak.clone(), order.clone());
                queue.submit(format!("job-{i}"), move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    order.lock().unwrap().push(i);
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.outcome().await.unwrap(), i);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_does_not_block_the_next_job() {
        let queue = JobQueue::<&'static str>::start();
        let first = queue.submit("bad.mp3", || async {
            Err::<&'static str, _>(ClassifiedError::validation("nope"))
        });
        let second = queue.submit("good.mp3", || async { Ok("done") });

        let err = first.outcome().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ClientFailure);
        assert_eq!(second.outcome().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn panicking_job_is_isolated() {
        let queue = JobQueue::<u8>::start();
        let boom = queue.submit("boom.mp4", || async {
            if u8::MAX > 0 {
                panic!("decoder exploded");
            }
            Ok(0)
        });
        let next = queue.submit("fine.mp4", || async { Ok(7) });

        let err = boom.outcome().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(err.message().starts_with("job panicked"));
        assert_eq!(next.outcome().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn status_tracks_pending_and_current() {
        let queue = JobQueue::<()>::start();
        assert_eq!(queue.status(), QueueStatus::default());

        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let first = queue.submit("first.wav", move || async move {
            let _ = gate_rx.await;
            Ok(())
        });
        let second = queue.submit("second.wav", || async { Ok(()) });

        while queue.status().current.is_none() {
            tokio::task::yield_now().await;
        }
        let status = queue.status();
        assert!(status.processing);
        assert_eq!(status.pending, 1);
        let current = status.current.unwrap();
        assert_eq!(current.id, first.id());
        assert_eq!(current.label, "first.wav");

        gate_tx.send(()).unwrap();
        first.outcome().await.unwrap();
        second.outcome().await.unwrap();
        assert_eq!(queue.status(), QueueStatus::default());
    }

    #[tokio::test]
    async fn dropping_the_queue_still_drains_submitted_jobs() {
        let queue = JobQueue::<u32>::start();
        let a = queue.submit("a.mp3", || async { Ok(1u32) });
        let b = queue.clone().submit("b.mp3", || async { Ok(2u32) });
        drop(queue);

        assert_eq!(a.outcome().await.unwrap(), 1);
        assert_eq!(b.outcome().await.unwrap(), 2);
    }
}
