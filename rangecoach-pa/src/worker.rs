//! Bounded worker pool with a message-passing job queue
//!
//! Trigger receipt enqueues a job; a fixed set of worker tasks drains the
//! shared queue and runs each job to completion or failure. No scheduler
//! resumes a job; a failed job has already marked its session `failed`.

use rangecoach_common::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::services::{PerViewPipeline, SessionOrchestrator, SessionTrigger, ViewTrigger};

/// Unit of work dispatched from trigger receipt to a worker
#[derive(Debug, Clone)]
pub enum Job {
    /// Batch mode: drive a whole session
    Session(SessionTrigger),
    /// Incremental mode: process one view and merge it
    View(ViewTrigger),
}

/// Sending half of the bounded job queue
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Create the queue, returning the receiving half for the worker pool
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a job, waiting for queue space under backpressure
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| Error::Internal("job queue closed".to_string()))
    }
}

/// Shared dependencies handed to every worker
#[derive(Clone)]
pub struct WorkerContext {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub per_view: Arc<PerViewPipeline>,
}

/// Spawn the worker pool draining `rx`; workers stop when the queue closes
pub fn spawn_workers(
    count: usize,
    rx: mpsc::Receiver<Job>,
    ctx: WorkerContext,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..count.max(1))
        .map(|worker_id| {
            let rx = Arc::clone(&rx);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tracing::debug!(worker_id, "Worker started");
                loop {
                    // Hold the lock only for the dequeue, not the job
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };

                    match job {
                        Job::Session(trigger) => {
                            if let Err(e) = ctx.orchestrator.process_session(&trigger).await {
                                tracing::error!(
                                    worker_id,
                                    subject_id = %trigger.subject_id,
                                    session_id = %trigger.session_id,
                                    error = %e,
                                    "Session job failed before outcome could be recorded"
                                );
                            }
                        }
                        Job::View(trigger) => {
                            if let Err(e) = ctx.per_view.process_view(&trigger).await {
                                tracing::error!(
                                    worker_id,
                                    subject_id = %trigger.subject_id,
                                    session_id = %trigger.session_id,
                                    error = %e,
                                    "View job failed before outcome could be recorded"
                                );
                            }
                        }
                    }
                }
                tracing::debug!(worker_id, "Worker stopped: queue closed");
            })
        })
        .collect()
}
