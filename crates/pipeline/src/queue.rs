use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::orchestrator::Orchestrator;

/// One queued execution request for the orchestrator.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: String,
    pub storage_key: String,
}

/// Handle kept so workers are cancelled when the queue shuts down.
/// Dropping a `JoinHandle` detaches the task, it does not abort it.
struct WorkerHandle {
    abort_handle: tokio::task::AbortHandle,
}

/// At-least-once in-process task queue feeding a fixed worker pool.
///
/// Each delivery invokes one orchestrator run; jobs run concurrently
/// across workers with no ordering guarantee, and each job's pipeline is
/// strictly sequential inside its worker.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobRequest>,
    workers: Arc<Vec<WorkerHandle>>,
}

impl JobQueue {
    /// Spawns `worker_count` workers draining a bounded channel of
    /// `queue_depth` requests.
    pub fn start(orchestrator: Arc<Orchestrator>, worker_count: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<JobRequest>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let orchestrator = Arc::clone(&orchestrator);
            let handle = tokio::spawn(async move {
                debug!(worker_id, "pipeline worker started");
                loop {
                    // Lock only to receive so a running pipeline never
                    // blocks the other workers' dequeues.
                    let request = { rx.lock().await.recv().await };
                    match request {
                        Some(request) => orchestrator.run(request).await,
                        None => break,
                    }
                }
                debug!(worker_id, "pipeline worker exiting");
            });
            workers.push(WorkerHandle {
                abort_handle: handle.abort_handle(),
            });
        }

        info!(worker_count, queue_depth, "job queue started");

        Self {
            tx,
            workers: Arc::new(workers),
        }
    }

    /// Hands off one execution request. Backpressures when the queue is
    /// full; errors only if the worker pool is gone.
    pub async fn enqueue(&self, job_id: &str, storage_key: &str) -> anyhow::Result<()> {
        self.tx
            .send(JobRequest {
                job_id: job_id.to_string(),
                storage_key: storage_key.to_string(),
            })
            .await
            .map_err(|_| anyhow::anyhow!("job queue is shut down"))?;
        debug!(job_id, "job enqueued");
        Ok(())
    }

    /// Aborts all workers. In-flight pipeline runs are cancelled at their
    /// next await point; their jobs stay in the last pushed status.
    pub fn shutdown(&self) {
        for worker in self.workers.iter() {
            worker.abort_handle.abort();
        }
        info!("job queue shut down");
    }
}
