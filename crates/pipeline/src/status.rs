use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::JobStore;
use crate::{JobResult, JobStatus};

/// One status transition pushed by the pipeline.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub detail: Option<String>,
    pub result: Option<JobResult>,
}

/// Best-effort status emitter.
///
/// Updates go through a channel to a relay task that writes the store, so
/// a slow or failing status sink never blocks the poll loop. A failed
/// push is logged and otherwise ignored; pipeline outcome is independent
/// of whether the observer received the update.
#[derive(Clone)]
pub struct StatusReporter {
    tx: mpsc::Sender<StatusUpdate>,
}

impl StatusReporter {
    /// Spawns the relay task and returns the reporter feeding it.
    ///
    /// The relay exits when every reporter clone is dropped.
    pub fn spawn(store: Arc<dyn JobStore>) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(relay_loop(rx, store));
        (Self { tx }, handle)
    }

    pub async fn report(&self, job_id: &str, status: JobStatus, detail: Option<String>) {
        self.send(StatusUpdate {
            job_id: job_id.to_string(),
            status,
            detail,
            result: None,
        })
        .await;
    }

    pub async fn report_result(&self, job_id: &str, status: JobStatus, result: JobResult) {
        self.send(StatusUpdate {
            job_id: job_id.to_string(),
            status,
            detail: None,
            result: Some(result),
        })
        .await;
    }

    async fn send(&self, update: StatusUpdate) {
        let job_id = update.job_id.clone();
        let status = update.status;
        if self.tx.send(update).await.is_err() {
            warn!(%job_id, %status, "status relay closed; update dropped");
        }
    }
}

async fn relay_loop(mut rx: mpsc::Receiver<StatusUpdate>, store: Arc<dyn JobStore>) {
    while let Some(update) = rx.recv().await {
        debug!(job_id = %update.job_id, status = %update.status, "relaying status update");
        if let Err(err) = store
            .set_status(
                &update.job_id,
                update.status,
                update.detail.clone(),
                update.result.clone(),
            )
            .await
        {
            warn!(job_id = %update.job_id, error = %err, "status push failed");
        }
    }
    debug!("status relay exiting");
}
