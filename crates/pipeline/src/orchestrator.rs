use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::queue::JobRequest;
use crate::status::StatusReporter;
use crate::store::JobStore;
use crate::stt::TranscriptionPoller;
use crate::summarizer::SoapSummarizer;
use crate::{ErrorReport, JobResult, JobStatus};

/// Owns one job's pipeline run: transcription, then summarization, with
/// a status push after every transition.
///
/// Status pushes are best-effort; their delivery never affects the
/// pipeline's own outcome. Queue delivery is at-least-once, so a
/// delivery for a job that is already terminal is skipped rather than
/// re-run.
pub struct Orchestrator {
    poller: TranscriptionPoller,
    summarizer: SoapSummarizer,
    store: Arc<dyn JobStore>,
    reporter: StatusReporter,
}

impl Orchestrator {
    pub fn new(
        poller: TranscriptionPoller,
        summarizer: SoapSummarizer,
        store: Arc<dyn JobStore>,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            poller,
            summarizer,
            store,
            reporter,
        }
    }

    pub async fn run(&self, request: JobRequest) {
        let JobRequest {
            job_id,
            storage_key,
        } = request;

        match self.store.get(&job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                info!(%job_id, status = %job.status, "job already terminal; skipping redelivery");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                // The store is also the idempotency guard; without it we
                // cannot tell a fresh delivery from a redelivery.
                warn!(%job_id, error = %err, "could not consult job store before run");
            }
        }

        info!(%job_id, %storage_key, "pipeline run started");

        self.reporter
            .report(&job_id, JobStatus::ProcessingStt, None)
            .await;

        let transcript = match self.poller.run(&job_id, &storage_key).await {
            Ok(text) => text,
            Err(err) => {
                error!(%job_id, error = %err, "transcription stage failed");
                self.fail(&job_id, &err).await;
                return;
            }
        };

        self.reporter
            .report(&job_id, JobStatus::ProcessingSoap, None)
            .await;

        match self.summarizer.summarize(&job_id, &transcript).await {
            Ok(note) => {
                self.reporter
                    .report_result(&job_id, JobStatus::Completed, JobResult::Note(note))
                    .await;
                info!(%job_id, "pipeline run completed");
            }
            Err(err) => {
                error!(%job_id, error = %err, "summarization stage failed");
                self.fail(&job_id, &err).await;
            }
        }
    }

    async fn fail(&self, job_id: &str, err: &PipelineError) {
        let report = if err.is_transcription_stage() {
            ErrorReport::transcription(err)
        } else {
            ErrorReport::summarization(err)
        };
        self.reporter
            .report_result(job_id, JobStatus::Failed, JobResult::Error(report))
            .await;
    }
}
