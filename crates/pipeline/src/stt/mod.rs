pub mod aws;
pub mod poller;

pub use aws::AwsTranscribeBackend;
pub use poller::{PollerConfig, TranscriptionPoller};

use async_trait::async_trait;

use crate::error::SttError;

/// Request to start an external transcription job.
#[derive(Debug, Clone)]
pub struct StartJobRequest {
    /// Engine-side job name, unique per pipeline invocation.
    pub job_name: String,
    /// URI of the uploaded audio as the engine expects it.
    pub media_uri: String,
    /// Object-storage key the engine writes its artifact to.
    pub output_key: String,
}

/// Outcome of a job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A job of this name already exists (concurrent or retried
    /// invocation). Not fatal; the caller proceeds to polling.
    AlreadyExists,
}

/// Engine-reported job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Queued,
    InProgress,
    Completed,
    Failed { reason: String },
}

impl EngineStatus {
    /// Raw annotation relayed upstream while the job is still running.
    pub fn as_detail(&self) -> &'static str {
        match self {
            EngineStatus::Queued => "QUEUED",
            EngineStatus::InProgress => "IN_PROGRESS",
            EngineStatus::Completed => "COMPLETED",
            EngineStatus::Failed { .. } => "FAILED",
        }
    }
}

/// Trait for pluggable asynchronous transcription engines.
#[async_trait]
pub trait TranscribeBackend: Send + Sync + 'static {
    /// Submits a transcription job. Name conflicts map to
    /// [`StartOutcome::AlreadyExists`] rather than an error.
    async fn start_job(&self, request: StartJobRequest) -> anyhow::Result<StartOutcome>;

    /// Queries the state of a previously submitted job.
    ///
    /// Returns [`SttError::NotReady`] while the job is not yet visible to
    /// the status API.
    async fn job_status(&self, job_name: &str) -> Result<EngineStatus, SttError>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}
