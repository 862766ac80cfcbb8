pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod status;
pub mod storage;
pub mod store;
pub mod stt;
pub mod summarizer;
pub mod transcript;

pub use error::PipelineError;
pub use orchestrator::Orchestrator;
pub use queue::{JobQueue, JobRequest};
pub use status::{StatusReporter, StatusUpdate};
pub use storage::{ObjectStorage, S3ObjectStorage};
pub use store::{InMemoryJobStore, JobStore};
pub use stt::{AwsTranscribeBackend, PollerConfig, TranscribeBackend, TranscriptionPoller};
pub use summarizer::{ChatBackend, OpenAiChatBackend, SoapSummarizer};
pub use transcript::{TranscriptLine, TranscriptionToken, reconstruct};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle states. Progression is monotonic; `Completed` and
/// `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    ProcessingStt,
    ProcessingSoap,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::ProcessingStt => "processing_stt",
            JobStatus::ProcessingSoap => "processing_soap",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One end-to-end transcribe-and-summarize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    /// Object-storage key of the uploaded audio. Set once at submission.
    pub storage_key: String,
    pub status: JobStatus,
    /// Free-form annotation of external-engine progress while in
    /// `ProcessingStt` (e.g. the raw engine status). Not a state of its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: String, storage_key: String) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            storage_key,
            status: JobStatus::Pending,
            status_detail: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal payload: a clinical note on success, an error report on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Note(ClinicalNote),
    Error(ErrorReport),
}

/// SOAP note plus the full transcript it was derived from.
///
/// All four section fields are always present; a failed summarization
/// fills them with [`summarizer::SUMMARY_FAILED`] instead of omitting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub s: String,
    pub o: String,
    pub a: String,
    pub p: String,
    pub transcript: String,
}

/// Human-readable, stage-prefixed failure message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error_message: String,
}

impl ErrorReport {
    pub fn transcription(message: impl std::fmt::Display) -> Self {
        Self {
            error_message: format!("Transcription failed: {message}"),
        }
    }

    pub fn summarization(message: impl std::fmt::Display) -> Self {
        Self {
            error_message: format!("Summarization failed: {message}"),
        }
    }
}
