use thiserror::Error;

/// Fatal pipeline-stage failures. Everything else (degraded summaries,
/// status-push failures) is absorbed without surfacing here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The transcription engine reported the job as failed.
    #[error("{0}")]
    Transcription(String),

    /// The poll loop exceeded its configured ceiling.
    #[error("transcription did not finish within {0} seconds")]
    TranscriptionTimeout(u64),

    /// Retrieval or decoding of the transcription artifact failed after
    /// the engine reported completion.
    #[error("transcript retrieval failed: {0}")]
    Retrieval(String),

    /// The transcript is empty or a parse-error sentinel; there is
    /// nothing meaningful to summarize.
    #[error("transcript is not usable for summarization: {0}")]
    InvalidTranscript(String),
}

impl PipelineError {
    /// Whether this error belongs to the speech-to-text stage (as opposed
    /// to summarization). Drives the stage prefix on the error report.
    pub fn is_transcription_stage(&self) -> bool {
        !matches!(self, PipelineError::InvalidTranscript(_))
    }
}

/// Errors from a [`crate::stt::TranscribeBackend`] status query.
#[derive(Debug, Error)]
pub enum SttError {
    /// The job is not yet visible to the status API. Transient; the
    /// poller backs off and retries.
    #[error("transcription job not yet queryable")]
    NotReady,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
