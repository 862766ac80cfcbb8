use async_trait::async_trait;
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MedicalTranscriptionSetting, Specialty, TranscriptionJobStatus, Type,
};
use tracing::{info, warn};

use crate::error::SttError;

use super::{EngineStatus, StartJobRequest, StartOutcome, TranscribeBackend};

/// AWS Transcribe Medical backend.
///
/// Jobs run in conversation mode with speaker diarization capped at two
/// speakers (patient and practitioner) and the artifact written back to
/// the recordings bucket.
pub struct AwsTranscribeBackend {
    client: aws_sdk_transcribe::Client,
    language_code: LanguageCode,
    max_speakers: i32,
    output_bucket: String,
}

impl AwsTranscribeBackend {
    pub fn new(
        client: aws_sdk_transcribe::Client,
        language_code: &str,
        max_speakers: i32,
        output_bucket: String,
    ) -> Self {
        Self {
            client,
            language_code: LanguageCode::from(language_code),
            max_speakers,
            output_bucket,
        }
    }
}

#[async_trait]
impl TranscribeBackend for AwsTranscribeBackend {
    async fn start_job(&self, request: StartJobRequest) -> anyhow::Result<StartOutcome> {
        let settings = MedicalTranscriptionSetting::builder()
            .show_speaker_labels(true)
            .max_speaker_labels(self.max_speakers)
            .build();

        let result = self
            .client
            .start_medical_transcription_job()
            .medical_transcription_job_name(&request.job_name)
            .language_code(self.language_code.clone())
            .media(Media::builder().media_file_uri(&request.media_uri).build())
            .output_bucket_name(&self.output_bucket)
            .output_key(&request.output_key)
            .specialty(Specialty::Primarycare)
            .r#type(Type::Conversation)
            .settings(settings)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(job_name = %request.job_name, "transcription job submitted");
                Ok(StartOutcome::Started)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conflict_exception() {
                    warn!(job_name = %request.job_name, "transcription job already exists");
                    Ok(StartOutcome::AlreadyExists)
                } else {
                    Err(anyhow::anyhow!("failed to start transcription job: {service_err}"))
                }
            }
        }
    }

    async fn job_status(&self, job_name: &str) -> Result<EngineStatus, SttError> {
        let output = self
            .client
            .get_medical_transcription_job()
            .medical_transcription_job_name(job_name)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                // The engine answers BadRequest until the freshly submitted
                // job is registered with the status API.
                if service_err.is_bad_request_exception() {
                    SttError::NotReady
                } else {
                    SttError::Backend(anyhow::anyhow!(
                        "failed to query transcription job: {service_err}"
                    ))
                }
            })?;

        let job = output
            .medical_transcription_job()
            .ok_or_else(|| SttError::Backend(anyhow::anyhow!("status response carried no job")))?;

        let status = match job.transcription_job_status() {
            Some(TranscriptionJobStatus::Queued) => EngineStatus::Queued,
            Some(TranscriptionJobStatus::InProgress) => EngineStatus::InProgress,
            Some(TranscriptionJobStatus::Completed) => EngineStatus::Completed,
            Some(TranscriptionJobStatus::Failed) => EngineStatus::Failed {
                reason: job
                    .failure_reason()
                    .unwrap_or("unknown failure reason")
                    .to_string(),
            },
            other => {
                return Err(SttError::Backend(anyhow::anyhow!(
                    "unexpected transcription job status: {other:?}"
                )));
            }
        };

        Ok(status)
    }

    fn name(&self) -> &str {
        "aws_transcribe_medical"
    }
}
