use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::JobStatus;
use crate::error::{PipelineError, SttError};
use crate::status::StatusReporter;
use crate::storage::ObjectStorage;
use crate::transcript;

use super::{EngineStatus, StartJobRequest, StartOutcome, TranscribeBackend};

/// Poll-loop timing.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between status polls while the engine job is running.
    pub poll_interval: Duration,
    /// Backoff when the job is not yet queryable.
    pub transient_backoff: Duration,
    /// Ceiling on the whole wait; expiry fails the job with a timeout
    /// error distinct from an engine-reported failure.
    pub max_wait: Duration,
}

impl From<&dentascribe_config::TranscribeSettings> for PollerConfig {
    fn from(settings: &dentascribe_config::TranscribeSettings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            transient_backoff: Duration::from_secs(settings.transient_backoff_secs),
            max_wait: Duration::from_secs(settings.max_wait_secs),
        }
    }
}

/// Drives an external transcription job to completion and returns the
/// speaker-attributed transcript text.
pub struct TranscriptionPoller {
    backend: Arc<dyn TranscribeBackend>,
    storage: Arc<dyn ObjectStorage>,
    reporter: StatusReporter,
    config: PollerConfig,
}

impl TranscriptionPoller {
    pub fn new(
        backend: Arc<dyn TranscribeBackend>,
        storage: Arc<dyn ObjectStorage>,
        reporter: StatusReporter,
        config: PollerConfig,
    ) -> Self {
        Self {
            backend,
            storage,
            reporter,
            config,
        }
    }

    pub async fn run(&self, job_id: &str, storage_key: &str) -> Result<String, PipelineError> {
        let job_name = derive_job_name(job_id);
        let output_key = format!("results/{job_name}.json");

        info!(
            job_id,
            %job_name,
            backend = %self.backend.name(),
            "starting transcription job"
        );

        let request = StartJobRequest {
            job_name: job_name.clone(),
            media_uri: self.storage.media_uri(storage_key),
            output_key: output_key.clone(),
        };

        match self.backend.start_job(request).await {
            Ok(StartOutcome::Started) => {}
            Ok(StartOutcome::AlreadyExists) => {
                info!(%job_name, "job already submitted; polling existing job");
            }
            Err(err) => return Err(PipelineError::Transcription(err.to_string())),
        }

        let deadline = Instant::now() + self.config.max_wait;

        loop {
            if Instant::now() >= deadline {
                return Err(PipelineError::TranscriptionTimeout(
                    self.config.max_wait.as_secs(),
                ));
            }

            match self.backend.job_status(&job_name).await {
                Err(SttError::NotReady) => {
                    debug!(%job_name, "job not yet registered; backing off");
                    sleep(self.config.transient_backoff).await;
                }
                Err(SttError::Backend(err)) => {
                    return Err(PipelineError::Transcription(err.to_string()));
                }
                Ok(EngineStatus::Completed) => break,
                Ok(EngineStatus::Failed { reason }) => {
                    return Err(PipelineError::Transcription(reason));
                }
                Ok(running) => {
                    debug!(%job_name, engine_status = running.as_detail(), "still transcribing");
                    self.reporter
                        .report(
                            job_id,
                            JobStatus::ProcessingStt,
                            Some(running.as_detail().to_string()),
                        )
                        .await;
                    sleep(self.config.poll_interval).await;
                }
            }
        }

        info!(job_id, %job_name, "transcription complete; fetching artifact");

        let raw = self
            .storage
            .get(&output_key)
            .await
            .map_err(|err| PipelineError::Retrieval(err.to_string()))?;
        let text = std::str::from_utf8(&raw)
            .map_err(|err| PipelineError::Retrieval(format!("artifact is not UTF-8: {err}")))?;

        transcript::transcript_from_artifact(text.as_bytes())
            .map_err(|err| PipelineError::Retrieval(format!("artifact is not valid JSON: {err}")))
    }
}

/// Engine-side job name, scoped to one pipeline invocation. The nonce
/// keeps retried or concurrent invocations of the same job from
/// colliding.
fn derive_job_name(job_id: &str) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("dental-scribe-{}-{}", &nonce[..8], job_id)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::store::{InMemoryJobStore, JobStore};
    use crate::{Job, transcript::PARSE_ERROR_SENTINEL};

    use super::*;

    struct ScriptedBackend {
        start_outcome: StartOutcome,
        statuses: Mutex<VecDeque<Result<EngineStatus, SttError>>>,
    }

    impl ScriptedBackend {
        fn new(
            start_outcome: StartOutcome,
            statuses: Vec<Result<EngineStatus, SttError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                start_outcome,
                statuses: Mutex::new(statuses.into()),
            })
        }
    }

    #[async_trait]
    impl TranscribeBackend for ScriptedBackend {
        async fn start_job(&self, _request: StartJobRequest) -> anyhow::Result<StartOutcome> {
            Ok(self.start_outcome)
        }

        async fn job_status(&self, _job_name: &str) -> Result<EngineStatus, SttError> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(EngineStatus::InProgress))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedStorage {
        artifact: Vec<u8>,
    }

    #[async_trait]
    impl ObjectStorage for FixedStorage {
        async fn get(&self, _key: &str) -> anyhow::Result<Vec<u8>> {
            Ok(self.artifact.clone())
        }

        async fn put(&self, _key: &str, _body: Vec<u8>, _ct: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn media_uri(&self, key: &str) -> String {
            format!("s3://test-bucket/{key}")
        }
    }

    fn artifact_with_one_line() -> Vec<u8> {
        serde_json::json!({
            "results": {
                "items": [
                    {
                        "type": "pronunciation",
                        "alternatives": [{"content": "네"}],
                        "speaker_label": "spk_0"
                    }
                ]
            }
        })
        .to_string()
        .into_bytes()
    }

    fn test_config() -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_secs(10),
            transient_backoff: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
        }
    }

    async fn poller_with(
        backend: Arc<dyn TranscribeBackend>,
        artifact: Vec<u8>,
        config: PollerConfig,
    ) -> (TranscriptionPoller, Arc<InMemoryJobStore>) {
        let store = Arc::new(InMemoryJobStore::new());
        store
            .create(Job::new("j1".to_string(), "uploads/a.webm".to_string()))
            .await
            .unwrap();
        let (reporter, _relay) = StatusReporter::spawn(store.clone());
        let poller = TranscriptionPoller::new(
            backend,
            Arc::new(FixedStorage { artifact }),
            reporter,
            config,
        );
        (poller, store)
    }

    #[test]
    fn job_names_carry_a_fresh_hex_nonce() {
        let first = derive_job_name("j1");
        let second = derive_job_name("j1");

        assert!(first.starts_with("dental-scribe-"));
        assert!(first.ends_with("-j1"));
        assert_ne!(first, second);

        let nonce = &first["dental-scribe-".len()..first.len() - "-j1".len()];
        assert_eq!(nonce.len(), 8);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_complete_and_returns_transcript() {
        let backend = ScriptedBackend::new(
            StartOutcome::Started,
            vec![
                Ok(EngineStatus::Queued),
                Ok(EngineStatus::InProgress),
                Ok(EngineStatus::Completed),
            ],
        );
        let (poller, store) = poller_with(backend, artifact_with_one_line(), test_config()).await;

        let text = poller.run("j1", "uploads/a.webm").await.unwrap();
        assert_eq!(text, "[spk_0]: 네");

        // Intermediate engine state was relayed upstream.
        tokio::task::yield_now().await;
        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ProcessingStt);
        assert_eq!(job.status_detail.as_deref(), Some("IN_PROGRESS"));
    }

    #[tokio::test(start_paused = true)]
    async fn name_conflict_proceeds_to_polling() {
        let backend = ScriptedBackend::new(
            StartOutcome::AlreadyExists,
            vec![Ok(EngineStatus::Completed)],
        );
        let (poller, _store) = poller_with(backend, artifact_with_one_line(), test_config()).await;

        assert!(poller.run("j1", "uploads/a.webm").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_not_ready_backs_off_then_succeeds() {
        let backend = ScriptedBackend::new(
            StartOutcome::Started,
            vec![Err(SttError::NotReady), Ok(EngineStatus::Completed)],
        );
        let (poller, _store) = poller_with(backend, artifact_with_one_line(), test_config()).await;

        let started = Instant::now();
        assert!(poller.run("j1", "uploads/a.webm").await.is_ok());
        // One transient backoff, no full poll interval.
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_failure_carries_the_reason() {
        let backend = ScriptedBackend::new(
            StartOutcome::Started,
            vec![Ok(EngineStatus::Failed {
                reason: "bad audio".to_string(),
            })],
        );
        let (poller, _store) = poller_with(backend, artifact_with_one_line(), test_config()).await;

        match poller.run("j1", "uploads/a.webm").await {
            Err(PipelineError::Transcription(reason)) => assert_eq!(reason, "bad audio"),
            other => panic!("expected transcription failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_times_out() {
        // Backend never reaches a terminal state.
        let backend = ScriptedBackend::new(StartOutcome::Started, vec![]);
        let config = PollerConfig {
            max_wait: Duration::from_secs(30),
            ..test_config()
        };
        let (poller, _store) = poller_with(backend, artifact_with_one_line(), config).await;

        match poller.run("j1", "uploads/a.webm").await {
            Err(PipelineError::TranscriptionTimeout(secs)) => assert_eq!(secs, 30),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shapeless_artifact_degrades_to_sentinel() {
        let backend =
            ScriptedBackend::new(StartOutcome::Started, vec![Ok(EngineStatus::Completed)]);
        let (poller, _store) =
            poller_with(backend, br#"{"status":"COMPLETED"}"#.to_vec(), test_config()).await;

        let text = poller.run("j1", "uploads/a.webm").await.unwrap();
        assert_eq!(text, PARSE_ERROR_SENTINEL);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_artifact_is_a_retrieval_error() {
        let backend =
            ScriptedBackend::new(StartOutcome::Started, vec![Ok(EngineStatus::Completed)]);
        let (poller, _store) =
            poller_with(backend, b"not json".to_vec(), test_config()).await;

        assert!(matches!(
            poller.run("j1", "uploads/a.webm").await,
            Err(PipelineError::Retrieval(_))
        ));
    }
}
