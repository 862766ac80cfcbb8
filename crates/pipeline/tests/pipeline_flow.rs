//! End-to-end pipeline runs against scripted backends: status
//! monotonicity, stage-failure short-circuits, degraded summaries and
//! redelivery handling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dentascribe_pipeline::error::SttError;
use dentascribe_pipeline::status::StatusReporter;
use dentascribe_pipeline::store::{InMemoryJobStore, JobStore};
use dentascribe_pipeline::stt::{
    EngineStatus, PollerConfig, StartJobRequest, StartOutcome, TranscribeBackend,
    TranscriptionPoller,
};
use dentascribe_pipeline::summarizer::{ChatBackend, SUMMARY_FAILED, SoapSummarizer};
use dentascribe_pipeline::{
    Job, JobQueue, JobResult, JobStatus, ObjectStorage, Orchestrator,
    queue::JobRequest,
};

// ── Scripted collaborators ──────────────────────────────────────────

struct ScriptedBackend {
    statuses: Mutex<VecDeque<Result<EngineStatus, SttError>>>,
}

impl ScriptedBackend {
    fn new(statuses: Vec<Result<EngineStatus, SttError>>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
        })
    }
}

#[async_trait]
impl TranscribeBackend for ScriptedBackend {
    async fn start_job(&self, _request: StartJobRequest) -> anyhow::Result<StartOutcome> {
        Ok(StartOutcome::Started)
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

struct CannedChat {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl CannedChat {
    fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatBackend for CannedChat {
    async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }

    fn name(&self) -> &str {
        "canned"
    }
}

/// Store wrapper that records every pushed status transition.
struct RecordingStore {
    inner: InMemoryJobStore,
    transitions: Mutex<Vec<JobStatus>>,
}

impl RecordingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryJobStore::new(),
            transitions: Mutex::new(Vec::new()),
        })
    }

    fn transitions(&self) -> Vec<JobStatus> {
        self.transitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, job: Job) -> anyhow::Result<()> {
        self.inner.create(job).await
    }

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        self.inner.get(job_id).await
    }

    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        detail: Option<String>,
        result: Option<JobResult>,
    ) -> anyhow::Result<()> {
        self.transitions.lock().unwrap().push(status);
        self.inner.set_status(job_id, status, detail, result).await
    }
}

// ── Fixture ─────────────────────────────────────────────────────────

fn artifact() -> Vec<u8> {
    serde_json::json!({
        "results": {
            "items": [
                {
                    "type": "pronunciation",
                    "alternatives": [{"content": "이가"}],
                    "speaker_label": "spk_0"
                },
                {
                    "type": "pronunciation",
                    "alternatives": [{"content": "아파요"}]
                },
                {
                    "type": "punctuation",
                    "alternatives": [{"content": "."}]
                },
                {
                    "type": "pronunciation",
                    "alternatives": [{"content": "봐 드릴게요"}],
                    "speaker_label": "spk_1"
                }
            ]
        }
    })
    .to_string()
    .into_bytes()
}

async fn build(
    backend: Arc<dyn TranscribeBackend>,
    artifact_bytes: Vec<u8>,
    chat: Arc<dyn ChatBackend>,
) -> (Arc<Orchestrator>, Arc<RecordingStore>) {
    let store = RecordingStore::new();
    store
        .create(Job::new("j1".to_string(), "uploads/a.webm".to_string()))
        .await
        .unwrap();

    let store_dyn: Arc<dyn JobStore> = store.clone();
    let (reporter, _relay) = StatusReporter::spawn(store_dyn.clone());

    let poller = TranscriptionPoller::new(
        backend,
        Arc::new(FixedStorage {
            artifact: artifact_bytes,
        }),
        reporter.clone(),
        PollerConfig {
            poll_interval: Duration::from_secs(10),
            transient_backoff: Duration::from_secs(5),
            max_wait: Duration::from_secs(120),
        },
    );
    let summarizer = SoapSummarizer::new(chat);
    let orchestrator = Arc::new(Orchestrator::new(poller, summarizer, store_dyn, reporter));

    (orchestrator, store)
}

fn request() -> JobRequest {
    JobRequest {
        job_id: "j1".to_string(),
        storage_key: "uploads/a.webm".to_string(),
    }
}

/// Waits for the status relay to drain pending updates.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn successful_run_pushes_monotonic_statuses() {
    let backend = ScriptedBackend::new(vec![
        Ok(EngineStatus::Queued),
        Ok(EngineStatus::InProgress),
        Ok(EngineStatus::Completed),
    ]);
    let chat = CannedChat::ok(r#"{"s":"치통","o":"우식 소견","a":"치수염","p":"신경치료"}"#);
    let (orchestrator, store) = build(backend, artifact(), chat).await;

    orchestrator.run(request()).await;
    settle().await;

    // Intermediate STT annotations repeat the same state; the distinct
    // progression must be a prefix of the success path.
    let mut distinct = store.transitions();
    distinct.dedup();
    assert_eq!(
        distinct,
        vec![
            JobStatus::ProcessingStt,
            JobStatus::ProcessingSoap,
            JobStatus::Completed,
        ]
    );

    let job = store.get("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    match job.result {
        Some(JobResult::Note(note)) => {
            assert_eq!(note.a, "치수염");
            assert_eq!(note.transcript, "[spk_0]: 이가 아파요.\n[spk_1]: 봐 드릴게요");
        }
        other => panic!("expected a clinical note, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn transcription_failure_short_circuits() {
    let backend = ScriptedBackend::new(vec![Ok(EngineStatus::Failed {
        reason: "bad audio".to_string(),
    })]);
    let chat = CannedChat::ok("{}");
    let (orchestrator, store) = build(backend, artifact(), chat.clone()).await;

    orchestrator.run(request()).await;
    settle().await;

    let transitions = store.transitions();
    assert!(!transitions.contains(&JobStatus::ProcessingSoap));
    assert_eq!(transitions.last(), Some(&JobStatus::Failed));
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);

    let job = store.get("j1").await.unwrap().unwrap();
    match job.result {
        Some(JobResult::Error(report)) => {
            assert!(report.error_message.starts_with("Transcription failed:"));
            assert!(report.error_message.contains("bad audio"));
        }
        other => panic!("expected an error report, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn degraded_summary_still_completes_the_job() {
    let backend = ScriptedBackend::new(vec![Ok(EngineStatus::Completed)]);
    let chat = CannedChat::failing("model endpoint unreachable");
    let (orchestrator, store) = build(backend, artifact(), chat).await;

    orchestrator.run(request()).await;
    settle().await;

    let job = store.get("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    match job.result {
        Some(JobResult::Note(note)) => {
            assert_eq!(note.s, SUMMARY_FAILED);
            assert!(note.transcript.contains("[spk_0]: 이가 아파요."));
            assert!(note.transcript.contains("model endpoint unreachable"));
        }
        other => panic!("expected a degraded note, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unusable_transcript_fails_the_summarization_stage() {
    let backend = ScriptedBackend::new(vec![Ok(EngineStatus::Completed)]);
    let chat = CannedChat::ok("{}");
    // Valid JSON, wrong shape: parses to the sentinel the summarizer rejects.
    let (orchestrator, store) =
        build(backend, br#"{"status":"COMPLETED"}"#.to_vec(), chat.clone()).await;

    orchestrator.run(request()).await;
    settle().await;

    let job = store.get("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    match job.result {
        Some(JobResult::Error(report)) => {
            assert!(report.error_message.starts_with("Summarization failed:"));
        }
        other => panic!("expected an error report, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn terminal_job_redelivery_is_skipped() {
    let backend = ScriptedBackend::new(vec![Ok(EngineStatus::Completed)]);
    let chat = CannedChat::ok(r#"{"s":"a","o":"b","a":"c","p":"d"}"#);
    let (orchestrator, store) = build(backend, artifact(), chat.clone()).await;

    orchestrator.run(request()).await;
    settle().await;
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    let first_transitions = store.transitions().len();

    // Second delivery of the same job: no reruns, no new transitions.
    orchestrator.run(request()).await;
    settle().await;
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.transitions().len(), first_transitions);
}

#[tokio::test(start_paused = true)]
async fn queue_delivers_to_a_worker() {
    let backend = ScriptedBackend::new(vec![
        Ok(EngineStatus::InProgress),
        Ok(EngineStatus::Completed),
    ]);
    let chat = CannedChat::ok(r#"{"s":"a","o":"b","a":"c","p":"d"}"#);
    let (orchestrator, store) = build(backend, artifact(), chat).await;

    let queue = JobQueue::start(orchestrator, 2, 8);
    queue.enqueue("j1", "uploads/a.webm").await.unwrap();

    // Poll the store until the worker drives the job terminal.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    loop {
        settle().await;
        let job = store.get("j1").await.unwrap().unwrap();
        if job.status.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never reached a terminal state"
        );
    }

    queue.shutdown();
}
