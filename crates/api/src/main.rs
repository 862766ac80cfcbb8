use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dentascribe_api::{build_router, state::AppState};
use dentascribe_config::Settings;
use dentascribe_pipeline::{
    AwsTranscribeBackend, ChatBackend, InMemoryJobStore, JobQueue, JobStore, ObjectStorage,
    OpenAiChatBackend, Orchestrator, PollerConfig, S3ObjectStorage, SoapSummarizer, StatusReporter,
    TranscribeBackend, TranscriptionPoller,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load()?;

    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.aws.region.clone()))
        .load()
        .await;

    let storage: Arc<dyn ObjectStorage> = Arc::new(S3ObjectStorage::new(
        aws_sdk_s3::Client::new(&aws_config),
        settings.aws.bucket.clone(),
    ));
    let transcribe: Arc<dyn TranscribeBackend> = Arc::new(AwsTranscribeBackend::new(
        aws_sdk_transcribe::Client::new(&aws_config),
        &settings.transcribe.language_code,
        settings.transcribe.max_speakers,
        settings.aws.bucket.clone(),
    ));
    let chat: Arc<dyn ChatBackend> = Arc::new(OpenAiChatBackend::new(&settings.llm)?);

    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let (reporter, _relay) = StatusReporter::spawn(store.clone());

    let poller = TranscriptionPoller::new(
        transcribe,
        storage.clone(),
        reporter.clone(),
        PollerConfig::from(&settings.transcribe),
    );
    let summarizer = SoapSummarizer::new(chat);
    let orchestrator = Arc::new(Orchestrator::new(
        poller,
        summarizer,
        store.clone(),
        reporter,
    ));

    let queue = JobQueue::start(
        orchestrator,
        settings.worker.count,
        settings.worker.queue_depth,
    );

    let state = AppState {
        store,
        storage,
        queue: queue.clone(),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", settings.http.host, settings.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "dentascribe api listening");

    axum::serve(listener, app).await?;

    queue.shutdown();
    Ok(())
}
