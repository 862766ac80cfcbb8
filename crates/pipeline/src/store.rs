use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::{Job, JobResult, JobStatus};

/// Injected job-status store.
///
/// The pipeline depends only on this trait; the in-memory implementation
/// below can be swapped for a durable one without touching pipeline
/// logic. Writes are last-write-wins keyed by job id.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn create(&self, job: Job) -> anyhow::Result<()>;

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>>;

    /// Sets the job's status, replacing the detail annotation and, when
    /// present, attaching the terminal result.
    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        detail: Option<String>,
        result: Option<JobResult>,
    ) -> anyhow::Result<()>;
}

/// In-memory store backing the HTTP status endpoint. Jobs live for the
/// process lifetime; retention is not this layer's concern.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<String, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> anyhow::Result<()> {
        self.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        Ok(self.jobs.get(job_id).map(|entry| entry.clone()))
    }

    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        detail: Option<String>,
        result: Option<JobResult>,
    ) -> anyhow::Result<()> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow::anyhow!("unknown job {job_id}"))?;
        entry.status = status;
        entry.status_detail = detail;
        if result.is_some() {
            entry.result = result;
        }
        entry.updated_at = Utc::now();
        Ok(())
    }
}
