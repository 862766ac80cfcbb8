use std::sync::Arc;

use dentascribe_pipeline::{JobQueue, JobStore, ObjectStorage};

/// Shared handles for the HTTP boundary: the injected job store (also
/// written by the worker pool), audio/object storage and the dispatch
/// queue.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub queue: JobQueue,
}
