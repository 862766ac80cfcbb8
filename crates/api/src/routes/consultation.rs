use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use dentascribe_pipeline::{Job, JobStatus};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Accepts a consultation recording, stores it and enqueues the pipeline
/// job. The client polls [`status`] with the returned id.
pub async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut audio: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("audio") {
            let content_type = field
                .content_type()
                .unwrap_or("audio/webm")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::BadRequest(format!("failed to read audio: {err}")))?;
            audio = Some((bytes.to_vec(), content_type));
        }
    }

    let (bytes, content_type) =
        audio.ok_or_else(|| ApiError::BadRequest("missing 'audio' field".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("audio file is empty".to_string()));
    }

    let storage_key = format!("uploads/{}.webm", Uuid::new_v4());
    state
        .storage
        .put(&storage_key, bytes, &content_type)
        .await
        .map_err(|err| ApiError::Internal(format!("audio upload failed: {err}")))?;

    let job_id = Uuid::new_v4().to_string();
    state
        .store
        .create(Job::new(job_id.clone(), storage_key.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    state
        .queue
        .enqueue(&job_id, &storage_key)
        .await
        .map_err(|err| ApiError::ServiceUnavailable(err.to_string()))?;

    info!(%job_id, %storage_key, "consultation submitted");

    Ok(Json(SubmitResponse {
        job_id,
        status: JobStatus::Pending,
    }))
}

/// Returns the job's current status and, once terminal, its result.
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .store
        .get(&job_id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no job with id {job_id}")))?;

    Ok(Json(job))
}
