//! Bulk job handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use reelgen_models::{BulkJob, BulkJobId, BulkJobStatus};
use reelgen_queue::{BulkTask, QueueTask};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBulkJobRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 128))]
    pub template_id: String,
    #[validate(range(min = 1))]
    pub count: u32,
    /// Falls back to the content type's default prompt when empty.
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub topic_prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub id: String,
    pub status: BulkJobStatus,
}

/// Create a bulk job and queue its orchestration.
pub async fn create_bulk_job(
    State(state): State<AppState>,
    Json(request): Json<CreateBulkJobRequest>,
) -> ApiResult<(StatusCode, Json<BulkJob>)> {
    request.validate()?;
    if request.count > state.config.max_bulk_count {
        return Err(ApiError::Validation(format!(
            "count must be at most {}",
            state.config.max_bulk_count
        )));
    }

    let job = BulkJob::new(
        request.user_id,
        request.template_id,
        request.count,
        request.topic_prompt.trim(),
    );
    state.bulk_jobs.create_bulk_job(&job).await?;

    let task = QueueTask::RunBulkJob(BulkTask {
        bulk_job_id: job.id.clone(),
    });
    if let Err(e) = state.queue.enqueue(task).await {
        warn!(bulk_job_id = %job.id, "Failed to queue bulk job: {}", e);
        let reason = format!("failed to queue bulk job: {}", e);
        state
            .bulk_jobs
            .set_bulk_status(&job.id, BulkJobStatus::Failed, Some(&reason))
            .await?;
        return Err(e.into());
    }

    info!(bulk_job_id = %job.id, count = job.count, template_id = %job.template_id, "Bulk job queued");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Get a bulk job with its progress and results.
pub async fn get_bulk_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<BulkJob>> {
    let job_id = BulkJobId::from_string(job_id);
    state
        .bulk_jobs
        .get_bulk_job(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("bulk job {} not found", job_id)))
}

/// Stop a running bulk job from starting further iterations.
pub async fn cancel_bulk_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job_id = BulkJobId::from_string(job_id);
    let status = state
        .bulk_jobs
        .cancel_bulk_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("bulk job {} not found", job_id)))?;

    if status != BulkJobStatus::Cancelled {
        return Err(ApiError::conflict(format!("bulk job {} already {}", job_id, status)));
    }

    info!(bulk_job_id = %job_id, "Bulk job cancel requested");
    Ok(Json(CancelResponse {
        id: job_id.to_string(),
        status,
    }))
}
