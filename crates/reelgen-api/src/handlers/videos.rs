//! Video handlers: polling and the signals that move a video along.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use reelgen_models::{ChannelId, Privacy, Video, VideoId, VideoStatus};
use reelgen_queue::{PublishTask, QueueTask};
use reelgen_worker::publish_job::resolve_publish_at;
use reelgen_worker::signals::SignalOutcome;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Answer to a signal request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalResponse {
    pub video_id: String,
    /// `raised`, or `in_flight` when the same signal is already pending.
    pub signal: &'static str,
}

impl SignalResponse {
    fn new(video_id: &VideoId, outcome: SignalOutcome) -> Self {
        Self {
            video_id: video_id.to_string(),
            signal: match outcome {
                SignalOutcome::Raised => "raised",
                SignalOutcome::InFlight => "in_flight",
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[validate(length(min = 1, max = 128))]
    pub channel_id: String,
    /// RFC 3339, or local `YYYY-MM-DDTHH:MM[:SS]` read in `timezone`.
    #[validate(length(max = 64))]
    pub publish_at: Option<String>,
    #[serde(default)]
    pub privacy: Privacy,
    /// Fixed UTC offset such as `+05:30`.
    #[validate(length(max = 16))]
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub video_id: String,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<String>,
}

async fn load_video(state: &AppState, video_id: &VideoId) -> ApiResult<Video> {
    state
        .videos
        .get_video(video_id)
        .await?
        .map(|v| v.value)
        .ok_or_else(|| ApiError::not_found(format!("video {} not found", video_id)))
}

/// Get a video record.
pub async fn get_video(State(state): State<AppState>, Path(video_id): Path<String>) -> ApiResult<Json<Video>> {
    let video = load_video(&state, &VideoId::from_string(video_id)).await?;
    Ok(Json(video))
}

/// Hand a video with scenes to the pipeline coordinator.
pub async fn process_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<(StatusCode, Json<SignalResponse>)> {
    let video_id = VideoId::from_string(video_id);
    let video = load_video(&state, &video_id).await?;

    if !video.has_scenes() {
        return Err(ApiError::conflict(format!("video {} has no scenes", video_id)));
    }
    if !video.status.can_transition_to(VideoStatus::ProcessingAssets) {
        return Err(ApiError::conflict(format!(
            "video {} is already {}",
            video_id, video.status
        )));
    }

    let outcome = state.signals.pending_video(&video_id).await?;
    info!(video_id = %video_id, scenes = video.scene_count(), ?outcome, "Process requested");
    Ok((StatusCode::ACCEPTED, Json(SignalResponse::new(&video_id, outcome))))
}

/// Ask for a render of a video whose assets are ready.
pub async fn render_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<(StatusCode, Json<SignalResponse>)> {
    let video_id = VideoId::from_string(video_id);
    let video = load_video(&state, &video_id).await?;

    if video.status != VideoStatus::AssetsReady {
        return Err(ApiError::conflict(format!(
            "video {} cannot be rendered from {}",
            video_id, video.status
        )));
    }

    let outcome = state.signals.render_request(&video_id).await?;
    info!(video_id = %video_id, ?outcome, "Render requested");
    Ok((StatusCode::ACCEPTED, Json(SignalResponse::new(&video_id, outcome))))
}

/// Queue an upload of the rendered video to a channel.
pub async fn publish_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    request.validate()?;
    let publish_at = resolve_publish_at(request.publish_at.as_deref(), request.timezone.as_deref(), Utc::now())?;

    let video_id = VideoId::from_string(video_id);
    let video = load_video(&state, &video_id).await?;
    if video.rendered_url().is_none() {
        return Err(ApiError::conflict(format!("video {} has no rendered output", video_id)));
    }

    let task_id = state
        .queue
        .enqueue(QueueTask::PublishVideo(PublishTask {
            video_id: video_id.clone(),
            channel_id: ChannelId::from_string(request.channel_id),
            publish_at: request.publish_at,
            privacy: request.privacy,
            timezone: request.timezone,
        }))
        .await?;

    info!(video_id = %video_id, task_id = %task_id, scheduled = publish_at.is_some(), "Publish queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            video_id: video_id.to_string(),
            task_id: task_id.to_string(),
            publish_at: publish_at.map(|at| at.to_rfc3339()),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{call, rendered_video, test_state, video_with_scenes};
    use reelgen_models::MarkerKind;
    use reelgen_queue::TaskKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_video_returns_record() {
        let (state, backend) = test_state();
        let video = video_with_scenes(2);
        let id = video.id.clone();
        backend.insert_video(video);

        let (status, body) = call(state, "GET", &format!("/api/videos/{}", id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
        assert_eq!(body["status"], "draft");
    }

    #[tokio::test]
    async fn test_unknown_video_is_not_found() {
        let (state, _) = test_state();
        let (status, body) = call(state, "GET", "/api/videos/missing", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap_or_default().contains("missing"));
    }

    #[tokio::test]
    async fn test_process_raises_signal_once() {
        let (state, backend) = test_state();
        let video = video_with_scenes(3);
        let id = video.id.clone();
        backend.insert_video(video);
        let uri = format!("/api/videos/{}/process", id);

        let (status, body) = call(state.clone(), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["signal"], "raised");

        let (status, body) = call(state, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["signal"], "in_flight");

        assert!(backend.has_marker(MarkerKind::PendingVideo, &id));
        assert_eq!(backend.queued(TaskKind::CoordinateVideo), 1);
    }

    #[tokio::test]
    async fn test_process_without_scenes_conflicts() {
        let (state, backend) = test_state();
        let video = Video::draft("user-1", "a prompt");
        let id = video.id.clone();
        backend.insert_video(video);

        let (status, _) = call(state, "POST", &format!("/api/videos/{}/process", id), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(backend.queued(TaskKind::CoordinateVideo), 0);
    }

    #[tokio::test]
    async fn test_render_requires_assets_not_yet_rendered() {
        let (state, backend) = test_state();
        let video = rendered_video();
        let id = video.id.clone();
        backend.insert_video(video);

        let (status, _) = call(state, "POST", &format!("/api/videos/{}/render", id), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!backend.has_marker(MarkerKind::RenderQueueEntry, &id));
    }

    #[tokio::test]
    async fn test_render_before_assets_ready_conflicts() {
        let (state, backend) = test_state();
        for status in [VideoStatus::Draft, VideoStatus::ProcessingAssets] {
            let mut video = video_with_scenes(1);
            video.status = status;
            let id = video.id.clone();
            backend.insert_video(video);

            let (code, _) = call(state.clone(), "POST", &format!("/api/videos/{}/render", id), None).await;

            assert_eq!(code, StatusCode::CONFLICT, "render from {}", status);
            assert!(!backend.has_marker(MarkerKind::RenderQueueEntry, &id));
        }
        assert_eq!(backend.queued(TaskKind::RenderVideo), 0);
    }

    #[tokio::test]
    async fn test_render_raises_render_request() {
        let (state, backend) = test_state();
        let mut video = video_with_scenes(1);
        video.status = VideoStatus::AssetsReady;
        let id = video.id.clone();
        backend.insert_video(video);

        let (status, _) = call(state, "POST", &format!("/api/videos/{}/render", id), None).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(backend.has_marker(MarkerKind::RenderQueueEntry, &id));
        assert_eq!(backend.queued(TaskKind::RenderVideo), 1);
    }

    #[tokio::test]
    async fn test_publish_queues_task_with_schedule() {
        let (state, backend) = test_state();
        let video = rendered_video();
        let id = video.id.clone();
        backend.insert_video(video);

        let body = json!({
            "channelId": "channel-1",
            "publishAt": "2099-01-02T10:00",
            "timezone": "+05:30",
            "privacy": "public"
        });
        let (status, response) = call(state, "POST", &format!("/api/videos/{}/publish", id), Some(body)).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response["publishAt"], "2099-01-02T04:30:00+00:00");
        let tasks = backend.tasks();
        let Some(QueueTask::PublishVideo(task)) = tasks.last() else {
            panic!("expected a publish task, got {:?}", tasks);
        };
        assert_eq!(task.channel_id.as_str(), "channel-1");
        assert_eq!(task.privacy, Privacy::Public);
    }

    #[tokio::test]
    async fn test_publish_validates_body() {
        let (state, backend) = test_state();
        let video = rendered_video();
        let id = video.id.clone();
        backend.insert_video(video);
        let uri = format!("/api/videos/{}/publish", id);

        let (status, _) = call(state.clone(), "POST", &uri, Some(json!({ "channelId": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bad_time = json!({ "channelId": "c1", "publishAt": "next tuesday" });
        let (status, _) = call(state, "POST", &uri, Some(bad_time)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(backend.queued(TaskKind::PublishVideo), 0);
    }

    #[tokio::test]
    async fn test_publish_requires_rendered_output() {
        let (state, backend) = test_state();
        let video = video_with_scenes(1);
        let id = video.id.clone();
        backend.insert_video(video);

        let (status, _) = call(
            state,
            "POST",
            &format!("/api/videos/{}/publish", id),
            Some(json!({ "channelId": "c1" })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
    }
}
