//! In-memory backend and request helpers for handler tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use reelgen_models::{
    BulkJob, BulkJobId, BulkJobStatus, BulkOutcome, MarkerKind, RenderStatus, Scene, TaskId,
    Version, Versioned, Video, VideoId, VideoStatus,
};
use reelgen_queue::{QueueResult, QueueTask, TaskKind, TaskQueue};
use reelgen_worker::store::{BulkStore, MarkerStore, VideoReader};
use reelgen_worker::WorkerResult;

use crate::config::ApiConfig;
use crate::routes::create_router;
use crate::state::AppState;

#[derive(Default)]
struct Inner {
    videos: HashMap<VideoId, Video>,
    bulk_jobs: HashMap<BulkJobId, BulkJob>,
    markers: HashSet<(MarkerKind, VideoId)>,
    tasks: Vec<QueueTask>,
}

/// Record store and queue in one.
#[derive(Default)]
pub struct Backend {
    inner: Mutex<Inner>,
}

impl Backend {
    pub fn insert_video(&self, video: Video) {
        self.inner.lock().unwrap().videos.insert(video.id.clone(), video);
    }

    pub fn insert_bulk_job(&self, job: BulkJob) {
        self.inner.lock().unwrap().bulk_jobs.insert(job.id.clone(), job);
    }

    pub fn bulk_job(&self, id: &BulkJobId) -> Option<BulkJob> {
        self.inner.lock().unwrap().bulk_jobs.get(id).cloned()
    }

    pub fn has_marker(&self, kind: MarkerKind, video_id: &VideoId) -> bool {
        self.inner.lock().unwrap().markers.contains(&(kind, video_id.clone()))
    }

    pub fn tasks(&self) -> Vec<QueueTask> {
        self.inner.lock().unwrap().tasks.clone()
    }

    pub fn queued(&self, kind: TaskKind) -> usize {
        self.inner.lock().unwrap().tasks.iter().filter(|t| t.kind() == kind).count()
    }
}

#[async_trait]
impl VideoReader for Backend {
    async fn get_video(&self, video_id: &VideoId) -> WorkerResult<Option<Versioned<Video>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .videos
            .get(video_id)
            .map(|v| Versioned::new(v.clone(), Version("1".into()))))
    }
}

#[async_trait]
impl MarkerStore for Backend {
    async fn create_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.inner.lock().unwrap().markers.insert((kind, video_id.clone())))
    }

    async fn marker_exists(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.has_marker(kind, video_id))
    }

    async fn delete_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<()> {
        self.inner.lock().unwrap().markers.remove(&(kind, video_id.clone()));
        Ok(())
    }
}

#[async_trait]
impl BulkStore for Backend {
    async fn get_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJob>> {
        Ok(self.bulk_job(id))
    }

    async fn create_bulk_job(&self, job: &BulkJob) -> WorkerResult<()> {
        self.insert_bulk_job(job.clone());
        Ok(())
    }

    async fn cancel_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJobStatus>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.bulk_jobs.get_mut(id).map(|job| {
            if !job.is_terminal() {
                job.status = BulkJobStatus::Cancelled;
            }
            job.status
        }))
    }

    async fn set_bulk_status(
        &self,
        id: &BulkJobId,
        status: BulkJobStatus,
        error: Option<&str>,
    ) -> WorkerResult<BulkJobStatus> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.bulk_jobs.get_mut(id) else {
            return Ok(status);
        };
        if job.status != BulkJobStatus::Cancelled {
            job.status = status;
            job.error = error.map(str::to_string);
        }
        Ok(job.status)
    }

    async fn record_bulk_outcome(&self, id: &BulkJobId, outcome: &BulkOutcome) -> WorkerResult<()> {
        if let Some(job) = self.inner.lock().unwrap().bulk_jobs.get_mut(id) {
            job.progress = outcome.progress;
        }
        Ok(())
    }

    async fn create_video(&self, video: &Video) -> WorkerResult<()> {
        self.insert_video(video.clone());
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for Backend {
    async fn enqueue(&self, task: QueueTask) -> QueueResult<TaskId> {
        self.inner.lock().unwrap().tasks.push(task);
        Ok(TaskId::new())
    }

    async fn enqueue_after(&self, task: QueueTask, _delay: Duration) -> QueueResult<TaskId> {
        self.enqueue(task).await
    }
}

pub fn test_state() -> (AppState, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let queue: Arc<dyn TaskQueue> = backend.clone();
    let state = AppState::new(ApiConfig::default(), backend.clone(), queue, Vec::new());
    (state, backend)
}

pub fn video_with_scenes(count: u32) -> Video {
    let scenes = (0..count)
        .map(|i| (i, Scene::new(format!("narration {}", i), format!("prompt {}", i))))
        .collect();
    Video::draft("user-1", "space facts").with_scenes(scenes)
}

pub fn rendered_video() -> Video {
    let mut video = video_with_scenes(1);
    video.status = VideoStatus::RenderComplete;
    video.render_status = RenderStatus {
        progress: 1.0,
        render_id: Some("render-1".into()),
        video_url: Some("https://cdn.test/final.mp4".into()),
        error: None,
    };
    video
}

/// Send one request through the full router; returns status and JSON body.
pub async fn call(
    state: AppState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = create_router(state, None).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
