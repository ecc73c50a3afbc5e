//! Fans a video with scenes out into per-scene asset tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use reelgen_models::{MarkerKind, SceneIndex, StatusMessage, TrackStatus, VideoId, VideoStatus};
use reelgen_queue::{ImageTask, MarkerTask, QueueTask, SyncTask, TaskQueue, VoiceTask};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::store::{MarkerStore, PipelineStore, Transition, VideoReader};

const STATUS_CAS_ATTEMPTS: u32 = 3;

/// Handler for `coordinate_video`, consuming the `pending-video` marker.
pub struct Coordinator {
    videos: Arc<dyn VideoReader>,
    pipeline: Arc<dyn PipelineStore>,
    markers: Arc<dyn MarkerStore>,
    queue: Arc<dyn TaskQueue>,
    default_voice_id: String,
}

/// What the coordinator did with a video.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FanOut {
    Dispatched(usize),
    Aborted(&'static str),
}

impl Coordinator {
    pub fn new<S>(store: Arc<S>, queue: Arc<dyn TaskQueue>, config: &WorkerConfig) -> Self
    where
        S: VideoReader + PipelineStore + MarkerStore + 'static,
    {
        Self {
            videos: store.clone(),
            pipeline: store.clone(),
            markers: store,
            queue,
            default_voice_id: config.default_voice_id.clone(),
        }
    }

    pub async fn handle(&self, task: &MarkerTask) -> WorkerResult<()> {
        let video_id = &task.video_id;
        if !self.markers.marker_exists(MarkerKind::PendingVideo, video_id).await? {
            info!(video_id = %video_id, "No pending-video marker, already coordinated");
            return Ok(());
        }

        let result = self.fan_out(video_id).await;
        self.markers.delete_marker(MarkerKind::PendingVideo, video_id).await?;

        match result? {
            FanOut::Dispatched(scenes) => {
                info!(video_id = %video_id, scenes, "Scene tasks dispatched");
            }
            FanOut::Aborted(reason) => {
                warn!(video_id = %video_id, reason, "Coordination aborted");
            }
        }
        Ok(())
    }

    async fn fan_out(&self, video_id: &VideoId) -> WorkerResult<FanOut> {
        let mut attempts = 0;
        let video = loop {
            attempts += 1;
            let Some(current) = self.videos.get_video(video_id).await? else {
                return Ok(FanOut::Aborted("video not found"));
            };
            if !current.value.has_scenes() {
                return Ok(FanOut::Aborted("video has no scenes"));
            }
            if current.value.status == VideoStatus::ProcessingAssets {
                info!(video_id = %video_id, "Video already generating assets, re-dispatching unfinished scenes");
                break current.value;
            }
            if !current.value.status.can_transition_to(VideoStatus::ProcessingAssets) {
                return Ok(FanOut::Aborted("video is already past asset generation"));
            }

            match self
                .pipeline
                .transition_status(video_id, &current.version, VideoStatus::ProcessingAssets)
                .await?
            {
                Transition::Applied => break current.value,
                Transition::Conflict if attempts < STATUS_CAS_ATTEMPTS => continue,
                Transition::Conflict => return Ok(FanOut::Aborted("status kept changing underneath")),
            }
        };

        let voice_id = if video.voice_id.trim().is_empty() {
            self.default_voice_id.as_str()
        } else {
            video.voice_id.as_str()
        };

        let mut tasks = Vec::with_capacity(video.scenes.len() * 2 + 1);
        for (index, scene) in &video.scenes {
            if !is_completed(&video.image_status, index) {
                tasks.push(QueueTask::GenerateImage(ImageTask::new(video_id, *index, &scene.image_prompt)));
            }
            if !is_completed(&video.voice_status, index) {
                tasks.push(QueueTask::GenerateVoice(VoiceTask::new(
                    video_id,
                    *index,
                    &scene.narration,
                    voice_id,
                )));
            }
        }
        tasks.push(QueueTask::SyncAssets(SyncTask {
            video_id: video_id.clone(),
            attempt: 0,
        }));

        for task in tasks {
            match self.queue.enqueue(task).await {
                Ok(_) => {}
                Err(e) if e.is_duplicate() => {}
                Err(e) => {
                    let message = format!("failed to dispatch scene tasks: {}", e);
                    self.pipeline.fail_video(video_id, &message).await?;
                    return Ok(FanOut::Aborted("enqueue failed"));
                }
            }
        }

        Ok(FanOut::Dispatched(video.scenes.len()))
    }
}

fn is_completed(statuses: &BTreeMap<SceneIndex, TrackStatus>, index: &SceneIndex) -> bool {
    statuses
        .get(index)
        .is_some_and(|s| s.status_message == StatusMessage::Completed)
}
