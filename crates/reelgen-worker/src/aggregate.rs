//! Scene status and asset readiness aggregation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use reelgen_models::{
    combine_scene_status, AssetReadiness, SceneIndex, StatusMessage, TrackStatus, VideoId, VideoStatus,
};

use crate::error::WorkerResult;
use crate::store::{PipelineStore, Transition, VideoReader};

/// Compare-and-swap attempts before readiness gives way to the next check.
const READINESS_CAS_ATTEMPTS: u32 = 3;

/// Result of one readiness evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// This call moved the video to `assets:ready`.
    Transitioned,
    /// The video was already at or past `assets:ready`.
    AlreadyReady(VideoStatus),
    NotReady(AssetReadiness),
    /// Every transition attempt lost to a concurrent writer.
    Contended,
    /// The video is in `error`; nothing further will happen.
    Halted,
    Missing,
}

impl Readiness {
    /// True once the video has reached `assets:ready`, by this call or earlier.
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Transitioned | Readiness::AlreadyReady(_))
    }
}

/// Owner of the derived statuses: `sceneStatus` and the `assets:ready`
/// transition.
#[derive(Clone)]
pub struct Aggregators {
    videos: Arc<dyn VideoReader>,
    pipeline: Arc<dyn PipelineStore>,
    threshold: chrono::Duration,
}

impl Aggregators {
    pub fn new<S>(store: Arc<S>, threshold: chrono::Duration) -> Self
    where
        S: VideoReader + PipelineStore + 'static,
    {
        Self {
            videos: store.clone(),
            pipeline: store,
            threshold,
        }
    }

    /// Derive `sceneStatus[index]` from the scene's image and voice tracks.
    ///
    /// Writes only when both tracks are terminal; returns what was written.
    pub async fn sync_scene(&self, video_id: &VideoId, index: SceneIndex) -> WorkerResult<Option<StatusMessage>> {
        let Some(current) = self.videos.get_video(video_id).await? else {
            return Ok(None);
        };
        let video = current.value;

        let (Some(image), Some(voice)) = (video.image_status.get(&index), video.voice_status.get(&index)) else {
            return Ok(None);
        };
        let Some(combined) = combine_scene_status(image.status_message, voice.status_message) else {
            debug!(video_id = %video_id, scene_index = index, "Scene not yet decidable");
            return Ok(None);
        };

        let unchanged = video
            .scene_status
            .get(&index)
            .is_some_and(|s| s.status_message == combined && s.progress >= 1.0);
        if !unchanged {
            self.pipeline
                .set_scene_status(video_id, index, &TrackStatus::new(combined, 1.0))
                .await?;
            debug!(video_id = %video_id, scene_index = index, status = %combined, "Scene status updated");
        }
        Ok(Some(combined))
    }

    /// Both aggregators, in order, after a scene track changed.
    pub async fn after_scene(&self, video_id: &VideoId, index: SceneIndex) -> WorkerResult<Readiness> {
        self.sync_scene(video_id, index).await?;
        self.check_readiness(video_id).await
    }

    /// Move the video to `assets:ready` once every image and voice track has
    /// settled.
    pub async fn check_readiness(&self, video_id: &VideoId) -> WorkerResult<Readiness> {
        for _ in 0..READINESS_CAS_ATTEMPTS {
            let Some(current) = self.videos.get_video(video_id).await? else {
                return Ok(Readiness::Missing);
            };
            let video = &current.value;

            if video.status == VideoStatus::Error {
                return Ok(Readiness::Halted);
            }
            if video.status.has_reached(VideoStatus::AssetsReady) {
                return Ok(Readiness::AlreadyReady(video.status));
            }

            let readiness = AssetReadiness::assess(video, Utc::now(), self.threshold);
            if !readiness.is_ready() {
                return Ok(Readiness::NotReady(readiness));
            }

            match self
                .pipeline
                .transition_status(video_id, &current.version, VideoStatus::AssetsReady)
                .await?
            {
                Transition::Applied => {
                    info!(
                        video_id = %video_id,
                        scenes = readiness.scene_count,
                        "All assets settled, video is ready"
                    );
                    return Ok(Readiness::Transitioned);
                }
                Transition::Conflict => {
                    debug!(video_id = %video_id, "Readiness write lost a race, re-evaluating");
                }
            }
        }
        Ok(Readiness::Contended)
    }
}
