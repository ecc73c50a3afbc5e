//! Stage signals: a marker document plus the task that consumes it.

use std::sync::Arc;

use tracing::{debug, info};

use reelgen_models::{MarkerKind, VideoId};
use reelgen_queue::{MarkerTask, QueueTask, TaskQueue};

use crate::error::WorkerResult;
use crate::store::MarkerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Raised,
    /// A marker for this video and stage already exists.
    InFlight,
}

/// Raises stage signals for a video.
#[derive(Clone)]
pub struct Signals {
    markers: Arc<dyn MarkerStore>,
    queue: Arc<dyn TaskQueue>,
}

impl Signals {
    pub fn new(markers: Arc<dyn MarkerStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { markers, queue }
    }

    /// Hand a video with scenes to the coordinator.
    pub async fn pending_video(&self, video_id: &VideoId) -> WorkerResult<SignalOutcome> {
        self.raise(MarkerKind::PendingVideo, video_id, QueueTask::CoordinateVideo).await
    }

    /// Ask for a render of a video whose assets are ready.
    pub async fn render_request(&self, video_id: &VideoId) -> WorkerResult<SignalOutcome> {
        self.raise(MarkerKind::RenderQueueEntry, video_id, QueueTask::RenderVideo).await
    }

    /// Ask for scenes to be built from the video's completed story.
    pub async fn story_request(&self, video_id: &VideoId) -> WorkerResult<SignalOutcome> {
        self.raise(MarkerKind::StoryRequest, video_id, QueueTask::BuildScenes).await
    }

    async fn raise(
        &self,
        kind: MarkerKind,
        video_id: &VideoId,
        task: fn(MarkerTask) -> QueueTask,
    ) -> WorkerResult<SignalOutcome> {
        if !self.markers.create_marker(kind, video_id).await? {
            debug!(video_id = %video_id, marker = %kind, "Signal already in flight");
            return Ok(SignalOutcome::InFlight);
        }

        let enqueued = self
            .queue
            .enqueue(task(MarkerTask {
                video_id: video_id.clone(),
            }))
            .await;
        if let Err(e) = enqueued {
            // Nothing will consume the marker; remove it so the signal can be raised again.
            self.markers.delete_marker(kind, video_id).await?;
            return Err(e.into());
        }

        info!(video_id = %video_id, marker = %kind, "Signal raised");
        Ok(SignalOutcome::Raised)
    }
}
