//! Installs a generated story's scenes on its video.

use std::sync::Arc;

use tracing::{info, warn};

use reelgen_models::{MarkerKind, StoryStatus, VideoId};
use reelgen_queue::MarkerTask;

use crate::error::WorkerResult;
use crate::store::{MarkerStore, PipelineStore, StoryStore, VideoReader};

/// Handler for `build_scenes`, consuming the `story-request` marker.
pub struct SceneBuilder {
    videos: Arc<dyn VideoReader>,
    pipeline: Arc<dyn PipelineStore>,
    stories: Arc<dyn StoryStore>,
    markers: Arc<dyn MarkerStore>,
}

impl SceneBuilder {
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: VideoReader + PipelineStore + StoryStore + MarkerStore + 'static,
    {
        Self {
            videos: store.clone(),
            pipeline: store.clone(),
            stories: store.clone(),
            markers: store,
        }
    }

    pub async fn handle(&self, task: &MarkerTask) -> WorkerResult<()> {
        let video_id = &task.video_id;
        if !self.markers.marker_exists(MarkerKind::StoryRequest, video_id).await? {
            info!(video_id = %video_id, "No story-request marker, scenes already built");
            return Ok(());
        }

        let result = self.build(video_id).await;
        self.markers.delete_marker(MarkerKind::StoryRequest, video_id).await?;
        result
    }

    async fn build(&self, video_id: &VideoId) -> WorkerResult<()> {
        let Some(video) = self.videos.get_video(video_id).await? else {
            warn!(video_id = %video_id, "Video not found, nothing to build");
            return Ok(());
        };
        let video = video.value;
        if video.has_scenes() {
            info!(video_id = %video_id, scenes = video.scene_count(), "Scenes already present");
            return Ok(());
        }

        let request = match &video.story_request_id {
            Some(id) => self.stories.get_story_request(id).await?,
            None => None,
        };
        let Some(request) = request else {
            return self.pipeline.fail_video(video_id, "no story request for video").await;
        };

        let story = match (request.status, request.story.as_ref()) {
            (StoryStatus::Completed, Some(story)) if !story.scenes.is_empty() => story,
            (status, _) => {
                let reason = request.error.as_deref().unwrap_or("story has no scenes");
                let message = format!("story generation ended as {:?}: {}", status, reason);
                return self.pipeline.fail_video(video_id, &message).await;
            }
        };

        let scenes = story.to_scenes();
        self.pipeline.initialize_scenes(video_id, &scenes).await?;
        info!(video_id = %video_id, scenes = scenes.len(), "Scenes installed");
        Ok(())
    }
}
