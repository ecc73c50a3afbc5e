//! Story generation for a single request.

use std::sync::Arc;

use tracing::{info, warn};

use reelgen_models::{StoryRequest, StoryStatus, VideoId, VideoStatus};
use reelgen_queue::StoryTask;

use crate::error::{WorkerError, WorkerResult};
use crate::services::StoryWriter;
use crate::store::{CatalogReader, PipelineStore, StoryStore, Transition, VideoReader};

/// Handler for `generate_story`.
pub struct StoryJobHandler {
    videos: Arc<dyn VideoReader>,
    pipeline: Arc<dyn PipelineStore>,
    stories: Arc<dyn StoryStore>,
    catalog: Arc<dyn CatalogReader>,
    writer: Arc<dyn StoryWriter>,
}

impl StoryJobHandler {
    pub fn new<S>(store: Arc<S>, writer: Arc<dyn StoryWriter>) -> Self
    where
        S: VideoReader + PipelineStore + StoryStore + CatalogReader + 'static,
    {
        Self {
            videos: store.clone(),
            pipeline: store.clone(),
            stories: store.clone(),
            catalog: store,
            writer,
        }
    }

    pub async fn handle(&self, task: &StoryTask) -> WorkerResult<()> {
        let request = self
            .stories
            .get_story_request(&task.request_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("story request {}", task.request_id)))?;

        if request.status.is_terminal() {
            info!(request_id = %request.id, status = ?request.status, "Story request already finished");
            return Ok(());
        }

        self.stories
            .set_story_status(&request.id, StoryStatus::Processing, None)
            .await?;
        self.mark_video_drafting(&request.video_id).await?;

        let guidance = self.guidance(&request).await?;
        match self.writer.write(&request.prompt, guidance.as_deref()).await {
            Ok(story) if story.scenes.is_empty() => {
                warn!(request_id = %request.id, "Story came back without scenes");
                self.stories
                    .set_story_status(&request.id, StoryStatus::Failed, Some("story has no scenes"))
                    .await
            }
            Ok(story) => {
                info!(request_id = %request.id, scenes = story.scenes.len(), title = %story.title, "Story generated");
                self.stories.complete_story(&request.id, &story).await
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Story generation failed");
                self.stories
                    .set_story_status(&request.id, StoryStatus::Error, Some(&e.to_string()))
                    .await
            }
        }
    }

    /// `draft` to `processing:story`; a concurrent writer wins.
    async fn mark_video_drafting(&self, video_id: &VideoId) -> WorkerResult<()> {
        let Some(video) = self.videos.get_video(video_id).await? else {
            return Ok(());
        };
        if video.value.status != VideoStatus::Draft {
            return Ok(());
        }
        if self
            .pipeline
            .transition_status(video_id, &video.version, VideoStatus::ProcessingStory)
            .await?
            == Transition::Conflict
        {
            warn!(video_id = %video_id, "Video changed while starting story, leaving status");
        }
        Ok(())
    }

    async fn guidance(&self, request: &StoryRequest) -> WorkerResult<Option<String>> {
        let Some(content_type_id) = request.content_type_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .catalog
            .content_type(content_type_id)
            .await?
            .map(|ct| ct.name)
            .filter(|name| !name.trim().is_empty()))
    }
}
