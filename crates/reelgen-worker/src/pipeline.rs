//! Every handler, wired to one store, queue and set of services.

use std::sync::Arc;

use reelgen_queue::{QueueTask, TaskQueue};

use crate::bulk_job::BulkOrchestrator;
use crate::config::WorkerConfig;
use crate::coordinator::Coordinator;
use crate::error::WorkerResult;
use crate::image_job::ImageJobHandler;
use crate::publish_job::PublishJobHandler;
use crate::render_job::RenderJobHandler;
use crate::scene_builder::SceneBuilder;
use crate::services::Services;
use crate::signals::Signals;
use crate::store::{
    BulkStore, CatalogReader, ChannelStore, ImageTrack, MarkerStore, PipelineStore, RenderStore, StoryStore,
    TrackStore, UploadStore, VideoReader, VoiceTrack,
};
use crate::story_job::StoryJobHandler;
use crate::sync_monitor::SyncMonitor;
use crate::voice_job::VoiceJobHandler;

/// A store that provides every capability some handler needs.
pub trait PipelineBackend:
    VideoReader
    + TrackStore<ImageTrack>
    + TrackStore<VoiceTrack>
    + PipelineStore
    + RenderStore
    + UploadStore
    + MarkerStore
    + BulkStore
    + StoryStore
    + CatalogReader
    + ChannelStore
    + 'static
{
}

impl<S> PipelineBackend for S where
    S: VideoReader
        + TrackStore<ImageTrack>
        + TrackStore<VoiceTrack>
        + PipelineStore
        + RenderStore
        + UploadStore
        + MarkerStore
        + BulkStore
        + StoryStore
        + CatalogReader
        + ChannelStore
        + 'static
{
}

/// Routes each queue task to its handler.
pub struct Pipeline {
    images: ImageJobHandler,
    voices: VoiceJobHandler,
    sync: SyncMonitor,
    coordinator: Coordinator,
    scenes: SceneBuilder,
    stories: StoryJobHandler,
    render: RenderJobHandler,
    publish: PublishJobHandler,
    bulk: BulkOrchestrator,
}

impl Pipeline {
    pub fn new<S: PipelineBackend>(
        store: Arc<S>,
        queue: Arc<dyn TaskQueue>,
        services: Services,
        config: &WorkerConfig,
    ) -> Self {
        let signals = Signals::new(store.clone(), queue.clone());
        Self {
            images: ImageJobHandler::new(store.clone(), services.images, services.assets.clone(), config),
            voices: VoiceJobHandler::new(
                store.clone(),
                services.speech,
                services.transcriber,
                services.assets,
                config,
            ),
            sync: SyncMonitor::new(store.clone(), queue.clone(), signals.clone(), config),
            coordinator: Coordinator::new(store.clone(), queue.clone(), config),
            scenes: SceneBuilder::new(store.clone()),
            stories: StoryJobHandler::new(store.clone(), services.stories),
            render: RenderJobHandler::new(store.clone(), services.renderer, config),
            publish: PublishJobHandler::new(store.clone(), services.publisher, config),
            bulk: BulkOrchestrator::new(store, queue, signals, config),
        }
    }

    pub async fn dispatch(&self, task: &QueueTask) -> WorkerResult<()> {
        match task {
            QueueTask::GenerateImage(t) => self.images.handle(t).await,
            QueueTask::GenerateVoice(t) => self.voices.handle(t).await,
            QueueTask::SyncAssets(t) => self.sync.handle(t).await,
            QueueTask::CoordinateVideo(t) => self.coordinator.handle(t).await,
            QueueTask::BuildScenes(t) => self.scenes.handle(t).await,
            QueueTask::GenerateStory(t) => self.stories.handle(t).await,
            QueueTask::RenderVideo(t) => self.render.handle(t).await,
            QueueTask::PublishVideo(t) => self.publish.handle(t).await,
            QueueTask::RunBulkJob(t) => self.bulk.handle(t).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, video_with_scenes, Fakes, MemoryQueue, MemoryStore};
    use reelgen_models::{MarkerKind, StatusMessage, VideoStatus};
    use reelgen_queue::{MarkerTask, TaskKind};

    /// Run queued tasks in order until the queue is drained.
    async fn drain(pipeline: &Pipeline, queue: &MemoryQueue, mut cursor: usize) -> usize {
        loop {
            let tasks = queue.tasks();
            if cursor >= tasks.len() {
                return cursor;
            }
            pipeline.dispatch(&tasks[cursor]).await.unwrap();
            cursor += 1;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_goes_from_draft_to_rendered() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        let fakes = Fakes::default();
        let pipeline = Pipeline::new(store.clone(), queue.clone(), fakes.services(), &test_config());

        let video = video_with_scenes(3);
        let id = video.id.clone();
        store.insert_video(video);
        let signals = Signals::new(store.clone(), queue.clone());
        signals.pending_video(&id).await.unwrap();

        drain(&pipeline, &queue, 0).await;

        let video = store.video(&id);
        assert!(video
            .scene_status
            .values()
            .all(|s| s.status_message == StatusMessage::Completed));
        assert!(video.scenes.values().all(|s| s.has_image() && s.has_voice()));
        assert_eq!(video.status, VideoStatus::RenderComplete);
        assert_eq!(
            store.status_history(&id),
            vec![
                VideoStatus::Draft,
                VideoStatus::ProcessingAssets,
                VideoStatus::AssetsReady,
                VideoStatus::ProcessingRender,
                VideoStatus::RenderComplete,
            ]
        );
        assert_eq!(queue.count(TaskKind::GenerateImage), 3);
        assert_eq!(queue.count(TaskKind::RenderVideo), 1);
        assert!(!store.has_marker(MarkerKind::PendingVideo, &id));
        assert!(!store.has_marker(MarkerKind::RenderQueueEntry, &id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_coordination_is_harmless() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        let fakes = Fakes::default();
        let pipeline = Pipeline::new(store.clone(), queue.clone(), fakes.services(), &test_config());

        let video = video_with_scenes(2);
        let id = video.id.clone();
        store.insert_video(video);
        store.insert_marker(MarkerKind::PendingVideo, &id);

        let task = QueueTask::CoordinateVideo(MarkerTask { video_id: id.clone() });
        pipeline.dispatch(&task).await.unwrap();
        pipeline.dispatch(&task).await.unwrap();

        assert_eq!(queue.count(TaskKind::GenerateImage), 2);
        assert_eq!(queue.count(TaskKind::SyncAssets), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coordination_interrupted_after_status_change_is_resumed() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        let fakes = Fakes::default();
        let pipeline = Pipeline::new(store.clone(), queue.clone(), fakes.services(), &test_config());

        let mut video = video_with_scenes(3);
        video.status = VideoStatus::ProcessingAssets;
        let id = video.id.clone();
        store.insert_video(video);
        store.insert_marker(MarkerKind::PendingVideo, &id);

        pipeline
            .dispatch(&QueueTask::CoordinateVideo(MarkerTask { video_id: id.clone() }))
            .await
            .unwrap();

        assert_eq!(queue.count(TaskKind::GenerateImage), 3);
        assert_eq!(queue.count(TaskKind::GenerateVoice), 3);
        assert_eq!(queue.count(TaskKind::SyncAssets), 1);
        assert!(!store.has_marker(MarkerKind::PendingVideo, &id));

        drain(&pipeline, &queue, 0).await;
        assert_eq!(store.video(&id).status, VideoStatus::RenderComplete);
    }
}
