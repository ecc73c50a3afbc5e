//! Scene image generation.

use std::sync::Arc;

use tracing::info;

use reelgen_clients::ImageJobState;
use reelgen_models::{SceneIndex, TrackStatus, VideoId};
use reelgen_queue::ImageTask;
use reelgen_storage::keys;

use crate::aggregate::Aggregators;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::polling::{poll_until, Poll, PollPolicy};
use crate::services::{AssetStore, ImageGenerator};
use crate::store::{ImageAsset, ImageTrack, PipelineStore, TrackStore, VideoReader};
use crate::scene_track::TrackWriter;

/// Progress range reported while the external job runs.
const POLL_PROGRESS: (f64, f64) = (0.1, 0.9);

/// Handler for `generate_image`.
pub struct ImageJobHandler {
    writer: TrackWriter<ImageTrack>,
    aggregators: Aggregators,
    images: Arc<dyn ImageGenerator>,
    assets: Arc<dyn AssetStore>,
    poll: PollPolicy,
}

impl ImageJobHandler {
    pub fn new<S>(
        store: Arc<S>,
        images: Arc<dyn ImageGenerator>,
        assets: Arc<dyn AssetStore>,
        config: &WorkerConfig,
    ) -> Self
    where
        S: VideoReader + TrackStore<ImageTrack> + PipelineStore + 'static,
    {
        Self {
            writer: TrackWriter::new(store.clone(), config.verify_attempts),
            aggregators: Aggregators::new(store, config.settle_threshold_chrono()),
            images,
            assets,
            poll: config.image_poll,
        }
    }

    pub async fn handle(&self, task: &ImageTask) -> WorkerResult<()> {
        let (video_id, index, prompt) = task
            .validated()
            .map_err(|e| WorkerError::invalid_task(e.to_string()))?;

        let result = self.generate(&video_id, index, prompt).await;
        self.writer.conclude(&self.aggregators, &video_id, index, result).await
    }

    async fn generate(&self, video_id: &VideoId, index: SceneIndex, prompt: &str) -> WorkerResult<()> {
        self.writer
            .set_status(video_id, index, TrackStatus::processing(POLL_PROGRESS.0))
            .await?;

        let job_id = self.images.submit(prompt).await?;
        info!(video_id = %video_id, scene_index = index, job_id = %job_id, "Image job submitted");

        let images = &self.images;
        let writer = &self.writer;
        let policy = self.poll;
        let job_ref = job_id.as_str();

        let job = poll_until(policy, move |attempt| async move {
            let job = images.status(job_ref).await?;
            if let Some(error) = job.error.as_deref().filter(|e| !e.trim().is_empty()) {
                return Err(WorkerError::generation_failed(format!("image job {}: {}", job.id, error)));
            }
            match job.status {
                ImageJobState::Succeeded => Ok(Poll::Ready(job)),
                ImageJobState::Failed | ImageJobState::Canceled => Err(WorkerError::generation_failed(format!(
                    "image job {} ended as {:?}",
                    job.id, job.status
                ))),
                ImageJobState::Queued | ImageJobState::Processing => {
                    let progress = policy.progress(attempt, POLL_PROGRESS.0, POLL_PROGRESS.1);
                    writer
                        .set_status(video_id, index, TrackStatus::processing(progress))
                        .await?;
                    Ok(Poll::Pending)
                }
            }
        })
        .await?
        .ok_or_else(|| {
            WorkerError::timeout(format!(
                "image job {} unfinished after {} polls",
                job_id, policy.max_attempts
            ))
        })?;

        let url = job
            .output_url()
            .ok_or_else(|| WorkerError::generation_failed(format!("image job {} has no output", job.id)))?;
        let image = self.images.download(url).await?;

        let key = keys::scene_image(video_id, index, keys::image_extension(&image.content_type));
        let stored = self.assets.put(&key, image.bytes, &image.content_type).await?;

        self.writer.record(video_id, index, &ImageAsset { url: stored }).await?;
        info!(video_id = %video_id, scene_index = index, "Scene image stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, video_with_scenes, Fakes, ImageScript, MemoryStore};
    use reelgen_models::{StatusMessage, VideoStatus};

    fn handler(store: &Arc<MemoryStore>, fakes: &Fakes) -> ImageJobHandler {
        let services = fakes.services();
        ImageJobHandler::new(store.clone(), services.images, services.assets, &test_config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_stored_and_track_completed() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        fakes.images.script(ImageScript::SucceedAfter(2));
        let video = video_with_scenes(2);
        let id = video.id.clone();
        store.insert_video(video);

        handler(&store, &fakes)
            .handle(&ImageTask::new(&id, 1, "a red fox"))
            .await
            .unwrap();

        let video = store.video(&id);
        assert_eq!(
            video.scenes[&1].image_url,
            format!("https://cdn.test/videos/{}/scenes/1/image.png", id)
        );
        assert_eq!(video.image_status[&1].status_message, StatusMessage::Completed);
        assert_eq!(video.image_status[&1].progress, 1.0);
        assert_eq!(video.image_status[&0].status_message, StatusMessage::Pending);
        assert_eq!(fakes.images.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_fields_drop_the_task() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        let task = ImageTask {
            video_id: Some("v1".into()),
            scene_index: None,
            image_prompt: Some("p".into()),
        };

        let err = handler(&store, &fakes).handle(&task).await.unwrap_err();
        assert!(err.is_invalid_task());
        assert_eq!(fakes.images.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfinished_job_fails_track_and_still_settles() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        fakes.images.script(ImageScript::Hang);
        let mut video = video_with_scenes(1);
        video.status = VideoStatus::ProcessingAssets;
        let id = video.id.clone();
        store.insert_video(video);
        store.update_video(&id, |v| {
            v.voice_status.insert(0, TrackStatus::completed());
        });

        handler(&store, &fakes)
            .handle(&ImageTask::new(&id, 0, "a red fox"))
            .await
            .unwrap();

        assert_eq!(fakes.images.polls(), 90);
        let video = store.video(&id);
        assert_eq!(video.image_status[&0].status_message, StatusMessage::Failed);
        assert_eq!(video.image_status[&0].progress, 0.0);
        assert_eq!(video.scene_status[&0].status_message, StatusMessage::Failed);
        // A failed image still counts as settled.
        assert_eq!(video.status, VideoStatus::AssetsReady);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_field_counts_as_failure() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        fakes.images.script(ImageScript::ErrorField("nsfw".into()));
        let video = video_with_scenes(1);
        let id = video.id.clone();
        store.insert_video(video);

        handler(&store, &fakes)
            .handle(&ImageTask::new(&id, 0, "a red fox"))
            .await
            .unwrap();

        assert_eq!(store.video(&id).image_status[&0].status_message, StatusMessage::Failed);
        assert!(fakes.assets.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_propagates_for_redelivery() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        fakes.assets.fail();
        let video = video_with_scenes(1);
        let id = video.id.clone();
        store.insert_video(video);

        let err = handler(&store, &fakes)
            .handle(&ImageTask::new(&id, 0, "a red fox"))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(store.video(&id).image_status[&0].status_message, StatusMessage::Processing);
    }
}
