//! Shared write path of the scene asset workers.

use std::sync::Arc;

use tracing::{debug, warn};

use reelgen_models::{SceneIndex, TrackStatus, VideoId};

use crate::aggregate::Aggregators;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::store::{AssetTrack, TrackStore, VideoReader};

/// Writes one track's status and scene leaves, and nothing else.
pub struct TrackWriter<T: AssetTrack> {
    videos: Arc<dyn VideoReader>,
    track: Arc<dyn TrackStore<T>>,
    verify_attempts: u32,
}

impl<T: AssetTrack> Clone for TrackWriter<T> {
    fn clone(&self) -> Self {
        Self {
            videos: Arc::clone(&self.videos),
            track: Arc::clone(&self.track),
            verify_attempts: self.verify_attempts,
        }
    }
}

impl<T: AssetTrack> TrackWriter<T> {
    pub fn new<S>(store: Arc<S>, verify_attempts: u32) -> Self
    where
        S: VideoReader + TrackStore<T> + 'static,
    {
        Self {
            videos: store.clone(),
            track: store,
            verify_attempts: verify_attempts.max(1),
        }
    }

    pub async fn set_status(&self, video_id: &VideoId, index: SceneIndex, status: TrackStatus) -> WorkerResult<()> {
        self.track.set_track_status(video_id, index, &status).await
    }

    /// Merge `asset` into the scene, confirm it by reading the record back,
    /// then mark the track completed.
    pub async fn record(&self, video_id: &VideoId, index: SceneIndex, asset: &T::Asset) -> WorkerResult<()> {
        self.track.merge_asset(video_id, index, asset).await?;

        for attempt in 1..=self.verify_attempts {
            let recorded = self
                .videos
                .get_video(video_id)
                .await?
                .and_then(|v| v.value.scenes.get(&index).map(|scene| T::is_recorded(scene, asset)))
                .unwrap_or(false);

            if recorded {
                debug!(video_id = %video_id, scene_index = index, track = T::NAME, "Asset merge verified");
                return self.set_status(video_id, index, TrackStatus::completed()).await;
            }

            warn!(
                video_id = %video_id,
                scene_index = index,
                track = T::NAME,
                attempt,
                "Asset not visible after merge, merging again"
            );
            self.track.merge_asset(video_id, index, asset).await?;
        }

        Err(WorkerError::not_persisted(format!(
            "{} asset for scene {} of video {}",
            T::NAME,
            index,
            video_id
        )))
    }

    /// Settle a scene worker's result and run both aggregators.
    ///
    /// External-service failures are recorded as `failed` and swallowed;
    /// everything else propagates. The aggregators run either way.
    pub async fn conclude(
        &self,
        aggregators: &Aggregators,
        video_id: &VideoId,
        index: SceneIndex,
        result: WorkerResult<()>,
    ) -> WorkerResult<()> {
        let result = match result {
            Ok(()) => {
                metrics::record_track_outcome(T::NAME, "completed");
                Ok(())
            }
            Err(e) if e.is_external() => {
                warn!(
                    video_id = %video_id,
                    scene_index = index,
                    track = T::NAME,
                    error = %e,
                    "Generation failed, marking track failed"
                );
                metrics::record_track_outcome(T::NAME, "failed");
                self.set_status(video_id, index, TrackStatus::failed()).await
            }
            Err(e) => Err(e),
        };

        let aggregated = aggregators.after_scene(video_id, index).await;
        match result {
            Ok(()) => aggregated.map(|_| ()),
            Err(e) => {
                if let Err(agg) = aggregated {
                    warn!(video_id = %video_id, error = %agg, "Aggregation after failure also failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ImageAsset, ImageTrack};
    use crate::testing::{video_with_scenes, MemoryStore};
    use reelgen_models::StatusMessage;

    #[tokio::test]
    async fn test_lost_merge_is_repaired_by_verification() {
        let store = MemoryStore::new();
        let video = video_with_scenes(1);
        let id = video.id.clone();
        store.insert_video(video);
        store.drop_merges(1);

        let writer: TrackWriter<ImageTrack> = TrackWriter::new(store.clone(), 3);
        let asset = ImageAsset { url: "https://cdn.test/a.png".into() };
        writer.record(&id, 0, &asset).await.unwrap();

        let video = store.video(&id);
        assert_eq!(video.scenes[&0].image_url, "https://cdn.test/a.png");
        assert_eq!(video.image_status[&0].status_message, StatusMessage::Completed);
    }

    #[tokio::test]
    async fn test_merge_that_never_sticks_is_reported() {
        let store = MemoryStore::new();
        let video = video_with_scenes(1);
        let id = video.id.clone();
        store.insert_video(video);
        store.drop_merges(4);

        let writer: TrackWriter<ImageTrack> = TrackWriter::new(store.clone(), 3);
        let err = writer
            .record(&id, 0, &ImageAsset { url: "u".into() })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::NotPersisted(_)));
        assert_eq!(store.video(&id).image_status[&0].status_message, StatusMessage::Pending);
    }
}
