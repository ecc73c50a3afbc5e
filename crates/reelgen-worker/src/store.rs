//! Record-store capabilities, one trait per owner.
//!
//! The video record is shared by every handler, but each handler is handed
//! only the traits for the sub-fields it owns: a scene worker can write its
//! own track and scene leaves, only the aggregators and coordinator move
//! `status`, and so on. [`FirestoreStore`] implements all of them.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::json;

use reelgen_firestore::{
    BulkJobRepository, CatalogRepository, ChannelRepository, FirestoreClient, MarkerRepository,
    StoryRequestRepository, Track, VideoRepository,
};
use reelgen_models::{
    BulkJob, BulkJobId, BulkJobStatus, BulkOutcome, Channel, ChannelCredentials, ChannelId,
    ContentType, MarkerKind, RenderStatus, Scene, SceneIndex, Story, StoryRequest, StoryRequestId,
    StoryStatus, Template, TrackStatus, UploadStatus, Version, Versioned, Video, VideoId,
    VideoStatus, WordTiming,
};

use crate::error::WorkerResult;

/// Outcome of a compare-and-swap status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The record changed since it was read.
    Conflict,
}

/// One per-scene asset track: its status map and the scene leaves it fills.
pub trait AssetTrack: Send + Sync + 'static {
    const NAME: &'static str;
    const TRACK: Track;
    type Asset: Clone + fmt::Debug + Send + Sync;

    /// Scene leaves written for `asset`.
    fn scene_fields(asset: &Self::Asset) -> Vec<(&'static str, serde_json::Value)>;

    fn apply(scene: &mut Scene, asset: &Self::Asset);

    /// Whether `scene` already carries `asset`.
    fn is_recorded(scene: &Scene, asset: &Self::Asset) -> bool;

    fn statuses(video: &Video) -> &BTreeMap<SceneIndex, TrackStatus>;

    fn statuses_mut(video: &mut Video) -> &mut BTreeMap<SceneIndex, TrackStatus>;
}

pub struct ImageTrack;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub url: String,
}

impl AssetTrack for ImageTrack {
    const NAME: &'static str = "image";
    const TRACK: Track = Track::Image;
    type Asset = ImageAsset;

    fn scene_fields(asset: &ImageAsset) -> Vec<(&'static str, serde_json::Value)> {
        vec![("imageUrl", json!(asset.url))]
    }

    fn apply(scene: &mut Scene, asset: &ImageAsset) {
        scene.image_url = asset.url.clone();
    }

    fn is_recorded(scene: &Scene, asset: &ImageAsset) -> bool {
        scene.image_url == asset.url
    }

    fn statuses(video: &Video) -> &BTreeMap<SceneIndex, TrackStatus> {
        &video.image_status
    }

    fn statuses_mut(video: &mut Video) -> &mut BTreeMap<SceneIndex, TrackStatus> {
        &mut video.image_status
    }
}

pub struct VoiceTrack;

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceAsset {
    pub url: String,
    pub captions: String,
    pub words: Vec<WordTiming>,
}

impl AssetTrack for VoiceTrack {
    const NAME: &'static str = "voice";
    const TRACK: Track = Track::Voice;
    type Asset = VoiceAsset;

    fn scene_fields(asset: &VoiceAsset) -> Vec<(&'static str, serde_json::Value)> {
        vec![
            ("voiceUrl", json!(asset.url)),
            ("captions", json!(asset.captions)),
            ("captionsWords", json!(asset.words)),
        ]
    }

    fn apply(scene: &mut Scene, asset: &VoiceAsset) {
        scene.voice_url = asset.url.clone();
        scene.captions = asset.captions.clone();
        scene.captions_words = asset.words.clone();
    }

    fn is_recorded(scene: &Scene, asset: &VoiceAsset) -> bool {
        scene.voice_url == asset.url && scene.captions_words.len() == asset.words.len()
    }

    fn statuses(video: &Video) -> &BTreeMap<SceneIndex, TrackStatus> {
        &video.voice_status
    }

    fn statuses_mut(video: &mut Video) -> &mut BTreeMap<SceneIndex, TrackStatus> {
        &mut video.voice_status
    }
}

/// Read access to video records, shared by every handler.
#[async_trait]
pub trait VideoReader: Send + Sync {
    async fn get_video(&self, video_id: &VideoId) -> WorkerResult<Option<Versioned<Video>>>;
}

/// Writes owned by one scene asset worker.
#[async_trait]
pub trait TrackStore<T: AssetTrack>: Send + Sync {
    async fn set_track_status(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> WorkerResult<()>;

    /// Write the asset's scene leaves against the current record.
    async fn merge_asset(&self, video_id: &VideoId, index: SceneIndex, asset: &T::Asset) -> WorkerResult<()>;
}

/// Pipeline-level writes: `status`, `sceneStatus` and the scene set.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn set_scene_status(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> WorkerResult<()>;

    /// Install scenes with pending entries on every track.
    async fn initialize_scenes(
        &self,
        video_id: &VideoId,
        scenes: &BTreeMap<SceneIndex, Scene>,
    ) -> WorkerResult<()>;

    /// Move `status` to `next` only while the record is at `expected`.
    async fn transition_status(
        &self,
        video_id: &VideoId,
        expected: &Version,
        next: VideoStatus,
    ) -> WorkerResult<Transition>;

    /// Terminal failure with a message.
    async fn fail_video(&self, video_id: &VideoId, message: &str) -> WorkerResult<()>;
}

/// `renderStatus` and the render stages of `status`.
#[async_trait]
pub trait RenderStore: Send + Sync {
    /// `processing:render` with a fresh `renderStatus`, guarded by `expected`.
    async fn begin_render(&self, video_id: &VideoId, expected: &Version) -> WorkerResult<Transition>;

    async fn set_render_progress(&self, video_id: &VideoId, progress: f64) -> WorkerResult<()>;

    /// Remember the submitted job so a redelivery can resume polling it.
    async fn set_render_id(&self, video_id: &VideoId, render_id: &str) -> WorkerResult<()>;

    async fn finish_render(
        &self,
        video_id: &VideoId,
        status: VideoStatus,
        render: &RenderStatus,
    ) -> WorkerResult<()>;
}

/// `uploadStatus.<platform>`.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn set_upload_status(
        &self,
        video_id: &VideoId,
        platform: &str,
        upload: &UploadStatus,
    ) -> WorkerResult<()>;

    async fn set_upload_progress(&self, video_id: &VideoId, platform: &str, progress: f64) -> WorkerResult<()>;
}

/// Stage markers keyed by video id.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// False when the marker already exists.
    async fn create_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool>;

    async fn marker_exists(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool>;

    /// Succeeds when the marker is already gone.
    async fn delete_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<()>;
}

/// Bulk job records and the videos a bulk job creates.
#[async_trait]
pub trait BulkStore: Send + Sync {
    async fn get_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJob>>;

    async fn create_bulk_job(&self, job: &BulkJob) -> WorkerResult<()>;

    /// Move a running job to `cancelled`; terminal jobs keep their status.
    /// Returns the resulting status, or `None` when the job does not exist.
    async fn cancel_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJobStatus>>;

    /// Set the status unless the job was cancelled meanwhile. Returns the
    /// status the job holds afterwards.
    async fn set_bulk_status(
        &self,
        id: &BulkJobId,
        status: BulkJobStatus,
        error: Option<&str>,
    ) -> WorkerResult<BulkJobStatus>;

    async fn record_bulk_outcome(&self, id: &BulkJobId, outcome: &BulkOutcome) -> WorkerResult<()>;

    async fn create_video(&self, video: &Video) -> WorkerResult<()>;
}

/// Story-generation requests.
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn create_story_request(&self, request: &StoryRequest) -> WorkerResult<()>;

    async fn get_story_request(&self, id: &StoryRequestId) -> WorkerResult<Option<StoryRequest>>;

    async fn set_story_status(&self, id: &StoryRequestId, status: StoryStatus, error: Option<&str>) -> WorkerResult<()>;

    async fn complete_story(&self, id: &StoryRequestId, story: &Story) -> WorkerResult<()>;
}

/// Templates and content types.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn template(&self, id: &str) -> WorkerResult<Option<Template>>;

    async fn content_type(&self, id: &str) -> WorkerResult<Option<ContentType>>;
}

/// Publishing channels and their credentials.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_channel(&self, id: &ChannelId) -> WorkerResult<Option<Channel>>;

    async fn save_credentials(&self, id: &ChannelId, credentials: &ChannelCredentials) -> WorkerResult<()>;
}

/// Every store capability backed by Firestore.
#[derive(Clone)]
pub struct FirestoreStore {
    videos: VideoRepository,
    markers: MarkerRepository,
    bulk_jobs: BulkJobRepository,
    stories: StoryRequestRepository,
    catalog: CatalogRepository,
    channels: ChannelRepository,
}

impl FirestoreStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            videos: VideoRepository::new(client.clone()),
            markers: MarkerRepository::new(client.clone()),
            bulk_jobs: BulkJobRepository::new(client.clone()),
            stories: StoryRequestRepository::new(client.clone()),
            catalog: CatalogRepository::new(client.clone()),
            channels: ChannelRepository::new(client),
        }
    }
}

#[async_trait]
impl VideoReader for FirestoreStore {
    async fn get_video(&self, video_id: &VideoId) -> WorkerResult<Option<Versioned<Video>>> {
        Ok(self.videos.get(video_id).await?)
    }
}

#[async_trait]
impl<T: AssetTrack> TrackStore<T> for FirestoreStore {
    async fn set_track_status(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> WorkerResult<()> {
        Ok(self.videos.set_track_status(video_id, T::TRACK, index, status).await?)
    }

    async fn merge_asset(&self, video_id: &VideoId, index: SceneIndex, asset: &T::Asset) -> WorkerResult<()> {
        Ok(self
            .videos
            .merge_scene_fields(video_id, index, T::scene_fields(asset))
            .await?)
    }
}

#[async_trait]
impl PipelineStore for FirestoreStore {
    async fn set_scene_status(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> WorkerResult<()> {
        Ok(self.videos.set_track_status(video_id, Track::Scene, index, status).await?)
    }

    async fn initialize_scenes(
        &self,
        video_id: &VideoId,
        scenes: &BTreeMap<SceneIndex, Scene>,
    ) -> WorkerResult<()> {
        Ok(self.videos.initialize_scenes(video_id, scenes).await?)
    }

    async fn transition_status(
        &self,
        video_id: &VideoId,
        expected: &Version,
        next: VideoStatus,
    ) -> WorkerResult<Transition> {
        match self.videos.transition_status(video_id, expected, next).await {
            Ok(_) => Ok(Transition::Applied),
            Err(e) if e.is_precondition_failed() => Ok(Transition::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn fail_video(&self, video_id: &VideoId, message: &str) -> WorkerResult<()> {
        Ok(self.videos.fail(video_id, message).await?)
    }
}

#[async_trait]
impl RenderStore for FirestoreStore {
    async fn begin_render(&self, video_id: &VideoId, expected: &Version) -> WorkerResult<Transition> {
        match self.videos.begin_render(video_id, expected).await {
            Ok(_) => Ok(Transition::Applied),
            Err(e) if e.is_precondition_failed() => Ok(Transition::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_render_progress(&self, video_id: &VideoId, progress: f64) -> WorkerResult<()> {
        Ok(self.videos.set_render_progress(video_id, progress).await?)
    }

    async fn set_render_id(&self, video_id: &VideoId, render_id: &str) -> WorkerResult<()> {
        Ok(self.videos.set_render_id(video_id, render_id).await?)
    }

    async fn finish_render(
        &self,
        video_id: &VideoId,
        status: VideoStatus,
        render: &RenderStatus,
    ) -> WorkerResult<()> {
        Ok(self.videos.set_render_state(video_id, Some(status), render).await?)
    }
}

#[async_trait]
impl UploadStore for FirestoreStore {
    async fn set_upload_status(
        &self,
        video_id: &VideoId,
        platform: &str,
        upload: &UploadStatus,
    ) -> WorkerResult<()> {
        Ok(self.videos.set_upload_status(video_id, platform, upload).await?)
    }

    async fn set_upload_progress(&self, video_id: &VideoId, platform: &str, progress: f64) -> WorkerResult<()> {
        Ok(self.videos.set_upload_progress(video_id, platform, progress).await?)
    }
}

#[async_trait]
impl MarkerStore for FirestoreStore {
    async fn create_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.markers.create(kind, video_id).await?)
    }

    async fn marker_exists(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.markers.exists(kind, video_id).await?)
    }

    async fn delete_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<()> {
        Ok(self.markers.delete(kind, video_id).await?)
    }
}

#[async_trait]
impl BulkStore for FirestoreStore {
    async fn get_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJob>> {
        Ok(self.bulk_jobs.get(id).await?.map(|job| job.value))
    }

    async fn create_bulk_job(&self, job: &BulkJob) -> WorkerResult<()> {
        Ok(self.bulk_jobs.create(job).await?)
    }

    async fn cancel_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJobStatus>> {
        match self.bulk_jobs.cancel(id).await {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_bulk_status(
        &self,
        id: &BulkJobId,
        status: BulkJobStatus,
        error: Option<&str>,
    ) -> WorkerResult<BulkJobStatus> {
        Ok(self.bulk_jobs.set_status(id, status, error).await?)
    }

    async fn record_bulk_outcome(&self, id: &BulkJobId, outcome: &BulkOutcome) -> WorkerResult<()> {
        Ok(self.bulk_jobs.record_outcome(id, outcome).await?)
    }

    async fn create_video(&self, video: &Video) -> WorkerResult<()> {
        Ok(self.videos.create(video).await?)
    }
}

#[async_trait]
impl StoryStore for FirestoreStore {
    async fn create_story_request(&self, request: &StoryRequest) -> WorkerResult<()> {
        Ok(self.stories.create(request).await?)
    }

    async fn get_story_request(&self, id: &StoryRequestId) -> WorkerResult<Option<StoryRequest>> {
        Ok(self.stories.get(id).await?)
    }

    async fn set_story_status(&self, id: &StoryRequestId, status: StoryStatus, error: Option<&str>) -> WorkerResult<()> {
        Ok(self.stories.set_status(id, status, error).await?)
    }

    async fn complete_story(&self, id: &StoryRequestId, story: &Story) -> WorkerResult<()> {
        Ok(self.stories.complete(id, story).await?)
    }
}

#[async_trait]
impl CatalogReader for FirestoreStore {
    async fn template(&self, id: &str) -> WorkerResult<Option<Template>> {
        Ok(self.catalog.template(id).await?)
    }

    async fn content_type(&self, id: &str) -> WorkerResult<Option<ContentType>> {
        Ok(self.catalog.content_type(id).await?)
    }
}

#[async_trait]
impl ChannelStore for FirestoreStore {
    async fn get_channel(&self, id: &ChannelId) -> WorkerResult<Option<Channel>> {
        Ok(self.channels.get(id).await?)
    }

    async fn save_credentials(&self, id: &ChannelId, credentials: &ChannelCredentials) -> WorkerResult<()> {
        Ok(self.channels.save_credentials(id, credentials).await?)
    }
}
