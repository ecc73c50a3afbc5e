//! Video records.

use std::collections::BTreeMap;

use tracing::{debug, info};

use reelgen_models::{
    RenderStatus, Scene, SceneIndex, TrackStatus, UploadStatus, Version, Versioned, Video, VideoId,
    VideoStatus,
};

use super::collections::VIDEOS;
use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::fields::{FieldPath, FieldUpdates};
use crate::types::{encode_fields, to_value};

/// Per-scene status track stored on the video record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Scene,
    Image,
    Voice,
}

impl Track {
    pub fn field(&self) -> &'static str {
        match self {
            Track::Scene => "sceneStatus",
            Track::Image => "imageStatus",
            Track::Voice => "voiceStatus",
        }
    }
}

/// Repository for `videos/{videoId}`.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<Versioned<Video>>> {
        match self.client.get_document(VIDEOS, video_id.as_str()).await? {
            Some(doc) => Ok(Some(Versioned::new(doc.decode()?, doc.version()?))),
            None => Ok(None),
        }
    }

    pub async fn create(&self, video: &Video) -> FirestoreResult<()> {
        self.client
            .create_document(VIDEOS, video.id.as_str(), encode_fields(video)?)
            .await?;
        info!(video_id = %video.id, "Created video record");
        Ok(())
    }

    /// Masked write stamped with `updatedAt`; returns the new version.
    pub async fn update(&self, video_id: &VideoId, updates: FieldUpdates) -> FirestoreResult<Version> {
        self.client
            .update_document(VIDEOS, video_id.as_str(), updates.touch())
            .await?
            .version()
    }

    /// Masked write that only applies while the record is at `version`.
    pub async fn update_if_unchanged(
        &self,
        video_id: &VideoId,
        version: &Version,
        updates: FieldUpdates,
    ) -> FirestoreResult<Version> {
        self.client
            .update_document_if_unchanged(VIDEOS, video_id.as_str(), updates.touch(), version)
            .await?
            .version()
    }

    pub async fn set_track_status(
        &self,
        video_id: &VideoId,
        track: Track,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> FirestoreResult<()> {
        debug!(
            video_id = %video_id,
            track = track.field(),
            scene_index = index,
            status = %status.status_message,
            progress = status.progress,
            "Writing track status"
        );
        let path = FieldPath::new(track.field()).index(index);
        self.update(video_id, FieldUpdates::new().set(path, to_value(status)?))
            .await?;
        Ok(())
    }

    /// Write individual leaves of `scenes[index]`, leaving the rest of the
    /// scene as the server currently has it.
    pub async fn merge_scene_fields(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        leaves: Vec<(&str, serde_json::Value)>,
    ) -> FirestoreResult<()> {
        let updates = leaves.into_iter().fold(FieldUpdates::new(), |updates, (leaf, value)| {
            updates.set(FieldPath::new("scenes").index(index).child(leaf), value)
        });
        self.update(video_id, updates).await?;
        Ok(())
    }

    /// Install scenes and pending entries on all three tracks in one write.
    pub async fn initialize_scenes(
        &self,
        video_id: &VideoId,
        scenes: &BTreeMap<SceneIndex, Scene>,
    ) -> FirestoreResult<()> {
        let pending: BTreeMap<SceneIndex, TrackStatus> =
            scenes.keys().map(|i| (*i, TrackStatus::pending())).collect();
        let pending = to_value(&pending)?;

        let updates = FieldUpdates::new()
            .set(FieldPath::new("scenes"), to_value(scenes)?)
            .set(FieldPath::new(Track::Scene.field()), pending.clone())
            .set(FieldPath::new(Track::Image.field()), pending.clone())
            .set(FieldPath::new(Track::Voice.field()), pending);
        self.update(video_id, updates).await?;
        info!(video_id = %video_id, scenes = scenes.len(), "Initialized scenes");
        Ok(())
    }

    /// Compare-and-swap of the pipeline status.
    pub async fn transition_status(
        &self,
        video_id: &VideoId,
        version: &Version,
        next: VideoStatus,
    ) -> FirestoreResult<Version> {
        let updates = FieldUpdates::new().set(FieldPath::new("status"), next.as_str());
        self.update_if_unchanged(video_id, version, updates).await
    }

    /// Terminal failure: `status = error` with a message.
    pub async fn fail(&self, video_id: &VideoId, message: &str) -> FirestoreResult<()> {
        let updates = FieldUpdates::new()
            .set(FieldPath::new("status"), VideoStatus::Error.as_str())
            .set(FieldPath::new("error"), message);
        self.update(video_id, updates).await?;
        info!(video_id = %video_id, error = message, "Video marked as error");
        Ok(())
    }

    pub async fn set_render_state(
        &self,
        video_id: &VideoId,
        status: Option<VideoStatus>,
        render: &RenderStatus,
    ) -> FirestoreResult<()> {
        let mut updates = FieldUpdates::new().set(FieldPath::new("renderStatus"), to_value(render)?);
        if let Some(status) = status {
            updates = updates.set(FieldPath::new("status"), status.as_str());
        }
        self.update(video_id, updates).await?;
        Ok(())
    }

    /// Enter `processing:render` with a fresh `renderStatus`, guarded by `version`.
    pub async fn begin_render(&self, video_id: &VideoId, version: &Version) -> FirestoreResult<Version> {
        let updates = FieldUpdates::new()
            .set(FieldPath::new("status"), VideoStatus::ProcessingRender.as_str())
            .set(FieldPath::new("renderStatus"), to_value(&RenderStatus::default())?);
        self.update_if_unchanged(video_id, version, updates).await
    }

    pub async fn set_render_progress(&self, video_id: &VideoId, progress: f64) -> FirestoreResult<()> {
        let path = FieldPath::new("renderStatus").child("progress");
        self.update(video_id, FieldUpdates::new().set(path, progress)).await?;
        Ok(())
    }

    pub async fn set_render_id(&self, video_id: &VideoId, render_id: &str) -> FirestoreResult<()> {
        let path = FieldPath::new("renderStatus").child("renderId");
        self.update(video_id, FieldUpdates::new().set(path, render_id)).await?;
        Ok(())
    }

    pub async fn set_upload_status(
        &self,
        video_id: &VideoId,
        platform: &str,
        upload: &UploadStatus,
    ) -> FirestoreResult<()> {
        let path = FieldPath::new("uploadStatus").child(platform);
        self.update(video_id, FieldUpdates::new().set(path, to_value(upload)?))
            .await?;
        Ok(())
    }

    pub async fn set_upload_progress(&self, video_id: &VideoId, platform: &str, progress: f64) -> FirestoreResult<()> {
        let path = FieldPath::new("uploadStatus").child(platform).child("progress");
        self.update(video_id, FieldUpdates::new().set(path, progress)).await?;
        Ok(())
    }
}
