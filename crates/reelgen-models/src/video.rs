//! The video project record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::{BulkJobId, StoryRequestId, VideoId};
use crate::scene::{Scene, SceneIndex, TrackStatus};
use crate::status::VideoStatus;

/// Progress of the external render job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatus {
    pub progress: f64,
    /// Renderer job id, recorded once the job is submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_id: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Upload progress on one publishing platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub progress: f64,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

/// One video project.
///
/// The key sets of `scenes`, `scene_status`, `image_status` and
/// `voice_status` are identical once scenes are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: VideoStatus,

    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub content_type_id: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub voice_id: String,
    /// Opaque styling handed to the renderer.
    #[serde(default)]
    pub style: serde_json::Value,
    #[serde(default)]
    pub bulk_job_id: Option<BulkJobId>,
    #[serde(default)]
    pub story_request_id: Option<StoryRequestId>,

    #[serde(default)]
    pub scenes: BTreeMap<SceneIndex, Scene>,
    #[serde(default)]
    pub scene_status: BTreeMap<SceneIndex, TrackStatus>,
    #[serde(default)]
    pub image_status: BTreeMap<SceneIndex, TrackStatus>,
    #[serde(default)]
    pub voice_status: BTreeMap<SceneIndex, TrackStatus>,
    #[serde(default)]
    pub render_status: RenderStatus,
    /// Keyed by platform name.
    #[serde(default)]
    pub upload_status: BTreeMap<String, UploadStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// A new record holding drafting metadata only.
    pub fn draft(user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            user_id: user_id.into(),
            title: String::new(),
            description: String::new(),
            status: VideoStatus::Draft,
            template_id: None,
            content_type_id: None,
            prompt: prompt.into(),
            voice_id: String::new(),
            style: serde_json::Value::Null,
            bulk_job_id: None,
            story_request_id: None,
            scenes: BTreeMap::new(),
            scene_status: BTreeMap::new(),
            image_status: BTreeMap::new(),
            voice_status: BTreeMap::new(),
            render_status: RenderStatus::default(),
            upload_status: BTreeMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: VideoId) -> Self {
        self.id = id;
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>, content_type_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self.content_type_id = Some(content_type_id.into());
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_style(mut self, style: serde_json::Value) -> Self {
        self.style = style;
        self
    }

    pub fn with_bulk_job(mut self, bulk_job_id: BulkJobId) -> Self {
        self.bulk_job_id = Some(bulk_job_id);
        self
    }

    pub fn with_story_request(mut self, request_id: StoryRequestId) -> Self {
        self.story_request_id = Some(request_id);
        self
    }

    /// Install scenes together with pending entries on every status track.
    pub fn with_scenes(mut self, scenes: BTreeMap<SceneIndex, Scene>) -> Self {
        for index in scenes.keys() {
            self.scene_status.insert(*index, TrackStatus::pending());
            self.image_status.insert(*index, TrackStatus::pending());
            self.voice_status.insert(*index, TrackStatus::pending());
        }
        self.scenes = scenes;
        self
    }

    pub fn has_scenes(&self) -> bool {
        !self.scenes.is_empty()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Whether every status track has exactly the scene key set.
    pub fn tracks_match_scenes(&self) -> bool {
        let keys = || self.scenes.keys();
        keys().eq(self.scene_status.keys())
            && keys().eq(self.image_status.keys())
            && keys().eq(self.voice_status.keys())
    }

    pub fn rendered_url(&self) -> Option<&str> {
        self.render_status
            .video_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

/// Opaque optimistic-concurrency token of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record read together with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }
}
