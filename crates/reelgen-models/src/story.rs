//! Story-generation requests.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{StoryRequestId, VideoId};
use crate::scene::{Scene, SceneIndex};

/// Lifecycle of a story-generation request.
///
/// `error` means the language model reported a failure, `failed` means the
/// result was unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
    Failed,
}

impl StoryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryStatus::Completed | StoryStatus::Error | StoryStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryScene {
    pub narration: String,
    pub image_prompt: String,
}

/// Script produced by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scenes: Vec<StoryScene>,
}

impl Story {
    /// Scenes keyed by dense 0-based index.
    pub fn to_scenes(&self) -> BTreeMap<SceneIndex, Scene> {
        self.scenes
            .iter()
            .enumerate()
            .map(|(i, s)| (i as SceneIndex, Scene::new(&s.narration, &s.image_prompt)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryRequest {
    pub id: StoryRequestId,
    pub video_id: VideoId,
    pub prompt: String,
    #[serde(default)]
    pub content_type_id: Option<String>,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default)]
    pub story: Option<Story>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoryRequest {
    pub fn new(video_id: VideoId, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: StoryRequestId::new(),
            video_id,
            prompt: prompt.into(),
            content_type_id: None,
            status: StoryStatus::Pending,
            story: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_content_type(mut self, content_type_id: impl Into<String>) -> Self {
        self.content_type_id = Some(content_type_id.into());
        self
    }
}
