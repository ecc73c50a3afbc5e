//! Scenes and their per-track status entries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense, 0-based position of a scene within its video.
pub type SceneIndex = u32;

/// One narrated beat of a video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub narration: String,
    pub image_prompt: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub voice_url: String,
    #[serde(default)]
    pub captions: String,
    #[serde(default)]
    pub captions_words: Vec<WordTiming>,
}

impl Scene {
    /// A freshly generated scene with no assets yet.
    pub fn new(narration: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        Self {
            narration: narration.into(),
            image_prompt: image_prompt.into(),
            ..Default::default()
        }
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }

    pub fn has_voice(&self) -> bool {
        !self.voice_url.is_empty()
    }
}

/// Word-level timing from transcription, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Status of one track (image, voice or combined scene) for one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusMessage {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StatusMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusMessage::Pending => "pending",
            StatusMessage::Processing => "processing",
            StatusMessage::Completed => "completed",
            StatusMessage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusMessage::Completed | StatusMessage::Failed)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{statusMessage, progress, updatedAt}` entry of a status track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatus {
    pub status_message: StatusMessage,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
    pub updated_at: DateTime<Utc>,
}

impl TrackStatus {
    pub fn new(status_message: StatusMessage, progress: f64) -> Self {
        Self {
            status_message,
            progress: progress.clamp(0.0, 1.0),
            updated_at: Utc::now(),
        }
    }

    pub fn pending() -> Self {
        Self::new(StatusMessage::Pending, 0.0)
    }

    pub fn processing(progress: f64) -> Self {
        Self::new(StatusMessage::Processing, progress)
    }

    pub fn completed() -> Self {
        Self::new(StatusMessage::Completed, 1.0)
    }

    pub fn failed() -> Self {
        Self::new(StatusMessage::Failed, 0.0)
    }

    /// Same entry with an explicit timestamp.
    pub fn at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }
}
