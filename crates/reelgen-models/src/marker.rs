//! Single-use stage signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::VideoId;

/// Which stage a marker signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    PendingVideo,
    RenderQueueEntry,
    StoryRequest,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::PendingVideo => "pending-video",
            MarkerKind::RenderQueueEntry => "render-queue-entry",
            MarkerKind::StoryRequest => "story-request",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Video `video_id` is ready for stage `kind`." One marker per kind and video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub video_id: VideoId,
    pub created_at: DateTime<Utc>,
}

impl Marker {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            created_at: Utc::now(),
        }
    }
}
