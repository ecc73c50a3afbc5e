//! Task payloads for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use reelgen_models::{BulkJobId, ChannelId, Privacy, SceneIndex, StoryRequestId, TaskId, VideoId};

/// Handler a task is delivered to. Each kind has its own stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateImage,
    GenerateVoice,
    SyncAssets,
    CoordinateVideo,
    BuildScenes,
    GenerateStory,
    RenderVideo,
    PublishVideo,
    RunBulkJob,
}

impl TaskKind {
    pub const ALL: [TaskKind; 9] = [
        TaskKind::GenerateImage,
        TaskKind::GenerateVoice,
        TaskKind::SyncAssets,
        TaskKind::CoordinateVideo,
        TaskKind::BuildScenes,
        TaskKind::GenerateStory,
        TaskKind::RenderVideo,
        TaskKind::PublishVideo,
        TaskKind::RunBulkJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::GenerateImage => "generate_image",
            TaskKind::GenerateVoice => "generate_voice",
            TaskKind::SyncAssets => "sync_assets",
            TaskKind::CoordinateVideo => "coordinate_video",
            TaskKind::BuildScenes => "build_scenes",
            TaskKind::GenerateStory => "generate_story",
            TaskKind::RenderVideo => "render_video",
            TaskKind::PublishVideo => "publish_video",
            TaskKind::RunBulkJob => "run_bulk_job",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown task kind: {}", s))
    }
}

/// Required payload fields that were absent or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required fields: {}", .0.join(", "))]
pub struct MissingFields(pub Vec<&'static str>);

fn present<'a>(value: &'a Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> &'a str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            missing.push(name);
            ""
        }
    }
}

/// Generate one scene's image. Fields stay optional on the wire so a
/// malformed payload can be reported and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTask {
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub scene_index: Option<SceneIndex>,
    #[serde(default)]
    pub image_prompt: Option<String>,
}

impl ImageTask {
    pub fn new(video_id: &VideoId, scene_index: SceneIndex, image_prompt: impl Into<String>) -> Self {
        Self {
            video_id: Some(video_id.to_string()),
            scene_index: Some(scene_index),
            image_prompt: Some(image_prompt.into()),
        }
    }

    /// `(video_id, scene_index, image_prompt)` when all are present.
    pub fn validated(&self) -> Result<(VideoId, SceneIndex, &str), MissingFields> {
        let mut missing = Vec::new();
        let video_id = present(&self.video_id, "videoId", &mut missing);
        if self.scene_index.is_none() {
            missing.push("sceneIndex");
        }
        let prompt = present(&self.image_prompt, "imagePrompt", &mut missing);
        match self.scene_index {
            Some(index) if missing.is_empty() => Ok((VideoId::from(video_id), index, prompt)),
            _ => Err(MissingFields(missing)),
        }
    }
}

/// Generate one scene's narration audio and transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceTask {
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub scene_index: Option<SceneIndex>,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
}

impl VoiceTask {
    pub fn new(
        video_id: &VideoId,
        scene_index: SceneIndex,
        narration: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self {
            video_id: Some(video_id.to_string()),
            scene_index: Some(scene_index),
            narration: Some(narration.into()),
            voice_id: Some(voice_id.into()),
        }
    }

    /// `(video_id, scene_index, narration, voice_id)` when all are present.
    pub fn validated(&self) -> Result<(VideoId, SceneIndex, &str, &str), MissingFields> {
        let mut missing = Vec::new();
        let video_id = present(&self.video_id, "videoId", &mut missing);
        if self.scene_index.is_none() {
            missing.push("sceneIndex");
        }
        let narration = present(&self.narration, "narration", &mut missing);
        let voice_id = present(&self.voice_id, "voiceId", &mut missing);
        match self.scene_index {
            Some(index) if missing.is_empty() => Ok((VideoId::from(video_id), index, narration, voice_id)),
            _ => Err(MissingFields(missing)),
        }
    }
}

/// One readiness check; re-scheduled with `attempt + 1` until ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
    pub video_id: VideoId,
    #[serde(default)]
    pub attempt: u32,
}

/// Consumes a marker for `video_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerTask {
    pub video_id: VideoId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryTask {
    pub request_id: StoryRequestId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTask {
    pub video_id: VideoId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub publish_at: Option<String>,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTask {
    pub bulk_job_id: BulkJobId,
}

/// Every task the pipeline hands to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueTask {
    GenerateImage(ImageTask),
    GenerateVoice(VoiceTask),
    SyncAssets(SyncTask),
    CoordinateVideo(MarkerTask),
    BuildScenes(MarkerTask),
    GenerateStory(StoryTask),
    RenderVideo(MarkerTask),
    PublishVideo(PublishTask),
    RunBulkJob(BulkTask),
}

impl QueueTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            QueueTask::GenerateImage(_) => TaskKind::GenerateImage,
            QueueTask::GenerateVoice(_) => TaskKind::GenerateVoice,
            QueueTask::SyncAssets(_) => TaskKind::SyncAssets,
            QueueTask::CoordinateVideo(_) => TaskKind::CoordinateVideo,
            QueueTask::BuildScenes(_) => TaskKind::BuildScenes,
            QueueTask::GenerateStory(_) => TaskKind::GenerateStory,
            QueueTask::RenderVideo(_) => TaskKind::RenderVideo,
            QueueTask::PublishVideo(_) => TaskKind::PublishVideo,
            QueueTask::RunBulkJob(_) => TaskKind::RunBulkJob,
        }
    }

    /// The video the task concerns, for logging.
    pub fn video_id(&self) -> Option<String> {
        match self {
            QueueTask::GenerateImage(t) => t.video_id.clone(),
            QueueTask::GenerateVoice(t) => t.video_id.clone(),
            QueueTask::SyncAssets(t) => Some(t.video_id.to_string()),
            QueueTask::CoordinateVideo(t) | QueueTask::BuildScenes(t) | QueueTask::RenderVideo(t) => {
                Some(t.video_id.to_string())
            }
            QueueTask::PublishVideo(t) => Some(t.video_id.to_string()),
            QueueTask::GenerateStory(_) | QueueTask::RunBulkJob(_) => None,
        }
    }

    /// Key that suppresses duplicate enqueues of the same unit of work.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            QueueTask::GenerateImage(t) => Some(format!(
                "image:{}:{}",
                t.video_id.as_deref()?,
                t.scene_index?
            )),
            QueueTask::GenerateVoice(t) => Some(format!(
                "voice:{}:{}",
                t.video_id.as_deref()?,
                t.scene_index?
            )),
            QueueTask::SyncAssets(t) => Some(format!("sync:{}:{}", t.video_id, t.attempt)),
            QueueTask::GenerateStory(t) => Some(format!("story:{}", t.request_id)),
            QueueTask::RunBulkJob(t) => Some(format!("bulk:{}", t.bulk_job_id)),
            _ => None,
        }
    }
}

/// A task as stored in a stream or the delayed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    pub id: TaskId,
    /// 1-based delivery attempt.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub task: QueueTask,
}

impl TaskEnvelope {
    pub fn new(task: QueueTask) -> Self {
        Self {
            id: TaskId::new(),
            attempt: 1,
            enqueued_at: Utc::now(),
            task,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// Same task, next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}
