//! Bulk generation jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{BulkJobId, VideoId};

/// Lifecycle of a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BulkJobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
    Cancelled,
    Failed,
}

impl BulkJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkJobStatus::Queued => "queued",
            BulkJobStatus::Processing => "processing",
            BulkJobStatus::Completed => "completed",
            BulkJobStatus::CompletedWithErrors => "completed_with_errors",
            BulkJobStatus::Cancelled => "cancelled",
            BulkJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BulkJobStatus::Queued | BulkJobStatus::Processing)
    }

    /// Final status from the iteration tally.
    pub fn from_outcome(succeeded: usize, failed: usize) -> Self {
        if succeeded == 0 {
            BulkJobStatus::Failed
        } else if failed > 0 {
            BulkJobStatus::CompletedWithErrors
        } else {
            BulkJobStatus::Completed
        }
    }
}

impl fmt::Display for BulkJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to generate `count` videos from one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkJob {
    pub id: BulkJobId,
    pub user_id: String,
    pub template_id: String,
    pub count: u32,
    #[serde(default)]
    pub topic_prompt: String,
    #[serde(default)]
    pub status: BulkJobStatus,
    /// Fraction of iterations finished, in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub completed_videos: Vec<VideoId>,
    #[serde(default)]
    pub failed_videos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkJob {
    pub fn new(
        user_id: impl Into<String>,
        template_id: impl Into<String>,
        count: u32,
        topic_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BulkJobId::new(),
            user_id: user_id.into(),
            template_id: template_id.into(),
            count,
            topic_prompt: topic_prompt.into(),
            status: BulkJobStatus::Queued,
            progress: 0.0,
            completed_videos: Vec::new(),
            failed_videos: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Mutable part of a bulk job written by the orchestrator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkOutcome {
    pub progress: f64,
    pub completed_videos: Vec<VideoId>,
    pub failed_videos: Vec<String>,
}

impl BulkOutcome {
    pub fn record_success(&mut self, video_id: VideoId, total: u32) {
        self.completed_videos.push(video_id);
        self.update_progress(total);
    }

    pub fn record_failure(&mut self, entry: impl Into<String>, total: u32) {
        self.failed_videos.push(entry.into());
        self.update_progress(total);
    }

    pub fn finished(&self) -> usize {
        self.completed_videos.len() + self.failed_videos.len()
    }

    pub fn final_status(&self) -> BulkJobStatus {
        BulkJobStatus::from_outcome(self.completed_videos.len(), self.failed_videos.len())
    }

    fn update_progress(&mut self, total: u32) {
        self.progress = if total == 0 {
            1.0
        } else {
            (self.finished() as f64 / total as f64).min(1.0)
        };
    }
}
