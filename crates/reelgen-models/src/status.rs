//! Video pipeline status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Stage of a video project in the generation pipeline.
///
/// The status only moves forward through
/// `draft -> processing:story -> processing:assets -> assets:ready -> processing:render -> render:complete | render:error`.
/// `error` is reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum VideoStatus {
    #[default]
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "processing:story")]
    ProcessingStory,
    #[serde(rename = "processing:assets")]
    ProcessingAssets,
    #[serde(rename = "assets:ready")]
    AssetsReady,
    #[serde(rename = "processing:render")]
    ProcessingRender,
    #[serde(rename = "render:complete")]
    RenderComplete,
    #[serde(rename = "render:error")]
    RenderError,
    #[serde(rename = "error")]
    Error,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Draft => "draft",
            VideoStatus::ProcessingStory => "processing:story",
            VideoStatus::ProcessingAssets => "processing:assets",
            VideoStatus::AssetsReady => "assets:ready",
            VideoStatus::ProcessingRender => "processing:render",
            VideoStatus::RenderComplete => "render:complete",
            VideoStatus::RenderError => "render:error",
            VideoStatus::Error => "error",
        }
    }

    /// Position in the forward sequence. Both render outcomes share a rank.
    fn rank(&self) -> u8 {
        match self {
            VideoStatus::Draft => 0,
            VideoStatus::ProcessingStory => 1,
            VideoStatus::ProcessingAssets => 2,
            VideoStatus::AssetsReady => 3,
            VideoStatus::ProcessingRender => 4,
            VideoStatus::RenderComplete | VideoStatus::RenderError => 5,
            VideoStatus::Error => u8::MAX,
        }
    }

    /// No further automatic progress happens from these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoStatus::RenderComplete | VideoStatus::RenderError | VideoStatus::Error
        )
    }

    /// True when this status is `other` or a later pipeline stage.
    ///
    /// `error` is never "past" a stage: it halts the pipeline instead.
    pub fn has_reached(&self, other: VideoStatus) -> bool {
        *self != VideoStatus::Error && self.rank() >= other.rank()
    }

    /// Whether moving from `self` to `next` keeps the status moving forward.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        if *self == VideoStatus::Error {
            return false;
        }
        if next == VideoStatus::Error {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(VideoStatus::Draft),
            "processing:story" => Ok(VideoStatus::ProcessingStory),
            "processing:assets" => Ok(VideoStatus::ProcessingAssets),
            "assets:ready" => Ok(VideoStatus::AssetsReady),
            "processing:render" => Ok(VideoStatus::ProcessingRender),
            "render:complete" => Ok(VideoStatus::RenderComplete),
            "render:error" => Ok(VideoStatus::RenderError),
            "error" => Ok(VideoStatus::Error),
            other => Err(ModelError::unknown("video status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(VideoStatus::Draft.can_transition_to(VideoStatus::ProcessingAssets));
        assert!(VideoStatus::ProcessingAssets.can_transition_to(VideoStatus::AssetsReady));
        assert!(VideoStatus::ProcessingRender.can_transition_to(VideoStatus::RenderError));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!VideoStatus::AssetsReady.can_transition_to(VideoStatus::ProcessingAssets));
        assert!(!VideoStatus::AssetsReady.can_transition_to(VideoStatus::AssetsReady));
        assert!(!VideoStatus::RenderComplete.can_transition_to(VideoStatus::ProcessingRender));
        assert!(!VideoStatus::RenderError.can_transition_to(VideoStatus::RenderComplete));
    }

    #[test]
    fn test_error_reachable_from_any_stage_but_final() {
        assert!(VideoStatus::Draft.can_transition_to(VideoStatus::Error));
        assert!(VideoStatus::RenderComplete.can_transition_to(VideoStatus::Error));
        assert!(!VideoStatus::Error.can_transition_to(VideoStatus::Error));
        assert!(!VideoStatus::Error.can_transition_to(VideoStatus::ProcessingAssets));
    }

    #[test]
    fn test_has_reached() {
        assert!(VideoStatus::ProcessingRender.has_reached(VideoStatus::AssetsReady));
        assert!(VideoStatus::AssetsReady.has_reached(VideoStatus::AssetsReady));
        assert!(!VideoStatus::ProcessingAssets.has_reached(VideoStatus::AssetsReady));
        assert!(!VideoStatus::Error.has_reached(VideoStatus::AssetsReady));
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&VideoStatus::AssetsReady).unwrap();
        assert_eq!(json, "\"assets:ready\"");
        let parsed: VideoStatus = serde_json::from_str("\"processing:render\"").unwrap();
        assert_eq!(parsed, VideoStatus::ProcessingRender);
        assert_eq!("render:error".parse::<VideoStatus>().unwrap(), VideoStatus::RenderError);
        assert!("rendering".parse::<VideoStatus>().is_err());
    }
}
