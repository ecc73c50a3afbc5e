//! Shared data models for the reelgen pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video records, scenes and per-scene status tracks
//! - Video and bulk-job status enums
//! - Story generation requests, templates, content types and channels
//! - Marker documents used as stage signals
//! - The pure scene and readiness aggregation rules

pub mod bulk;
pub mod catalog;
pub mod channel;
pub mod error;
pub mod ids;
pub mod marker;
pub mod readiness;
pub mod scene;
pub mod status;
pub mod story;
pub mod video;

pub use bulk::{BulkJob, BulkJobStatus, BulkOutcome};
pub use catalog::{ContentType, Template};
pub use channel::{Channel, ChannelCredentials, Privacy};
pub use error::{ModelError, ModelResult};
pub use ids::{BulkJobId, ChannelId, StoryRequestId, TaskId, VideoId};
pub use marker::{Marker, MarkerKind};
pub use readiness::{combine_scene_status, is_settled, AssetReadiness, DEFAULT_SETTLE_THRESHOLD_MS};
pub use scene::{Scene, SceneIndex, StatusMessage, TrackStatus, WordTiming};
pub use status::VideoStatus;
pub use story::{Story, StoryRequest, StoryScene, StoryStatus};
pub use video::{RenderStatus, UploadStatus, Version, Versioned, Video};
