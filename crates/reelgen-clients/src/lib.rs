//! HTTP clients for the external services the pipeline drives.
//!
//! Every client reads its connection settings from the environment and
//! retries transient failures (5xx, 429, connection errors) with backoff.

pub mod error;
pub mod http;
pub mod image;
pub mod render;
pub mod speech;
pub mod story;
pub mod transcription;
pub mod youtube;

pub use error::{ClientError, ClientResult};
pub use http::ServiceConfig;
pub use image::{ImageBytes, ImageClient, ImageJob, ImageJobState};
pub use render::{RenderClient, RenderJob, RenderRequest, RenderState};
pub use speech::SpeechClient;
pub use story::StoryClient;
pub use transcription::{Transcript, TranscriptionClient};
pub use youtube::{AccessToken, ChunkOutcome, UploadMetadata, YouTubeClient, YouTubeConfig};
