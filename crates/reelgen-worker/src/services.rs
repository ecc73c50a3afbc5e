//! External capabilities the handlers depend on.
//!
//! Each trait is implemented by the matching HTTP client; tests substitute
//! scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;

use reelgen_clients::{
    AccessToken, ChunkOutcome, ClientResult, ImageBytes, ImageClient, ImageJob, RenderClient, RenderJob,
    RenderRequest, SpeechClient, StoryClient, Transcript, TranscriptionClient, UploadMetadata, YouTubeClient,
};
use reelgen_models::{Story, Video};
use reelgen_storage::{R2Client, StorageResult};

use crate::error::WorkerResult;

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Start a generation job; returns its id.
    async fn submit(&self, prompt: &str) -> ClientResult<String>;

    async fn status(&self, job_id: &str) -> ClientResult<ImageJob>;

    async fn download(&self, url: &str) -> ClientResult<ImageBytes>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> ClientResult<Vec<u8>>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> ClientResult<Transcript>;
}

#[async_trait]
pub trait StoryWriter: Send + Sync {
    async fn write(&self, prompt: &str, guidance: Option<&str>) -> ClientResult<Story>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Submit the video's scenes and style; returns the render id.
    async fn submit(&self, video: &Video) -> ClientResult<String>;

    async fn status(&self, render_id: &str) -> ClientResult<RenderJob>;
}

/// Resumable uploads to a publishing platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> &'static str;

    fn watch_url(&self, platform_video_id: &str) -> String;

    async fn refresh(&self, refresh_token: &str) -> ClientResult<AccessToken>;

    async fn download(&self, url: &str) -> ClientResult<Vec<u8>>;

    async fn start_upload(&self, access_token: &str, metadata: &UploadMetadata, total: u64) -> ClientResult<String>;

    async fn upload_chunk(
        &self,
        session_url: &str,
        access_token: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> ClientResult<ChunkOutcome>;
}

/// Durable object storage for generated assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `data` under `key`; returns its public URL.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;
}

#[async_trait]
impl ImageGenerator for ImageClient {
    async fn submit(&self, prompt: &str) -> ClientResult<String> {
        ImageClient::submit(self, prompt).await
    }

    async fn status(&self, job_id: &str) -> ClientResult<ImageJob> {
        ImageClient::status(self, job_id).await
    }

    async fn download(&self, url: &str) -> ClientResult<ImageBytes> {
        ImageClient::download(self, url).await
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> ClientResult<Vec<u8>> {
        SpeechClient::synthesize(self, text, voice_id).await
    }
}

#[async_trait]
impl Transcriber for TranscriptionClient {
    async fn transcribe(&self, audio: &[u8]) -> ClientResult<Transcript> {
        TranscriptionClient::transcribe(self, audio).await
    }
}

#[async_trait]
impl StoryWriter for StoryClient {
    async fn write(&self, prompt: &str, guidance: Option<&str>) -> ClientResult<Story> {
        StoryClient::write(self, prompt, guidance).await
    }
}

#[async_trait]
impl Renderer for RenderClient {
    async fn submit(&self, video: &Video) -> ClientResult<String> {
        let request = RenderRequest {
            video_id: video.id.as_str(),
            scenes: video.scenes.values().collect(),
            style: &video.style,
        };
        RenderClient::submit(self, &request).await
    }

    async fn status(&self, render_id: &str) -> ClientResult<RenderJob> {
        RenderClient::status(self, render_id).await
    }
}

#[async_trait]
impl Publisher for YouTubeClient {
    fn platform(&self) -> &'static str {
        reelgen_clients::youtube::PLATFORM
    }

    fn watch_url(&self, platform_video_id: &str) -> String {
        YouTubeClient::watch_url(platform_video_id)
    }

    async fn refresh(&self, refresh_token: &str) -> ClientResult<AccessToken> {
        YouTubeClient::refresh(self, refresh_token).await
    }

    async fn download(&self, url: &str) -> ClientResult<Vec<u8>> {
        YouTubeClient::download(self, url).await
    }

    async fn start_upload(&self, access_token: &str, metadata: &UploadMetadata, total: u64) -> ClientResult<String> {
        YouTubeClient::start_upload(self, access_token, metadata, total).await
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        access_token: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> ClientResult<ChunkOutcome> {
        YouTubeClient::upload_chunk(self, session_url, access_token, chunk, offset, total).await
    }
}

#[async_trait]
impl AssetStore for R2Client {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        R2Client::put(self, key, data, content_type).await
    }
}

/// The full set of external capabilities.
#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub stories: Arc<dyn StoryWriter>,
    pub renderer: Arc<dyn Renderer>,
    pub publisher: Arc<dyn Publisher>,
    pub assets: Arc<dyn AssetStore>,
}

impl Services {
    /// Build every client from the environment.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self {
            images: Arc::new(ImageClient::from_env()?),
            speech: Arc::new(SpeechClient::from_env()?),
            transcriber: Arc::new(TranscriptionClient::from_env()?),
            stories: Arc::new(StoryClient::from_env()?),
            renderer: Arc::new(RenderClient::from_env()?),
            publisher: Arc::new(YouTubeClient::from_env()?),
            assets: Arc::new(R2Client::from_env()?),
        })
    }
}
