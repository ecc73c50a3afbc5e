//! Speech-to-text with word-level timestamps.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use reelgen_models::WordTiming;

use crate::error::ClientResult;
use crate::http::{build_http, ensure_success, with_retry, ServiceConfig};

const SERVICE: &str = "transcription";

/// Transcription result. Either part may be missing when the service could
/// not align the audio.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub words: Option<Vec<WordTiming>>,
}

impl Transcript {
    /// Text and timings when both are present and non-empty.
    pub fn complete(self) -> Option<(String, Vec<WordTiming>)> {
        let text = self.text.filter(|t| !t.trim().is_empty())?;
        let words = self.words.filter(|w| !w.is_empty())?;
        Some((text, words))
    }
}

pub struct TranscriptionClient {
    http: Client,
    config: ServiceConfig,
    model: String,
}

impl TranscriptionClient {
    pub fn new(config: ServiceConfig, model: impl Into<String>) -> ClientResult<Self> {
        let http = build_http(config.timeout)?;
        Ok(Self {
            http,
            config,
            model: model.into(),
        })
    }

    /// Reads `OPENAI_*` and `TRANSCRIPTION_MODEL`.
    pub fn from_env() -> ClientResult<Self> {
        let model = std::env::var("TRANSCRIPTION_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Self::new(ServiceConfig::from_env("OPENAI", "https://api.openai.com", 120), model)
    }

    pub async fn transcribe(&self, audio: &[u8]) -> ClientResult<Transcript> {
        let url = self.config.url("/v1/audio/transcriptions");

        let response = with_retry(SERVICE, self.config.max_retries, || async {
            let file = Part::bytes(audio.to_vec())
                .file_name("narration.mp3")
                .mime_str("audio/mpeg")?;
            let form = Form::new()
                .text("model", self.model.clone())
                .text("response_format", "verbose_json")
                .text("timestamp_granularities[]", "word")
                .part("file", file);

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .multipart(form)
                .send()
                .await?;
            ensure_success(SERVICE, response).await
        })
        .await?;

        Ok(response.json().await?)
    }
}
