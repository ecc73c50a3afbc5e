//! Speech-synthesis service client.

use reqwest::Client;
use serde::Serialize;

use crate::error::{ClientError, ClientResult};
use crate::http::{build_http, ensure_success, with_retry, ServiceConfig};

const SERVICE: &str = "speech";

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct SpeechClient {
    http: Client,
    config: ServiceConfig,
    model_id: String,
}

impl SpeechClient {
    pub fn new(config: ServiceConfig, model_id: impl Into<String>) -> ClientResult<Self> {
        let http = build_http(config.timeout)?;
        Ok(Self {
            http,
            config,
            model_id: model_id.into(),
        })
    }

    /// Reads `SPEECH_SERVICE_*` and `SPEECH_MODEL_ID`.
    pub fn from_env() -> ClientResult<Self> {
        let model_id = std::env::var("SPEECH_MODEL_ID")
            .unwrap_or_else(|_| "eleven_multilingual_v2".to_string());
        Self::new(
            ServiceConfig::from_env("SPEECH_SERVICE", "https://api.elevenlabs.io", 120),
            model_id,
        )
    }

    /// Synthesize `text` with `voice_id`; returns MP3 bytes.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> ClientResult<Vec<u8>> {
        let url = self.config.url(&format!("/v1/text-to-speech/{}", voice_id));
        let body = SpeechRequest {
            text,
            model_id: &self.model_id,
        };

        let response = with_retry(SERVICE, self.config.max_retries, || async {
            let response = self
                .http
                .post(&url)
                .header("xi-api-key", &self.config.api_key)
                .header(reqwest::header::ACCEPT, "audio/mpeg")
                .json(&body)
                .send()
                .await?;
            ensure_success(SERVICE, response).await
        })
        .await?;

        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(ClientError::invalid_response(SERVICE, "empty audio body"));
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_synthesize_returns_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-9"))
            .and(header("xi-api-key", "sk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
            .mount(&server)
            .await;

        let client = SpeechClient::new(ServiceConfig::new(server.uri(), "sk"), "m1").unwrap();
        let audio = client.synthesize("Once upon a time", "voice-9").await.unwrap();
        assert_eq!(audio, b"ID3audio");
    }

    #[tokio::test]
    async fn test_empty_audio_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = SpeechClient::new(ServiceConfig::new(server.uri(), "sk"), "m1").unwrap();
        let err = client.synthesize("hi", "v").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse { .. }));
    }
}
