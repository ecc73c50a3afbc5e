//! YouTube Data API: OAuth refresh and resumable uploads.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use reelgen_models::Privacy;

use crate::error::{ClientError, ClientResult};
use crate::http::{ensure_success, with_retry};

const SERVICE: &str = "youtube";

/// Key under `uploadStatus` for this platform.
pub const PLATFORM: &str = "youtube";

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub upload_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            upload_url: "https://www.googleapis.com/upload/youtube/v3/videos".to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 2,
        }
    }
}

impl YouTubeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: std::env::var("YOUTUBE_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("YOUTUBE_CLIENT_SECRET").unwrap_or_default(),
            token_url: std::env::var("YOUTUBE_TOKEN_URL").unwrap_or(defaults.token_url),
            upload_url: std::env::var("YOUTUBE_UPLOAD_URL").unwrap_or(defaults.upload_url),
            timeout: Duration::from_secs(
                std::env::var("YOUTUBE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_retries: defaults.max_retries,
        }
    }
}

/// A refreshed access token.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// Set when the platform rotated the refresh token.
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// Video resource metadata sent when a resumable session is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub privacy: Privacy,
    pub publish_at: Option<DateTime<Utc>>,
}

impl UploadMetadata {
    /// Scheduled uploads must be private; the platform publishes them at
    /// `publishAt`.
    fn to_resource(&self) -> serde_json::Value {
        let privacy = match self.publish_at {
            Some(_) => Privacy::Private,
            None => self.privacy,
        };
        let mut status = json!({
            "privacyStatus": privacy.as_str(),
            "selfDeclaredMadeForKids": false,
        });
        if let Some(at) = self.publish_at {
            status["publishAt"] = json!(at.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        json!({
            "snippet": {
                "title": self.title,
                "description": self.description,
            },
            "status": status,
        })
    }
}

/// Result of sending one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// The server holds `next_offset` bytes; continue from there.
    Incomplete { next_offset: u64 },
    /// Upload finished; the platform's id for the new video.
    Complete { video_id: String },
}

#[derive(Deserialize)]
struct UploadedVideo {
    id: String,
}

pub struct YouTubeClient {
    http: Client,
    config: YouTubeConfig,
}

impl YouTubeClient {
    pub fn new(config: YouTubeConfig) -> ClientResult<Self> {
        // 308 is "resume incomplete" here, not a redirect.
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(YouTubeConfig::from_env())
    }

    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<AccessToken> {
        if self.config.client_id.is_empty() {
            return Err(ClientError::config("YOUTUBE_CLIENT_ID is not set"));
        }

        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = with_retry(SERVICE, self.config.max_retries, || async {
            let response = self.http.post(&self.config.token_url).form(&form).send().await?;
            ensure_success(SERVICE, response).await
        })
        .await?;

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
        })
    }

    /// Fetch the rendered video.
    pub async fn download(&self, url: &str) -> ClientResult<Vec<u8>> {
        let response = ensure_success(SERVICE, self.http.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Open a resumable session; returns the session URL.
    pub async fn start_upload(
        &self,
        access_token: &str,
        metadata: &UploadMetadata,
        total_bytes: u64,
    ) -> ClientResult<String> {
        let resource = metadata.to_resource();
        let response = self
            .http
            .post(&self.config.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(access_token)
            .header("X-Upload-Content-Length", total_bytes)
            .header("X-Upload-Content-Type", "video/mp4")
            .json(&resource)
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;

        let session = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ClientError::invalid_response(SERVICE, "resumable session has no Location"))?
            .to_string();
        debug!("Opened resumable upload session");
        Ok(session)
    }

    /// Send `chunk`, which starts at byte `offset` of a `total`-byte file.
    pub async fn upload_chunk(
        &self,
        session_url: &str,
        access_token: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> ClientResult<ChunkOutcome> {
        let len = chunk.len() as u64;
        if len == 0 {
            return Err(ClientError::invalid_response(SERVICE, "empty chunk"));
        }
        let end = offset + len - 1;

        let response = self
            .http
            .put(session_url)
            .bearer_auth(access_token)
            .header(header::CONTENT_LENGTH, len)
            .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, total))
            .body(chunk)
            .send()
            .await?;

        if response.status() == StatusCode::PERMANENT_REDIRECT {
            let next_offset = response
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range_end)
                .map(|last| last + 1)
                .unwrap_or(0);
            return Ok(ChunkOutcome::Incomplete { next_offset });
        }

        let response = ensure_success(SERVICE, response).await?;
        let video: UploadedVideo = response.json().await?;
        Ok(ChunkOutcome::Complete { video_id: video.id })
    }
}

/// Last byte index from a `bytes=0-N` header.
fn parse_range_end(range: &str) -> Option<u64> {
    range.strip_prefix("bytes=")?.split('-').nth(1)?.trim().parse().ok()
}
