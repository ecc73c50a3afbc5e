//! Image-synthesis service client.
//!
//! Generation is asynchronous: a submission returns a job id whose status is
//! polled until it succeeds or fails.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::http::{build_http, ensure_success, with_retry, ServiceConfig};

const SERVICE: &str = "image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageJobState {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl ImageJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImageJobState::Succeeded | ImageJobState::Failed | ImageJobState::Canceled
        )
    }
}

/// One poll of a generation job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageJob {
    pub id: String,
    pub status: ImageJobState,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ImageJob {
    pub fn output_url(&self) -> Option<&str> {
        self.output.first().map(String::as_str).filter(|u| !u.is_empty())
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    aspect_ratio: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    id: String,
}

/// A downloaded image.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct ImageClient {
    http: Client,
    config: ServiceConfig,
}

impl ImageClient {
    pub fn new(config: ServiceConfig) -> ClientResult<Self> {
        let http = build_http(config.timeout)?;
        Ok(Self { http, config })
    }

    /// Reads `IMAGE_SERVICE_*`.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ServiceConfig::from_env("IMAGE_SERVICE", "http://localhost:8010", 60))
    }

    /// Submit a portrait generation; returns the job id.
    pub async fn submit(&self, prompt: &str) -> ClientResult<String> {
        let url = self.config.url("/v1/generations");
        let body = GenerationRequest {
            prompt,
            aspect_ratio: "9:16",
        };

        let response = with_retry(SERVICE, self.config.max_retries, || async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;
            ensure_success(SERVICE, response).await
        })
        .await?;

        let created: GenerationResponse = response.json().await?;
        debug!(job_id = %created.id, "Submitted image generation");
        Ok(created.id)
    }

    pub async fn status(&self, job_id: &str) -> ClientResult<ImageJob> {
        let url = self.config.url(&format!("/v1/generations/{}", job_id));
        let response = with_retry(SERVICE, self.config.max_retries, || async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;
            ensure_success(SERVICE, response).await
        })
        .await?;

        Ok(response.json().await?)
    }

    /// Fetch a produced image from the service's short-lived output URL.
    pub async fn download(&self, url: &str) -> ClientResult<ImageBytes> {
        let response = ensure_success(SERVICE, self.http.get(url).send().await?).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ClientError::invalid_response(SERVICE, "empty image body"));
        }
        Ok(ImageBytes {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ImageClient {
        ImageClient::new(ServiceConfig::new(server.uri(), "img-key").with_max_retries(0)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_returns_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generations"))
            .and(header("authorization", "Bearer img-key"))
            .and(body_partial_json(json!({"prompt": "a lighthouse", "aspect_ratio": "9:16"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "job-1"})))
            .mount(&server)
            .await;

        assert_eq!(client(&server).submit("a lighthouse").await.unwrap(), "job-1");
    }

    #[tokio::test]
    async fn test_status_parses_output() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/generations/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "job-1",
                "status": "succeeded",
                "output": ["https://cdn.example/out.png"]
            })))
            .mount(&server)
            .await;

        let job = client(&server).status("job-1").await.unwrap();
        assert!(job.status.is_terminal());
        assert_eq!(job.output_url(), Some("https://cdn.example/out.png"));
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_download_keeps_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out.webp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let image = client(&server)
            .download(&format!("{}/out.webp", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.content_type, "image/webp");
    }
}
