//! Video rendering service client.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use reelgen_models::Scene;

use crate::error::ClientResult;
use crate::http::{build_http, ensure_success, with_retry, ServiceConfig};

const SERVICE: &str = "render";

/// Composition sent to the renderer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest<'a> {
    pub video_id: &'a str,
    pub scenes: Vec<&'a Scene>,
    pub style: &'a serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    Queued,
    Rendering,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderJob {
    pub id: String,
    pub status: RenderState,
    /// Fraction in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RenderCreated {
    id: String,
}

pub struct RenderClient {
    http: Client,
    config: ServiceConfig,
}

impl RenderClient {
    pub fn new(config: ServiceConfig) -> ClientResult<Self> {
        let http = build_http(config.timeout)?;
        Ok(Self { http, config })
    }

    /// Reads `RENDER_SERVICE_*`.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ServiceConfig::from_env("RENDER_SERVICE", "http://localhost:8020", 60))
    }

    pub async fn submit(&self, request: &RenderRequest<'_>) -> ClientResult<String> {
        let url = self.config.url("/render");
        let response = with_retry(SERVICE, self.config.max_retries, || async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(request)
                .send()
                .await?;
            ensure_success(SERVICE, response).await
        })
        .await?;

        let created: RenderCreated = response.json().await?;
        debug!(render_id = %created.id, video_id = %request.video_id, "Submitted render");
        Ok(created.id)
    }

    pub async fn status(&self, render_id: &str) -> ClientResult<RenderJob> {
        let url = self.config.url(&format!("/render/{}", render_id));
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_submit_sends_scenes_and_style() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .and(body_partial_json(json!({
                "videoId": "v1",
                "scenes": [{"narration": "n", "imagePrompt": "p"}],
                "style": {"font": "Inter"}
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "r-1"})))
            .mount(&server)
            .await;

        let client = RenderClient::new(ServiceConfig::new(server.uri(), "k")).unwrap();
        let scene = Scene::new("n", "p");
        let style = json!({"font": "Inter"});
        let id = client
            .submit(&RenderRequest {
                video_id: "v1",
                scenes: vec![&scene],
                style: &style,
            })
            .await
            .unwrap();
        assert_eq!(id, "r-1");
    }

    #[tokio::test]
    async fn test_status_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/render/r-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r-1", "status": "rendering", "progress": 0.42
            })))
            .mount(&server)
            .await;

        let client = RenderClient::new(ServiceConfig::new(server.uri(), "k")).unwrap();
        let job = client.status("r-1").await.unwrap();
        assert_eq!(job.status, RenderState::Rendering);
        assert!((job.progress - 0.42).abs() < f64::EPSILON);
        assert!(job.url.is_none());
    }
}
