//! Story writing through a chat-completions language model.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use reelgen_models::Story;

use crate::error::{ClientError, ClientResult};
use crate::http::{build_http, ensure_success, with_retry, ServiceConfig};

const SERVICE: &str = "story";

const SYSTEM_PROMPT: &str = "You write scripts for vertical short-form videos. \
Reply with a JSON object {\"title\": string, \"description\": string, \
\"scenes\": [{\"narration\": string, \"imagePrompt\": string}]}. \
Each narration is one or two spoken sentences; each imagePrompt describes a \
single portrait illustration for that scene.";

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct StoryClient {
    http: Client,
    config: ServiceConfig,
    model: String,
}

impl StoryClient {
    pub fn new(config: ServiceConfig, model: impl Into<String>) -> ClientResult<Self> {
        let http = build_http(config.timeout)?;
        Ok(Self {
            http,
            config,
            model: model.into(),
        })
    }

    /// Reads `OPENAI_*` and `STORY_MODEL`.
    pub fn from_env() -> ClientResult<Self> {
        let model = std::env::var("STORY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Self::new(ServiceConfig::from_env("OPENAI", "https://api.openai.com", 120), model)
    }

    /// Write a story for `prompt`, optionally steered by the content type's
    /// guidance.
    pub async fn write(&self, prompt: &str, guidance: Option<&str>) -> ClientResult<Story> {
        let url = self.config.url("/v1/chat/completions");
        let user = match guidance {
            Some(guidance) => format!("{}\n\nTopic: {}", guidance, prompt),
            None => format!("Topic: {}", prompt),
        };
        let body = json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
        });

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

        let completion: Completion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::invalid_response(SERVICE, "completion has no content"))?;

        serde_json::from_str(&content)
            .map_err(|e| ClientError::invalid_response(SERVICE, format!("story is not valid JSON: {}", e)))
    }
}
