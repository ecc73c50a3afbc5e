//! Templates and content types referenced by bulk jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub content_type_id: String,
    #[serde(default)]
    pub voice_id: String,
    #[serde(default)]
    pub style: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default_prompt: Option<String>,
}

impl ContentType {
    /// The default prompt, if one is configured and non-blank.
    pub fn default_prompt(&self) -> Option<&str> {
        self.default_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}
