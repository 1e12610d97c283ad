//! Request and response bodies exchanged with the backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Creative copy and assets a preview is generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    /// Headline.
    pub title: String,
    pub body: String,
    /// Destination URL.
    pub object_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub ad_formats: Vec<String>,
    pub creative: Creative,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl PreviewRequest {
    pub fn new(creative: Creative) -> Self {
        Self {
            creative,
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.ad_formats.push(format.into());
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self.user_id = Some(user_id.into());
        self
    }
}

/// Flattened campaign, ad set, ad and creative fields for one publish call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub workspace_id: String,
    pub user_id: String,
    pub campaign_name: String,
    pub objective: String,
    pub adset_name: String,
    /// Daily budget in the ad account's minor currency unit.
    pub daily_budget: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub targeting: Value,
    pub ad_name: String,
    pub creative: Creative,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub adset_id: Option<String>,
    #[serde(default)]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub creative_id: Option<String>,
    /// Anything else the backend returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Backend error text, taken from `details`, then `error`, then `message`.
///
/// String values are returned as-is; structured values are returned as JSON.
pub(crate) fn error_text(body: &Value) -> Option<String> {
    ["details", "error", "message"].iter().find_map(|key| match body.get(*key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    })
}

/// Backend error code, if the body carries one (`code` or `error_code`).
pub(crate) fn error_code(body: &Value) -> Option<&str> {
    body.get("code")
        .or_else(|| body.get("error_code"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
