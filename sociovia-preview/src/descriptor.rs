use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PreviewError, PreviewResult};

/// One preview item exactly as the backend returned it.
///
/// The shape varies between ad formats and API versions, so it stays an
/// opaque JSON value and the normalizer probes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPreviewPayload(pub Value);

impl RawPreviewPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Ad format name (`format`, then `ad_format`), if the backend sent one.
    pub fn format(&self) -> Option<&str> {
        self.0
            .get("format")
            .or_else(|| self.0.get("ad_format"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl From<Value> for RawPreviewPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// What a normalized descriptor can render.
///
/// A descriptor never carries both a remote source and inline markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PreviewContent {
    /// URL to load in an iframe.
    Remote(String),
    /// HTML document to sanitize and render via `srcdoc`.
    Inline(String),
    /// Nothing renderable; fall back to the creative image.
    Empty,
}

/// A preview after normalization. Immutable; a new fetch replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewDescriptor {
    pub format: String,
    pub raw_source: RawPreviewPayload,
    pub content: PreviewContent,
    /// Decoded markup the remote src was lifted from, kept for dimension parsing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_markup: Option<String>,
}

impl PreviewDescriptor {
    pub fn iframe_src(&self) -> Option<&str> {
        match &self.content {
            PreviewContent::Remote(src) => Some(src),
            _ => None,
        }
    }

    pub fn inline_markup(&self) -> Option<&str> {
        match &self.content {
            PreviewContent::Inline(markup) => Some(markup),
            _ => None,
        }
    }

    /// True when neither an iframe src nor inline markup could be found.
    pub fn is_empty(&self) -> bool {
        matches!(self.content, PreviewContent::Empty)
    }
}

/// Unwraps the `{ ok, previews }` envelope of a preview response.
///
/// `ok: false` is surfaced with the backend's `error`/`message` text. An
/// envelope without `ok` is accepted as long as `previews` is an array.
pub fn parse_preview_response(body: &Value) -> PreviewResult<Vec<RawPreviewPayload>> {
    let obj = body.as_object().ok_or_else(|| PreviewError::NotAnObject {
        found: json_kind(body).to_string(),
    })?;

    if obj.get("ok").and_then(Value::as_bool) == Some(false) {
        let message = ["error", "message", "details"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .unwrap_or("preview request failed")
            .to_string();
        return Err(PreviewError::Rejected { message });
    }

    let previews = obj
        .get("previews")
        .and_then(Value::as_array)
        .ok_or(PreviewError::MissingPreviews)?;

    Ok(previews.iter().cloned().map(RawPreviewPayload).collect())
}

/// Accepts a full response envelope, a bare array of payloads, or a single
/// payload object.
pub fn collect_payloads(value: &Value) -> PreviewResult<Vec<RawPreviewPayload>> {
    match value {
        Value::Array(items) => Ok(items.iter().cloned().map(RawPreviewPayload).collect()),
        Value::Object(obj) if obj.contains_key("previews") || obj.contains_key("ok") => {
            parse_preview_response(value)
        }
        Value::Object(_) => Ok(vec![RawPreviewPayload(value.clone())]),
        other => Err(PreviewError::NotAnObject {
            found: json_kind(other).to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
