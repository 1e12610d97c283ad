//! Preview fetcher and publisher.
//!
//! Preview fetches are retried with exponential backoff on timeouts,
//! connection failures and 5xx replies. Every failure comes back as a
//! classified [`PreviewFailure`]; nothing is thrown past this module.
//! Publishing is never retried.

use serde_json::Value;
use sociovia_preview::{
    normalize_all, parse_preview_response, render_all, FailureKind, FailureSignals, PreviewDescriptor,
    PreviewError, PreviewFailure, RenderPolicy, RenderedPreview,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::{error_code, error_text, PreviewRequest, PublishRequest, PublishResponse};
use crate::config::ClientConfig;
use crate::error::{ClientResult, PublishError, TransportError};
use crate::transport::{HttpTransport, PreviewTransport};

const PREVIEW_PATH: &str = "preview";
const PUBLISH_PATH: &str = "publish";
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct PreviewClient {
    transport: Arc<dyn PreviewTransport>,
    config: ClientConfig,
    policy: RenderPolicy,
}

impl PreviewClient {
    /// Client over HTTP, configured from `config`.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn PreviewTransport>) -> ClientResult<Self> {
        let policy = config.render_policy()?;
        Ok(Self {
            transport,
            config,
            policy,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn policy(&self) -> &RenderPolicy {
        &self.policy
    }

    /// Fetch and normalize previews for one request.
    pub async fn fetch_previews(&self, request: &PreviewRequest) -> Result<Vec<PreviewDescriptor>, PreviewFailure> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("preview_fetch", request_id = %request_id, formats = request.ad_formats.len());

        async {
            let body = serde_json::to_value(request).map_err(|e| {
                PreviewFailure::new(FailureKind::Unavailable).with_detail(e.to_string())
            })?;

            let reply = self
                .retry(PREVIEW_PATH, || self.attempt(PREVIEW_PATH, &body, &request_id))
                .await
                .map_err(|err| failure_from_transport(&err))?;

            let raws = parse_preview_response(&reply).map_err(|err| failure_from_response(&reply, &err))?;
            let descriptors = normalize_all(raws);
            tracing::info!(count = descriptors.len(), "previews fetched");
            Ok::<_, PreviewFailure>(descriptors)
        }
        .instrument(span)
        .await
    }

    /// Fetch previews and pick a render for each under the configured policy.
    ///
    /// Previews with nothing renderable fall back to the creative's own image.
    pub async fn load_previews(&self, request: &PreviewRequest) -> Result<Vec<RenderedPreview>, PreviewFailure> {
        let descriptors = self.fetch_previews(request).await?;
        Ok(render_all(descriptors, &self.policy_for(request)))
    }

    /// Publish a campaign. Rejections carry the backend's own error text.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishResponse, PublishError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("publish", request_id = %request_id);

        async {
            let body = serde_json::to_value(request).map_err(|e| PublishError::Rejected(e.to_string()))?;

            let reply = match self.attempt(PUBLISH_PATH, &body, &request_id).await {
                Ok(reply) => reply,
                Err(TransportError::Status { status, body }) => {
                    let message = serde_json::from_str::<Value>(&body)
                        .ok()
                        .as_ref()
                        .and_then(error_text)
                        .unwrap_or_else(|| format!("Publish failed with HTTP {}", status));
                    tracing::warn!(status, %message, "publish rejected");
                    return Err(PublishError::Rejected(message));
                }
                Err(TransportError::Decode(detail)) => {
                    return Err(PublishError::Rejected(format!("Unexpected publish response: {}", detail)));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "publish failed");
                    return Err(PublishError::Network(err.to_string()));
                }
            };

            if reply.get("ok").and_then(Value::as_bool) == Some(false) {
                let message = error_text(&reply).unwrap_or_else(|| "Publish failed".to_string());
                return Err(PublishError::Rejected(message));
            }

            let response: PublishResponse = serde_json::from_value(reply)
                .map_err(|e| PublishError::Rejected(format!("Unexpected publish response: {}", e)))?;
            tracing::info!(campaign_id = ?response.campaign_id, "campaign published");
            Ok::<_, PublishError>(response)
        }
        .instrument(span)
        .await
    }

    fn policy_for(&self, request: &PreviewRequest) -> RenderPolicy {
        let image = request
            .creative
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        match image {
            Some(url) => self.policy.clone().with_fallback_image(url),
            None => self.policy.clone(),
        }
    }

    /// One request bounded by the configured timeout.
    async fn attempt(&self, path: &str, body: &Value, request_id: &str) -> Result<Value, TransportError> {
        match tokio::time::timeout(
            self.config.request_timeout,
            self.transport.post_json(path, body, request_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn retry<F, Fut, T>(&self, op: &str, mut action: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            match action().await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    if attempt >= self.config.max_retries || !err.is_retryable() {
                        tracing::warn!(op, attempts = attempt + 1, error = %err, "request failed");
                        return Err(err);
                    }
                    let backoff = backoff_delay(self.config.retry_backoff, attempt);
                    tracing::warn!(
                        op,
                        attempt = attempt + 1,
                        error = %err,
                        ?backoff,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// `base * 2^attempt`, capped.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map(|delay| delay.min(MAX_BACKOFF))
        .unwrap_or(MAX_BACKOFF)
}

fn failure_from_transport(err: &TransportError) -> PreviewFailure {
    match err {
        TransportError::Timeout | TransportError::Connect(_) => {
            PreviewFailure::new(FailureKind::Network).with_detail(err.to_string())
        }
        TransportError::Status { status, body } => {
            let parsed: Option<Value> = serde_json::from_str(body).ok();
            let text = parsed.as_ref().and_then(error_text);
            let message = match text.as_deref() {
                Some(text) => text,
                None if body.trim().is_empty() => "",
                None => body.as_str(),
            };
            PreviewFailure::classify(FailureSignals {
                code: parsed.as_ref().and_then(error_code),
                status: Some(*status),
                message: Some(message),
            })
        }
        TransportError::Decode(_) | TransportError::Request(_) => PreviewFailure::from_message(&err.to_string()),
    }
}

fn failure_from_response(reply: &Value, err: &PreviewError) -> PreviewFailure {
    let message = match err {
        PreviewError::Rejected { message } => message.clone(),
        other => other.to_string(),
    };
    PreviewFailure::classify(FailureSignals {
        code: error_code(reply),
        status: None,
        message: Some(&message),
    })
}
