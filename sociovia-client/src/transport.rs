//! HTTP seam between the client and the backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, TransportError};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Posts a JSON body to a backend path and returns the decoded JSON reply.
///
/// Non-2xx replies are [`TransportError::Status`] with the raw body.
#[async_trait]
pub trait PreviewTransport: Send + Sync {
    async fn post_json(&self, path: &str, body: &Value, request_id: &str) -> Result<Value, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl PreviewTransport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value, request_id: &str) -> Result<Value, TransportError> {
        let url = self.config.endpoint(path);
        tracing::debug!(%url, request_id, "POST");

        let response = self
            .client
            .post(&url)
            .header(REQUEST_ID_HEADER, request_id)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
