use sociovia_preview::PreviewError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

/// Failure of a single HTTP exchange with the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Timeouts, connection failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) => true,
            TransportError::Status { status, .. } => (500..600).contains(status),
            TransportError::Decode(_) | TransportError::Request(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Backend refused the publish; the text is its own `details`/`error`/`message`.
    #[error("{0}")]
    Rejected(String),

    #[error("Network error while publishing: {0}")]
    Network(String),
}
