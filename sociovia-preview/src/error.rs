use thiserror::Error;

pub type PreviewResult<T> = Result<T, PreviewError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreviewError {
    #[error("Preview response rejected by backend: {message}")]
    Rejected { message: String },

    #[error("Preview response is missing the 'previews' array")]
    MissingPreviews,

    #[error("Preview response must be a JSON object, got {found}")]
    NotAnObject { found: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Invalid trusted domain '{domain}': {reason}")]
    InvalidTrustedDomain { domain: String, reason: String },

    #[error("Invalid base href '{href}': {reason}")]
    InvalidBaseHref { href: String, reason: String },
}

impl From<serde_json::Error> for PreviewError {
    fn from(err: serde_json::Error) -> Self {
        PreviewError::Json(err.to_string())
    }
}
