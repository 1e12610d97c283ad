//! Client configuration loaded from environment variables.

use sociovia_preview::{RenderPolicy, DEFAULT_TRUSTED_DOMAIN};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
/// Upper bound for `SOCIOVIA_PREVIEW_RETRIES`.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend API base, without trailing slash.
    pub api_base: String,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^n`.
    pub retry_backoff: Duration,
    pub debounce: Duration,
    pub trusted_domain: String,
    pub allow_unsafe_scripts: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            debounce: Duration::from_millis(400),
            trusted_domain: DEFAULT_TRUSTED_DOMAIN.to_string(),
            allow_unsafe_scripts: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// All optional:
    /// - `SOCIOVIA_API_URL` (default: "http://127.0.0.1:8000/api")
    /// - `SOCIOVIA_PREVIEW_TIMEOUT_SECS` (default: 30)
    /// - `SOCIOVIA_PREVIEW_RETRIES` (default: 2, at most 5)
    /// - `SOCIOVIA_PREVIEW_BACKOFF_MS` (default: 500)
    /// - `SOCIOVIA_PREVIEW_DEBOUNCE_MS` (default: 400)
    /// - `SOCIOVIA_TRUSTED_PREVIEW_DOMAIN` (default: "facebook.com")
    /// - `SOCIOVIA_ALLOW_UNSAFE_SCRIPTS` (default: false)
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base = var("SOCIOVIA_API_URL")
            .unwrap_or(defaults.api_base)
            .trim_end_matches('/')
            .to_string();

        let request_timeout = match var("SOCIOVIA_PREVIEW_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("SOCIOVIA_PREVIEW_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };
        let max_retries = match var("SOCIOVIA_PREVIEW_RETRIES") {
            Some(raw) => parse_number("SOCIOVIA_PREVIEW_RETRIES", &raw)?,
            None => defaults.max_retries,
        };
        let retry_backoff = match var("SOCIOVIA_PREVIEW_BACKOFF_MS") {
            Some(raw) => Duration::from_millis(parse_number("SOCIOVIA_PREVIEW_BACKOFF_MS", &raw)?),
            None => defaults.retry_backoff,
        };
        let debounce = match var("SOCIOVIA_PREVIEW_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(parse_number("SOCIOVIA_PREVIEW_DEBOUNCE_MS", &raw)?),
            None => defaults.debounce,
        };

        let trusted_domain = var("SOCIOVIA_TRUSTED_PREVIEW_DOMAIN").unwrap_or(defaults.trusted_domain);
        let allow_unsafe_scripts = var("SOCIOVIA_ALLOW_UNSAFE_SCRIPTS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.allow_unsafe_scripts);

        if request_timeout.is_zero() {
            return Err(ClientError::Config {
                key: "SOCIOVIA_PREVIEW_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }

        if max_retries > MAX_RETRIES {
            return Err(ClientError::Config {
                key: "SOCIOVIA_PREVIEW_RETRIES".to_string(),
                value: max_retries.to_string(),
                reason: format!("at most {} retries are allowed", MAX_RETRIES),
            });
        }

        tracing::debug!(
            api_base = %api_base,
            timeout_secs = request_timeout.as_secs(),
            max_retries,
            trusted_domain = %trusted_domain,
            allow_unsafe_scripts,
            "client configuration loaded"
        );

        Ok(Self {
            api_base,
            request_timeout,
            max_retries,
            retry_backoff,
            debounce,
            trusted_domain,
            allow_unsafe_scripts,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Render policy implied by the trusted domain and script opt-in.
    pub fn render_policy(&self) -> ClientResult<RenderPolicy> {
        Ok(RenderPolicy::new(&self.trusted_domain)?.with_unsafe_scripts(self.allow_unsafe_scripts))
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

fn parse_number<T>(key: &str, raw: &str) -> ClientResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ClientError::Config {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
