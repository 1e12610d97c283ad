//! User-facing failure categories for preview loading.
//!
//! Structured signals (backend error codes, HTTP status) are consulted
//! first. Only when none is available does classification fall back to
//! substring matching on the lowercased error message.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SessionExpired,
    PermissionRequired,
    Network,
    SandboxBlocked,
    Unavailable,
}

impl FailureKind {
    pub fn title(&self) -> &'static str {
        match self {
            FailureKind::SessionExpired => "Session expired",
            FailureKind::PermissionRequired => "Permission required",
            FailureKind::Network => "Network error",
            FailureKind::SandboxBlocked => "Preview blocked",
            FailureKind::Unavailable => "Preview unavailable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::SessionExpired => {
                "Your session has expired. Sign in again to load the ad preview."
            }
            FailureKind::PermissionRequired => {
                "Your account is missing the ad account permissions needed to generate previews. Reconnect your ad account or ask a workspace admin for access."
            }
            FailureKind::Network => {
                "Could not reach the preview service. Check your connection and try again."
            }
            FailureKind::SandboxBlocked => {
                "The ad platform refused to display this preview inside the page. Open it in a new tab instead."
            }
            FailureKind::Unavailable => {
                "A preview could not be generated right now. Please try again."
            }
        }
    }

    /// Whether offering a retry button makes sense for this category.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::PermissionRequired)
    }

    /// Map a backend error code (`SESSION_EXPIRED`, `permission_denied`, ...).
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase().replace(|c: char| c == '-' || c == ' ', "_");
        match code.as_str() {
            "SESSION_EXPIRED" | "UNAUTHENTICATED" | "UNAUTHORIZED" | "TOKEN_EXPIRED"
            | "INVALID_TOKEN" => Some(FailureKind::SessionExpired),
            "PERMISSION_DENIED" | "PERMISSION_REQUIRED" | "FORBIDDEN" | "MISSING_PERMISSION" => {
                Some(FailureKind::PermissionRequired)
            }
            "NETWORK_ERROR" | "TIMEOUT" | "UPSTREAM_TIMEOUT" => Some(FailureKind::Network),
            "PREVIEW_BLOCKED" | "SANDBOX_BLOCKED" => Some(FailureKind::SandboxBlocked),
            "PREVIEW_UNAVAILABLE" => Some(FailureKind::Unavailable),
            _ => None,
        }
    }

    /// Map an HTTP status that unambiguously identifies a category.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 419 | 440 => Some(FailureKind::SessionExpired),
            403 => Some(FailureKind::PermissionRequired),
            408 | 502 | 503 | 504 => Some(FailureKind::Network),
            _ => None,
        }
    }

    /// Substring heuristic over a free-form error message.
    pub fn from_message(message: &str) -> Self {
        const SESSION: &[&str] = &[
            "session",
            "expired",
            "unauthorized",
            "unauthenticated",
            "not logged in",
            "login required",
            "invalid token",
            "401",
        ];
        const PERMISSION: &[&str] = &[
            "permission",
            "forbidden",
            "not allowed",
            "access denied",
            "insufficient scope",
            "403",
        ];
        const SANDBOX: &[&str] = &[
            "sandbox",
            "blocked",
            "refused to display",
            "refused to frame",
            "x-frame-options",
            "frame-ancestors",
        ];
        const NETWORK: &[&str] = &[
            "network",
            "failed to fetch",
            "timed out",
            "timeout",
            "connection",
            "offline",
            "dns",
            "unreachable",
        ];

        let lower = message.to_lowercase();
        let hit = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if hit(SESSION) {
            FailureKind::SessionExpired
        } else if hit(PERMISSION) {
            FailureKind::PermissionRequired
        } else if hit(SANDBOX) {
            FailureKind::SandboxBlocked
        } else if hit(NETWORK) {
            FailureKind::Network
        } else {
            FailureKind::Unavailable
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Signals available when classifying a failure. All optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureSignals<'a> {
    pub code: Option<&'a str>,
    pub status: Option<u16>,
    pub message: Option<&'a str>,
}

/// A failure ready to show to the user: category, title, message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewFailure {
    pub kind: FailureKind,
    pub title: String,
    pub message: String,
    pub retryable: bool,
    /// URL the user can open in a new top-level tab instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_url: Option<String>,
    /// The underlying error text, for logs and support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PreviewFailure {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            message: kind.message().to_string(),
            retryable: kind.is_retryable(),
            open_url: None,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_open_url(mut self, url: impl Into<String>) -> Self {
        self.open_url = Some(url.into());
        self
    }

    /// Classify from whatever signals are available.
    pub fn classify(signals: FailureSignals<'_>) -> Self {
        let kind = signals
            .code
            .and_then(FailureKind::from_code)
            .or_else(|| signals.status.and_then(FailureKind::from_status))
            .unwrap_or_else(|| {
                signals
                    .message
                    .map(FailureKind::from_message)
                    .unwrap_or(FailureKind::Unavailable)
            });

        let failure = PreviewFailure::new(kind);
        match signals.message {
            Some(message) if !message.trim().is_empty() => failure.with_detail(message.trim()),
            _ => failure,
        }
    }

    /// Classify from an error message alone.
    pub fn from_message(message: &str) -> Self {
        Self::classify(FailureSignals {
            message: Some(message),
            ..Default::default()
        })
    }
}

impl fmt::Display for PreviewFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_heuristics() {
        let cases = [
            ("Session has expired", FailureKind::SessionExpired),
            ("HTTP 401 Unauthorized", FailureKind::SessionExpired),
            ("(#200) Permissions error", FailureKind::PermissionRequired),
            ("Forbidden", FailureKind::PermissionRequired),
            ("Refused to display in a frame because of X-Frame-Options", FailureKind::SandboxBlocked),
            ("Blocked script execution in 'about:srcdoc'", FailureKind::SandboxBlocked),
            ("TypeError: Failed to fetch", FailureKind::Network),
            ("operation timed out", FailureKind::Network),
            ("something odd happened", FailureKind::Unavailable),
        ];
        for (message, expected) in cases {
            assert_eq!(FailureKind::from_message(message), expected, "for {:?}", message);
        }
    }

    #[test]
    fn test_code_beats_status_beats_message() {
        let failure = PreviewFailure::classify(FailureSignals {
            code: Some("permission_denied"),
            status: Some(401),
            message: Some("network down"),
        });
        assert_eq!(failure.kind, FailureKind::PermissionRequired);

        let failure = PreviewFailure::classify(FailureSignals {
            code: Some("SOMETHING_NEW"),
            status: Some(401),
            message: Some("network down"),
        });
        assert_eq!(failure.kind, FailureKind::SessionExpired);

        let failure = PreviewFailure::classify(FailureSignals {
            code: None,
            status: Some(500),
            message: Some("network down"),
        });
        assert_eq!(failure.kind, FailureKind::Network);
        assert_eq!(failure.detail.as_deref(), Some("network down"));
    }

    #[test]
    fn test_no_signals_is_unavailable() {
        let failure = PreviewFailure::classify(FailureSignals::default());
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(failure.title, "Preview unavailable");
        assert!(failure.retryable);
        assert!(failure.detail.is_none());
    }

    #[test]
    fn test_permission_is_not_retryable() {
        assert!(!PreviewFailure::new(FailureKind::PermissionRequired).retryable);
        assert!(PreviewFailure::new(FailureKind::Network).retryable);
    }

    #[test]
    fn test_display() {
        let failure = PreviewFailure::new(FailureKind::Network);
        assert_eq!(
            failure.to_string(),
            "Network error: Could not reach the preview service. Check your connection and try again."
        );
    }
}
