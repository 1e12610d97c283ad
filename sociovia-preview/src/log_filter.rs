//! Log filter that hides known-noisy warnings while a preview is on screen.
//!
//! Embedding ad previews makes browsers and WebView hosts emit the same
//! sandbox warning on every load. The filter drops events whose message
//! contains one of its patterns, but only while at least one
//! [`NoiseSuppression`] guard is alive. Outside that window every event
//! passes through untouched.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Filter, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Patterns suppressed by [`PreviewNoiseFilter::default`].
pub const DEFAULT_NOISE_PATTERNS: &[&str] = &[
    "an iframe which has both allow-scripts and allow-same-origin for its sandbox attribute can escape its sandboxing",
    "blocked script execution in 'about:srcdoc'",
];

struct Inner {
    patterns: Vec<String>,
    active: AtomicUsize,
}

#[derive(Clone)]
pub struct PreviewNoiseFilter {
    inner: Arc<Inner>,
}

impl PreviewNoiseFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            inner: Arc::new(Inner {
                patterns,
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Start suppressing. Suppression ends when every guard is dropped.
    pub fn suppress(&self) -> NoiseSuppression {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        NoiseSuppression {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst) > 0
    }

    pub fn should_drop(&self, message: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let lower = message.to_lowercase();
        self.inner.patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    /// A stderr `fmt` layer that applies this filter.
    pub fn fmt_layer<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(self.clone())
    }
}

impl Default for PreviewNoiseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_PATTERNS)
    }
}

impl fmt::Debug for PreviewNoiseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewNoiseFilter")
            .field("patterns", &self.inner.patterns)
            .field("active", &self.inner.active.load(Ordering::SeqCst))
            .finish()
    }
}

/// Keeps a [`PreviewNoiseFilter`] active for as long as it lives.
#[must_use = "suppression ends when the guard is dropped"]
pub struct NoiseSuppression {
    inner: Arc<Inner>,
}

impl Drop for NoiseSuppression {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for NoiseSuppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseSuppression").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S> Filter<S> for PreviewNoiseFilter {
    fn enabled(&self, _meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        true
    }

    fn event_enabled(&self, event: &Event<'_>, _cx: &Context<'_, S>) -> bool {
        if !self.is_active() {
            return true;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        !self.should_drop(&visitor.message)
    }
}
