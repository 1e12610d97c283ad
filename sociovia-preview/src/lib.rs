//! # Sociovia ad-preview pipeline
//!
//! Turns the loosely-shaped preview payloads returned by the ad platform
//! into something a browser view can render safely.
//!
//! ## Stages
//! - [`normalizer`]: probe raw payloads for an iframe URL or inline markup
//! - [`sanitizer`]: strip scripts, refresh metas, preload links and `on*` handlers
//! - [`dimensions`]: read declared `width=`/`height=` from embed markup
//! - [`render`]: pick a render mode and sandbox capability set
//! - [`failure`]: classify errors into user-facing categories
//!
//! ## Example
//! ```ignore
//! use sociovia_preview::{prepare_previews, RenderPolicy};
//!
//! let body = serde_json::json!({
//!     "ok": true,
//!     "previews": [{ "format": "MOBILE_FEED_STANDARD", "preview_html": "<p>Hi</p>" }]
//! });
//!
//! let previews = prepare_previews(&body, &RenderPolicy::default())?;
//! println!("{}", previews[0].decision.mode);
//! ```

pub mod descriptor;
pub mod dimensions;
pub mod error;
pub mod failure;
pub mod log_filter;
pub mod normalizer;
pub mod render;
pub mod sanitizer;

// --- Core types ---
pub use descriptor::{PreviewContent, PreviewDescriptor, RawPreviewPayload};
pub use dimensions::{Dimension, Dimensions};
pub use error::{PreviewError, PreviewResult};
pub use failure::{FailureKind, FailureSignals, PreviewFailure};
pub use log_filter::{NoiseSuppression, PreviewNoiseFilter};
pub use render::{
    RenderDecision, RenderMode, RenderPolicy, RenderSource, RenderedPreview, SandboxCapability,
    SandboxFlags, DEFAULT_TRUSTED_DOMAIN,
};
pub use sanitizer::{RemovalCounts, SanitizedDocument};

// --- Pipeline entry points ---
pub use descriptor::{collect_payloads, parse_preview_response};
pub use dimensions::parse_dimensions;
pub use normalizer::{normalize, normalize_all};
pub use render::{load_failure, select_render};
pub use sanitizer::sanitize;

/// Unwrap a preview response and run every item through normalize and
/// render selection.
pub fn prepare_previews(
    body: &serde_json::Value,
    policy: &RenderPolicy,
) -> PreviewResult<Vec<RenderedPreview>> {
    let raws = parse_preview_response(body)?;
    Ok(render_all(normalize_all(raws), policy))
}

/// Build a [`RenderedPreview`] for each descriptor, in order.
pub fn render_all(descriptors: Vec<PreviewDescriptor>, policy: &RenderPolicy) -> Vec<RenderedPreview> {
    descriptors
        .into_iter()
        .map(|descriptor| RenderedPreview::build(descriptor, policy))
        .collect()
}
