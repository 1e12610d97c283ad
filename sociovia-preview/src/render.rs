use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::descriptor::{PreviewContent, PreviewDescriptor};
use crate::dimensions::{parse_dimensions, Dimension, Dimensions};
use crate::error::{PreviewError, PreviewResult};
use crate::failure::{FailureKind, PreviewFailure};
use crate::sanitizer::{sanitize, SanitizedDocument};

pub const DEFAULT_TRUSTED_DOMAIN: &str = "facebook.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    SanitizedInline,
    RemoteIframe,
    StaticImage,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::SanitizedInline => "sanitized-inline",
            RenderMode::RemoteIframe => "remote-iframe",
            RenderMode::StaticImage => "static-image",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One iframe `sandbox` capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SandboxCapability {
    #[serde(rename = "allow-same-origin")]
    SameOrigin,
    #[serde(rename = "allow-popups")]
    Popups,
    #[serde(rename = "allow-forms")]
    Forms,
    #[serde(rename = "allow-scripts")]
    Scripts,
    #[serde(rename = "allow-top-navigation-by-user-activation")]
    TopNavigationByUserActivation,
}

impl SandboxCapability {
    pub fn token(&self) -> &'static str {
        match self {
            SandboxCapability::SameOrigin => "allow-same-origin",
            SandboxCapability::Popups => "allow-popups",
            SandboxCapability::Forms => "allow-forms",
            SandboxCapability::Scripts => "allow-scripts",
            SandboxCapability::TopNavigationByUserActivation => {
                "allow-top-navigation-by-user-activation"
            }
        }
    }
}

const BASE_CAPABILITIES: [SandboxCapability; 3] = [
    SandboxCapability::SameOrigin,
    SandboxCapability::Popups,
    SandboxCapability::Forms,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxFlags(BTreeSet<SandboxCapability>);

impl SandboxFlags {
    /// `{allow-same-origin, allow-popups, allow-forms}`.
    pub fn base() -> Self {
        Self(BASE_CAPABILITIES.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn with(mut self, capability: SandboxCapability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: SandboxCapability) -> bool {
        self.0.contains(&capability)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SandboxCapability> + '_ {
        self.0.iter().copied()
    }

    /// Space-separated value for the iframe `sandbox` attribute.
    pub fn to_attribute(&self) -> String {
        self.0
            .iter()
            .map(SandboxCapability::token)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Caller-controlled inputs to render selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPolicy {
    trusted_domain: String,
    pub allow_unsafe_scripts: bool,
    pub base_href: Option<String>,
    /// Creative image shown when nothing else can be rendered.
    pub fallback_image: Option<String>,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            trusted_domain: DEFAULT_TRUSTED_DOMAIN.to_string(),
            allow_unsafe_scripts: false,
            base_href: None,
            fallback_image: None,
        }
    }
}

impl RenderPolicy {
    pub fn new(trusted_domain: &str) -> PreviewResult<Self> {
        Ok(Self {
            trusted_domain: normalize_domain(trusted_domain)?,
            ..Default::default()
        })
    }

    pub fn trusted_domain(&self) -> &str {
        &self.trusted_domain
    }

    pub fn with_unsafe_scripts(mut self, allow: bool) -> Self {
        self.allow_unsafe_scripts = allow;
        self
    }

    pub fn with_base_href(mut self, base_href: &str) -> PreviewResult<Self> {
        let href = base_href.trim();
        url::Url::parse(href).map_err(|e| PreviewError::InvalidBaseHref {
            href: href.to_string(),
            reason: e.to_string(),
        })?;
        self.base_href = Some(href.to_string());
        Ok(self)
    }

    pub fn with_fallback_image(mut self, image_url: impl Into<String>) -> Self {
        self.fallback_image = Some(image_url.into());
        self
    }

    /// True when `src` resolves to the trusted domain or one of its subdomains.
    pub fn is_trusted_src(&self, src: &str) -> bool {
        let absolute = if src.starts_with("//") {
            format!("https:{}", src)
        } else {
            src.to_string()
        };
        let Ok(url) = url::Url::parse(&absolute) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == self.trusted_domain || host.ends_with(&format!(".{}", self.trusted_domain))
    }
}

fn normalize_domain(domain: &str) -> PreviewResult<String> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    let invalid = |reason: &str| PreviewError::InvalidTrustedDomain {
        domain: domain.clone(),
        reason: reason.to_string(),
    };
    if domain.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if domain.contains("://") || domain.contains('/') {
        return Err(invalid("expected a bare host name, not a URL"));
    }
    if domain
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
    {
        return Err(invalid("contains characters not allowed in a host name"));
    }
    Ok(domain)
}

/// What the view should actually load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderSource {
    Document { html: SanitizedDocument },
    Remote { src: String },
    Image { url: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderDecision {
    pub mode: RenderMode,
    pub sandbox_flags: SandboxFlags,
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub source: RenderSource,
}

impl RenderDecision {
    /// URL to offer for opening in a new tab, when there is one.
    pub fn open_url(&self) -> Option<&str> {
        match &self.source {
            RenderSource::Remote { src } => Some(src),
            RenderSource::Image { url } => url.as_deref(),
            RenderSource::Document { .. } => None,
        }
    }
}

/// Pick how to render `descriptor` under `policy`.
pub fn select_render(descriptor: &PreviewDescriptor, policy: &RenderPolicy) -> RenderDecision {
    let dims = dimensions_for(descriptor);

    match &descriptor.content {
        PreviewContent::Inline(markup) => {
            let html = sanitize(markup, policy.base_href.as_deref());
            let mut flags = SandboxFlags::base();
            if policy.allow_unsafe_scripts {
                flags = flags.with(SandboxCapability::Scripts);
            }
            RenderDecision {
                mode: RenderMode::SanitizedInline,
                sandbox_flags: flags,
                width: dims.width,
                height: dims.height,
                source: RenderSource::Document { html },
            }
        }
        PreviewContent::Remote(src) => {
            let trusted = policy.is_trusted_src(src);
            let mut flags = SandboxFlags::base();
            if trusted || policy.allow_unsafe_scripts {
                flags = flags
                    .with(SandboxCapability::Scripts)
                    .with(SandboxCapability::TopNavigationByUserActivation);
            }
            tracing::debug!(trusted, sandbox = %flags.to_attribute(), "selected remote iframe");
            RenderDecision {
                mode: RenderMode::RemoteIframe,
                sandbox_flags: flags,
                width: dims.width,
                height: dims.height,
                source: RenderSource::Remote { src: src.clone() },
            }
        }
        PreviewContent::Empty => RenderDecision {
            mode: RenderMode::StaticImage,
            sandbox_flags: SandboxFlags::none(),
            width: None,
            height: None,
            source: RenderSource::Image {
                url: policy.fallback_image.clone(),
            },
        },
    }
}

fn dimensions_for(descriptor: &PreviewDescriptor) -> Dimensions {
    descriptor
        .embed_markup
        .as_deref()
        .map(parse_dimensions)
        .unwrap_or_default()
}

/// Failure to show when the browser reports an iframe load error.
///
/// Points the user at opening the preview in a new top-level tab.
pub fn load_failure(decision: &RenderDecision) -> PreviewFailure {
    let failure = PreviewFailure::new(FailureKind::SandboxBlocked)
        .with_detail(format!("{} preview failed to load", decision.mode));
    match decision.open_url() {
        Some(url) => failure.with_open_url(url),
        None => failure,
    }
}

/// A descriptor together with its current render decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPreview {
    pub descriptor: PreviewDescriptor,
    pub decision: RenderDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_href: Option<String>,
}

impl RenderedPreview {
    pub fn build(descriptor: PreviewDescriptor, policy: &RenderPolicy) -> Self {
        let decision = select_render(&descriptor, policy);
        Self {
            descriptor,
            decision,
            base_href: policy.base_href.clone(),
        }
    }

    /// Re-sanitize against a new base-href override. Returns whether the
    /// document was recomputed.
    pub fn rebase(&mut self, base_href: Option<&str>) -> bool {
        if self.base_href.as_deref() == base_href {
            return false;
        }
        self.base_href = base_href.map(str::to_string);
        let Some(markup) = self.descriptor.inline_markup() else {
            return false;
        };
        let html = sanitize(markup, base_href);
        self.decision.source = RenderSource::Document { html };
        true
    }

    pub fn sanitized_document(&self) -> Option<&SanitizedDocument> {
        match &self.decision.source {
            RenderSource::Document { html } => Some(html),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RawPreviewPayload;
    use serde_json::json;

    fn descriptor(content: PreviewContent, embed: Option<&str>) -> PreviewDescriptor {
        PreviewDescriptor {
            format: "MOBILE_FEED_STANDARD".to_string(),
            raw_source: RawPreviewPayload::new(json!({})),
            content,
            embed_markup: embed.map(str::to_string),
        }
    }

    #[test]
    fn test_trusted_remote_gets_scripts() {
        let d = descriptor(
            PreviewContent::Remote("https://www.facebook.com/ads/api/preview_iframe.php?d=1".to_string()),
            None,
        );
        let decision = select_render(&d, &RenderPolicy::default());
        assert_eq!(decision.mode, RenderMode::RemoteIframe);
        assert!(decision.sandbox_flags.contains(SandboxCapability::Scripts));
        assert!(decision
            .sandbox_flags
            .contains(SandboxCapability::TopNavigationByUserActivation));
    }

    #[test]
    fn test_untrusted_remote_gets_base_only() {
        let d = descriptor(PreviewContent::Remote("https://evil.test/frame".to_string()), None);
        let decision = select_render(&d, &RenderPolicy::default());
        assert_eq!(decision.sandbox_flags, SandboxFlags::base());
        assert_eq!(
            decision.sandbox_flags.to_attribute(),
            "allow-same-origin allow-popups allow-forms"
        );
    }

    #[test]
    fn test_untrusted_remote_with_opt_in() {
        let d = descriptor(PreviewContent::Remote("https://evil.test/frame".to_string()), None);
        let policy = RenderPolicy::default().with_unsafe_scripts(true);
        let decision = select_render(&d, &policy);
        assert!(decision.sandbox_flags.contains(SandboxCapability::Scripts));
    }

    #[test]
    fn test_lookalike_hosts_are_not_trusted() {
        let policy = RenderPolicy::default();
        assert!(policy.is_trusted_src("https://facebook.com/x"));
        assert!(policy.is_trusted_src("https://WWW.Facebook.com./x"));
        assert!(policy.is_trusted_src("//m.facebook.com/x"));
        assert!(!policy.is_trusted_src("https://notfacebook.com/x"));
        assert!(!policy.is_trusted_src("https://facebook.com.evil.test/x"));
        assert!(!policy.is_trusted_src("javascript:alert(1)//facebook.com"));
        assert!(!policy.is_trusted_src("not a url"));
    }

    #[test]
    fn test_inline_default_and_opt_in() {
        let d = descriptor(PreviewContent::Inline("<p>x</p>".to_string()), None);
        let decision = select_render(&d, &RenderPolicy::default());
        assert_eq!(decision.mode, RenderMode::SanitizedInline);
        assert_eq!(decision.sandbox_flags, SandboxFlags::base());

        let decision = select_render(&d, &RenderPolicy::default().with_unsafe_scripts(true));
        assert_eq!(decision.sandbox_flags, SandboxFlags::base().with(SandboxCapability::Scripts));
        assert!(!decision
            .sandbox_flags
            .contains(SandboxCapability::TopNavigationByUserActivation));
    }

    #[test]
    fn test_empty_falls_back_to_image() {
        let d = descriptor(PreviewContent::Empty, None);
        let policy = RenderPolicy::default().with_fallback_image("https://cdn.test/creative.jpg");
        let decision = select_render(&d, &policy);
        assert_eq!(decision.mode, RenderMode::StaticImage);
        assert!(decision.sandbox_flags.is_empty());
        assert_eq!(
            decision.source,
            RenderSource::Image {
                url: Some("https://cdn.test/creative.jpg".to_string())
            }
        );
    }

    #[test]
    fn test_dimensions_come_from_embed_markup() {
        let d = descriptor(
            PreviewContent::Remote("https://www.facebook.com/p".to_string()),
            Some(r#"<iframe src="https://www.facebook.com/p" width="540" height="100%"></iframe>"#),
        );
        let decision = select_render(&d, &RenderPolicy::default());
        assert_eq!(decision.width, Some(Dimension::Pixels(540)));
        assert_eq!(decision.height, Some(Dimension::Percent(100)));
    }

    #[test]
    fn test_load_failure_points_to_new_tab() {
        let d = descriptor(PreviewContent::Remote("https://www.facebook.com/p".to_string()), None);
        let decision = select_render(&d, &RenderPolicy::default());
        let failure = load_failure(&decision);
        assert_eq!(failure.kind, FailureKind::SandboxBlocked);
        assert_eq!(failure.open_url.as_deref(), Some("https://www.facebook.com/p"));
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(RenderPolicy::new(" Example.COM. ").unwrap().trusted_domain(), "example.com");
        assert!(RenderPolicy::new("").is_err());
        assert!(RenderPolicy::new("https://facebook.com").is_err());
        assert!(RenderPolicy::new("face book.com").is_err());
        assert!(RenderPolicy::default().with_base_href("not a url").is_err());
        assert!(RenderPolicy::default().with_base_href("https://cdn.test/").is_ok());
    }

    #[test]
    fn test_rebase_only_recomputes_on_change() {
        let d = descriptor(
            PreviewContent::Inline("<html><head></head><body>x</body></html>".to_string()),
            None,
        );
        let mut rendered = RenderedPreview::build(d, &RenderPolicy::default());
        assert!(!rendered.rebase(None));
        assert!(rendered.rebase(Some("https://cdn.test/")));
        assert!(rendered
            .sanitized_document()
            .unwrap()
            .as_str()
            .contains(r#"<base href="https://cdn.test/">"#));
        assert!(!rendered.rebase(Some("https://cdn.test/")));
    }
}
