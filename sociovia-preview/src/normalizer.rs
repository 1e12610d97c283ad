//! Turns raw backend preview items into [`PreviewDescriptor`]s.
//!
//! The backend has returned several shapes over time. Each known location
//! of renderable content is an extractor; extractors run in a fixed order
//! and the first one yielding a non-blank string wins.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::descriptor::{PreviewContent, PreviewDescriptor, RawPreviewPayload};

const UNKNOWN_FORMAT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Field normally holds a URL (may still hold iframe markup).
    Url,
    /// Field holds an HTML fragment or document.
    Markup,
}

struct Extractor {
    name: &'static str,
    kind: FieldKind,
    extract: fn(&Value) -> Option<&str>,
}

/// Probe order. Earlier entries win.
const EXTRACTORS: &[Extractor] = &[
    Extractor {
        name: "iframe_src",
        kind: FieldKind::Url,
        extract: top_level_iframe_src,
    },
    Extractor {
        name: "preview_html",
        kind: FieldKind::Markup,
        extract: top_level_preview_html,
    },
    Extractor {
        name: "raw.data[0].iframe",
        kind: FieldKind::Url,
        extract: nested_iframe,
    },
    Extractor {
        name: "raw.data[0].body",
        kind: FieldKind::Markup,
        extract: nested_body,
    },
    Extractor {
        name: "raw.data[0].html",
        kind: FieldKind::Markup,
        extract: nested_html,
    },
    Extractor {
        name: "raw.text",
        kind: FieldKind::Markup,
        extract: raw_text,
    },
];

fn top_level_iframe_src(v: &Value) -> Option<&str> {
    v.get("iframe_src")?.as_str()
}

fn top_level_preview_html(v: &Value) -> Option<&str> {
    v.get("preview_html")?.as_str()
}

fn first_nested(v: &Value) -> Option<&Value> {
    v.get("raw")?.get("data")?.get(0)
}

fn nested_iframe(v: &Value) -> Option<&str> {
    first_nested(v)?.get("iframe")?.as_str()
}

fn nested_body(v: &Value) -> Option<&str> {
    first_nested(v)?.get("body")?.as_str()
}

fn nested_html(v: &Value) -> Option<&str> {
    first_nested(v)?.get("html")?.as_str()
}

fn raw_text(v: &Value) -> Option<&str> {
    v.get("raw")?.get("text")?.as_str()
}

fn iframe_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<iframe\b[^>]*?\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
    })
}

/// Returns the `src` of the first `<iframe>` tag in `markup`, if any.
pub fn extract_iframe_src(markup: &str) -> Option<String> {
    let caps = iframe_src_regex().captures(markup)?;
    let src = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str()
        .trim();
    if src.is_empty() {
        None
    } else {
        Some(src.to_string())
    }
}

/// Decodes HTML entities (`&lt;`, `&quot;`, `&amp;`, numeric refs, ...).
pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

fn looks_like_url(s: &str) -> bool {
    if s.starts_with("//") {
        return !s.contains(char::is_whitespace);
    }
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Normalize a single raw payload.
pub fn normalize(raw: RawPreviewPayload) -> PreviewDescriptor {
    let format = raw.format().unwrap_or(UNKNOWN_FORMAT).to_string();
    let (content, embed_markup) = probe(raw.as_value());

    PreviewDescriptor {
        format,
        raw_source: raw,
        content,
        embed_markup,
    }
}

/// Normalize every payload of one response, preserving order.
pub fn normalize_all(raws: Vec<RawPreviewPayload>) -> Vec<PreviewDescriptor> {
    raws.into_iter().map(normalize).collect()
}

fn probe(value: &Value) -> (PreviewContent, Option<String>) {
    for extractor in EXTRACTORS {
        let Some(found) = (extractor.extract)(value) else {
            continue;
        };
        let decoded = decode_entities(found.trim());
        let decoded = decoded.trim();
        if decoded.is_empty() {
            continue;
        }

        if let Some(src) = extract_iframe_src(decoded).filter(|src| looks_like_url(src)) {
            tracing::debug!(field = extractor.name, "lifted iframe src from markup");
            return (PreviewContent::Remote(src), Some(decoded.to_string()));
        }

        if decoded.to_ascii_lowercase().contains("<iframe") {
            // An iframe without an http(s) src cannot be rendered remotely
            // and must not be nested inline.
            tracing::debug!(field = extractor.name, "skipping iframe markup without src");
            continue;
        }

        let content = match extractor.kind {
            FieldKind::Url if looks_like_url(decoded) => PreviewContent::Remote(decoded.to_string()),
            _ => PreviewContent::Inline(decoded.to_string()),
        };
        tracing::debug!(field = extractor.name, "normalized preview content");
        return (content, None);
    }

    (PreviewContent::Empty, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn norm(v: Value) -> PreviewDescriptor {
        normalize(RawPreviewPayload::new(v))
    }

    #[test]
    fn test_top_level_iframe_src_wins_over_nested() {
        let d = norm(json!({
            "iframe_src": "https://www.facebook.com/ads/api/preview_iframe.php?d=top",
            "raw": {"data": [{"iframe": "https://www.facebook.com/ads/api/preview_iframe.php?d=nested"}]}
        }));
        assert_eq!(
            d.iframe_src(),
            Some("https://www.facebook.com/ads/api/preview_iframe.php?d=top")
        );
    }

    #[test]
    fn test_preview_html_beats_nested_body() {
        let d = norm(json!({
            "preview_html": "<p>top</p>",
            "raw": {"data": [{"body": "<p>nested</p>"}]}
        }));
        assert_eq!(d.inline_markup(), Some("<p>top</p>"));
    }

    #[test]
    fn test_nested_body_with_escaped_iframe() {
        let d = norm(json!({
            "format": "DESKTOP_FEED_STANDARD",
            "raw": {"data": [{"body": "&lt;iframe src=&quot;https://www.facebook.com/ads/api/preview_iframe.php?d=AQ&amp;t=AQ&quot; width=&quot;540&quot; height=&quot;690&quot;&gt;&lt;/iframe&gt;"}]}
        }));
        assert_eq!(d.format, "DESKTOP_FEED_STANDARD");
        assert_eq!(
            d.iframe_src(),
            Some("https://www.facebook.com/ads/api/preview_iframe.php?d=AQ&t=AQ")
        );
        assert!(d.embed_markup.as_deref().unwrap().contains("width=\"540\""));
        assert_eq!(d.inline_markup(), None);
    }

    #[test]
    fn test_nested_html_then_raw_text() {
        let d = norm(json!({"raw": {"data": [{"html": "<b>h</b>"}], "text": "<i>t</i>"}}));
        assert_eq!(d.inline_markup(), Some("<b>h</b>"));

        let d = norm(json!({"raw": {"text": "<i>t</i>"}}));
        assert_eq!(d.inline_markup(), Some("<i>t</i>"));
    }

    #[test]
    fn test_blank_fields_are_skipped() {
        let d = norm(json!({"iframe_src": "   ", "preview_html": "", "raw": {"text": "<p>x</p>"}}));
        assert_eq!(d.inline_markup(), Some("<p>x</p>"));
    }

    #[test]
    fn test_nothing_renderable_is_empty() {
        let d = norm(json!({"format": "MOBILE_FEED_STANDARD"}));
        assert!(d.is_empty());
        assert_eq!(d.iframe_src(), None);
        assert_eq!(d.inline_markup(), None);
    }

    #[test]
    fn test_iframe_without_src_falls_through() {
        let d = norm(json!({"preview_html": "<iframe width=10></iframe>", "raw": {"text": "<p>ok</p>"}}));
        assert_eq!(d.inline_markup(), Some("<p>ok</p>"));
    }

    #[test]
    fn test_non_http_iframe_src_falls_through() {
        let d = norm(json!({
            "preview_html": "<iframe src=\"javascript:alert(1)\" width=10></iframe>",
            "raw": {"data": [{"iframe": "&lt;iframe src=&quot;https://www.facebook.com/ads/api/preview_iframe.php?d=2&quot;&gt;&lt;/iframe&gt;"}]}
        }));
        assert_eq!(
            d.iframe_src(),
            Some("https://www.facebook.com/ads/api/preview_iframe.php?d=2")
        );

        let d = norm(json!({"iframe_src": "<iframe src='data:text/html,hi'></iframe>"}));
        assert_eq!(d.iframe_src(), None);
        assert_eq!(d.inline_markup(), None);
    }

    #[test]
    fn test_nested_iframe_field_with_markup_is_not_a_url() {
        let d = norm(json!({"raw": {"data": [{"iframe": "<div>not a url</div>"}]}}));
        assert_eq!(d.inline_markup(), Some("<div>not a url</div>"));
    }

    #[test]
    fn test_never_both_populated() {
        let inputs = vec![
            json!({"iframe_src": "https://x.test/a", "preview_html": "<p>x</p>"}),
            json!({"preview_html": "<div><iframe src='https://x.test/b'></iframe></div>"}),
            json!({"raw": {"data": [{"body": "<p>b</p>", "iframe": "https://x.test/c"}]}}),
            json!({}),
            json!("just a string"),
        ];
        for input in inputs {
            let d = norm(input);
            assert!(!(d.iframe_src().is_some() && d.inline_markup().is_some()));
        }
    }

    #[test]
    fn test_extract_iframe_src_quoting() {
        assert_eq!(
            extract_iframe_src(r#"<IFRAME width="1" SRC="https://a.test/x"></IFRAME>"#),
            Some("https://a.test/x".to_string())
        );
        assert_eq!(
            extract_iframe_src("<iframe src='https://a.test/y'>"),
            Some("https://a.test/y".to_string())
        );
        assert_eq!(
            extract_iframe_src("<iframe src=https://a.test/z height=3>"),
            Some("https://a.test/z".to_string())
        );
        assert_eq!(extract_iframe_src("<iframe data-src=\"x\">"), None);
        assert_eq!(extract_iframe_src("<div src=\"x\">"), None);
    }

    #[test]
    fn test_missing_format_defaults_to_unknown() {
        assert_eq!(norm(json!({"preview_html": "<p/>"})).format, "unknown");
    }
}
