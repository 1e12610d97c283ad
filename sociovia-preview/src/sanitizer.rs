//! Strips active content from preview markup before it is handed to an
//! iframe `srcdoc`.
//!
//! The markup is parsed into a DOM with html5ever, mutated in place and
//! serialized back. Removed:
//! - every `script` element (any namespace)
//! - `meta` elements whose `http-equiv` is `refresh`
//! - `link` elements whose `rel` is `preload`
//! - every attribute whose name starts with `on` (ASCII case-insensitive)
//!
//! Parsing and serializing run with scripting disabled, the way a sandboxed
//! frame without `allow-scripts` sees the document, so `<noscript>`
//! content is walked as markup rather than kept as opaque text.
//!
//! Sanitizing never fails. If the DOM path errors, a regex pass strips the
//! same constructs from the raw string instead.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::OnceLock;

const DOCTYPE: &str = "<!DOCTYPE html>";
const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// What the sanitizer removed from one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalCounts {
    pub scripts: usize,
    pub refresh_metas: usize,
    pub preload_links: usize,
    pub event_handlers: usize,
}

impl RemovalCounts {
    pub fn total(&self) -> usize {
        self.scripts + self.refresh_metas + self.preload_links + self.event_handlers
    }
}

/// Serialized HTML with active content removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedDocument {
    html: String,
    pub removed: RemovalCounts,
    /// True when the regex fallback produced this document.
    pub used_fallback: bool,
}

impl SanitizedDocument {
    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn into_string(self) -> String {
        self.html
    }
}

impl AsRef<str> for SanitizedDocument {
    fn as_ref(&self) -> &str {
        &self.html
    }
}

/// Sanitize `markup`, optionally pinning a `<base href>` as the first child of `<head>`.
pub fn sanitize(markup: &str, base_href: Option<&str>) -> SanitizedDocument {
    let base_href = base_href.map(str::trim).filter(|h| !h.is_empty());
    match sanitize_dom(markup, base_href) {
        Ok((html, removed)) => {
            if removed.total() > 0 {
                tracing::debug!(
                    scripts = removed.scripts,
                    refresh_metas = removed.refresh_metas,
                    preload_links = removed.preload_links,
                    event_handlers = removed.event_handlers,
                    "sanitized preview markup"
                );
            }
            SanitizedDocument {
                html,
                removed,
                used_fallback: false,
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "DOM sanitization failed, using regex fallback");
            sanitize_fallback(markup)
        }
    }
}

fn sanitize_dom(markup: &str, base_href: Option<&str>) -> io::Result<(String, RemovalCounts)> {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let dom = parse_document(RcDom::default(), opts)
        .from_utf8()
        .read_from(&mut markup.as_bytes())?;

    let mut removed = RemovalCounts::default();
    strip_active_content(&dom.document, &mut removed);

    if let Some(href) = base_href {
        match find_head(&dom.document) {
            Some(head) => pin_base_href(&head, href),
            None => tracing::debug!("document has no <head>, base href not applied"),
        }
    }

    let mut out = Vec::with_capacity(markup.len() + DOCTYPE.len());
    out.extend_from_slice(DOCTYPE.as_bytes());
    let children: Vec<Handle> = dom.document.children.borrow().clone();
    for child in children {
        if matches!(child.data, NodeData::Doctype { .. }) {
            continue;
        }
        let handle: SerializableHandle = child.into();
        serialize(
            &mut out,
            &handle,
            SerializeOpts {
                scripting_enabled: false,
                traversal_scope: TraversalScope::IncludeNode,
                ..Default::default()
            },
        )?;
    }

    let html = String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok((html, removed))
}

fn local_name(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

fn attr_value(node: &Node, attr: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| (*a.name.local).eq_ignore_ascii_case(attr))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn attr_equals(node: &Node, attr: &str, expected: &str) -> bool {
    attr_value(node, attr)
        .map(|v| v.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn is_event_handler(attr: &str) -> bool {
    attr.get(..2)
        .map(|prefix| prefix.eq_ignore_ascii_case("on"))
        .unwrap_or(false)
}

/// Classify a node for removal, bumping the matching counter.
fn take_if_active(node: &Node, removed: &mut RemovalCounts) -> bool {
    match local_name(node) {
        Some(name) if name.eq_ignore_ascii_case("script") => {
            removed.scripts += 1;
            true
        }
        Some(name) if name.eq_ignore_ascii_case("meta") && attr_equals(node, "http-equiv", "refresh") => {
            removed.refresh_metas += 1;
            true
        }
        Some(name) if name.eq_ignore_ascii_case("link") && attr_equals(node, "rel", "preload") => {
            removed.preload_links += 1;
            true
        }
        _ => false,
    }
}

fn strip_active_content(node: &Handle, removed: &mut RemovalCounts) {
    if let NodeData::Element {
        attrs,
        template_contents,
        ..
    } = &node.data
    {
        let mut attrs = attrs.borrow_mut();
        let before = attrs.len();
        attrs.retain(|a| !is_event_handler(&a.name.local));
        removed.event_handlers += before - attrs.len();
        drop(attrs);

        let template = template_contents.borrow().clone();
        if let Some(contents) = template {
            strip_active_content(&contents, removed);
        }
    }

    node.children.borrow_mut().retain(|child| {
        if take_if_active(child, removed) {
            child.parent.set(None);
            false
        } else {
            true
        }
    });

    let children: Vec<Handle> = node.children.borrow().clone();
    for child in &children {
        strip_active_content(child, removed);
    }
}

fn find_child_element(parent: &Handle, name: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|c| local_name(c) == Some(name))
        .cloned()
}

fn find_head(document: &Handle) -> Option<Handle> {
    let html = find_child_element(document, "html")?;
    find_child_element(&html, "head")
}

fn html_name(local: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(local))
}

fn plain_attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from_slice(value),
    }
}

fn set_href(base: &Node, href: &str) {
    if let NodeData::Element { attrs, .. } = &base.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == "href") {
            Some(existing) => existing.value = StrTendril::from_slice(href),
            None => attrs.push(plain_attribute("href", href)),
        }
    }
}

/// Make sure `<head>` starts with a `<base>` carrying `href`, reusing the
/// first existing `<base>` when there is one.
fn pin_base_href(head: &Handle, href: &str) {
    let mut children = head.children.borrow_mut();
    let base = match children.iter().position(|c| local_name(c) == Some("base")) {
        Some(idx) => children.remove(idx),
        None => {
            let node = Node::new(NodeData::Element {
                name: html_name("base"),
                attrs: RefCell::new(Vec::new()),
                template_contents: RefCell::new(None),
                mathml_annotation_xml_integration_point: false,
            });
            node.parent.set(Some(Rc::downgrade(head)));
            node
        }
    };
    set_href(&base, href);
    children.insert(0, base);
}

struct FallbackPatterns {
    script_block: Regex,
    script_tag: Regex,
    refresh_meta: Regex,
    preload_link: Regex,
    event_handler: Regex,
}

fn fallback_patterns() -> &'static FallbackPatterns {
    static PATTERNS: OnceLock<FallbackPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FallbackPatterns {
        script_block: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap(),
        script_tag: Regex::new(r"(?is)</?script\b[^>]*>").unwrap(),
        refresh_meta: Regex::new(
            r#"(?is)<meta\b[^>]*\bhttp-equiv\s*=\s*(?:"\s*refresh\s*"|'\s*refresh\s*'|refresh\b)[^>]*>"#,
        )
        .unwrap(),
        preload_link: Regex::new(
            r#"(?is)<link\b[^>]*\brel\s*=\s*(?:"\s*preload\s*"|'\s*preload\s*'|preload\b)[^>]*>"#,
        )
        .unwrap(),
        event_handler: Regex::new(r#"(?is)\s+on[a-z0-9_:.-]*\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
            .unwrap(),
    })
}

fn strip_counted(re: &Regex, input: String, counter: &mut usize) -> String {
    let hits = re.find_iter(&input).count();
    if hits == 0 {
        return input;
    }
    *counter += hits;
    re.replace_all(&input, "").into_owned()
}

/// Best-effort string stripping, used when the DOM path cannot run.
pub fn sanitize_fallback(markup: &str) -> SanitizedDocument {
    let patterns = fallback_patterns();
    let mut removed = RemovalCounts::default();

    let html = strip_counted(&patterns.script_block, markup.to_string(), &mut removed.scripts);
    let html = strip_counted(&patterns.script_tag, html, &mut removed.scripts);
    let html = strip_counted(&patterns.refresh_meta, html, &mut removed.refresh_metas);
    let html = strip_counted(&patterns.preload_link, html, &mut removed.preload_links);
    let html = strip_counted(&patterns.event_handler, html, &mut removed.event_handlers);

    SanitizedDocument {
        html,
        removed,
        used_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOSTILE: &str = r#"<div onclick="x()"><script>evil()</script><meta http-equiv="refresh" content="0"><link rel="preload" href="a"></div>"#;

    fn assert_clean(html: &str) {
        let lower = html.to_ascii_lowercase();
        assert!(!lower.contains("<script"), "script left in: {}", html);
        assert!(!lower.contains("http-equiv=\"refresh\""), "refresh left in: {}", html);
        assert!(!lower.contains("rel=\"preload\""), "preload left in: {}", html);
        assert!(!lower.contains("onclick="), "handler left in: {}", html);
    }

    #[test]
    fn test_strips_hostile_fragment() {
        let doc = sanitize(HOSTILE, None);
        assert_clean(doc.as_str());
        assert!(!doc.used_fallback);
        assert_eq!(
            doc.removed,
            RemovalCounts {
                scripts: 1,
                refresh_metas: 1,
                preload_links: 1,
                event_handlers: 1,
            }
        );
        assert!(doc.as_str().starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            HOSTILE,
            "<html><head><title>t</title></head><body>Hi<script>bad()</script></body></html>",
            "<!doctype html><p onmouseover='x'>a<b>b</b></p><svg><script>1</script></svg>",
            "plain text",
            "",
        ];
        for input in inputs {
            let once = sanitize(input, None);
            let twice = sanitize(once.as_str(), None);
            assert_eq!(once.as_str(), twice.as_str());
            assert_eq!(twice.removed.total(), 0);
        }
    }

    #[test]
    fn test_keeps_harmless_meta_and_links() {
        let doc = sanitize(
            r#"<html><head><meta charset="utf-8"><meta http-equiv="content-type" content="text/html"><link rel="stylesheet" href="s.css"></head><body></body></html>"#,
            None,
        );
        assert!(doc.as_str().contains(r#"<meta charset="utf-8">"#));
        assert!(doc.as_str().contains(r#"http-equiv="content-type""#));
        assert!(doc.as_str().contains(r#"rel="stylesheet""#));
        assert_eq!(doc.removed.total(), 0);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let doc = sanitize(
            r##"<META HTTP-EQUIV="Refresh" content="1"><LINK REL="PreLoad" href="x"><a ONCLICK="y" OnMouseOver="z" href="#">a</a>"##,
            None,
        );
        assert_eq!(doc.removed.refresh_metas, 1);
        assert_eq!(doc.removed.preload_links, 1);
        assert_eq!(doc.removed.event_handlers, 2);
        assert!(doc.as_str().contains(r##"<a href="#">a</a>"##));
    }

    #[test]
    fn test_svg_and_template_scripts_removed() {
        let doc = sanitize(
            "<svg><script>a()</script></svg><template><script>b()</script><p onload='c'>t</p></template>",
            None,
        );
        assert_eq!(doc.removed.scripts, 2);
        assert_eq!(doc.removed.event_handlers, 1);
        assert!(!doc.as_str().to_ascii_lowercase().contains("<script"));
    }

    #[test]
    fn test_noscript_content_is_sanitized() {
        let input = r#"<html><head><noscript><meta http-equiv="refresh" content="0;url=https://evil.example"><link rel="preload" href="x"></noscript></head><body><noscript><img src=x onerror="alert(1)"></noscript>Hi</body></html>"#;
        let doc = sanitize(input, None);
        let lower = doc.as_str().to_ascii_lowercase();
        assert!(!lower.contains("refresh"), "refresh left in: {}", doc.as_str());
        assert!(!lower.contains("preload"), "preload left in: {}", doc.as_str());
        assert!(!lower.contains("onerror"), "handler left in: {}", doc.as_str());
        assert_eq!(
            doc.removed,
            RemovalCounts {
                scripts: 0,
                refresh_metas: 1,
                preload_links: 1,
                event_handlers: 1,
            }
        );
        assert!(doc.as_str().contains("<noscript><img src=\"x\"></noscript>"));

        let again = sanitize(doc.as_str(), None);
        assert_eq!(again.as_str(), doc.as_str());
        assert_eq!(again.removed.total(), 0);
    }

    #[test]
    fn test_base_href_created_as_first_head_child() {
        let doc = sanitize(
            "<html><head><title>x</title></head><body></body></html>",
            Some("https://cdn.test/assets/"),
        );
        assert!(doc
            .as_str()
            .contains(r#"<head><base href="https://cdn.test/assets/"><title>x</title>"#));
    }

    #[test]
    fn test_existing_base_is_moved_and_updated() {
        let doc = sanitize(
            r#"<html><head><title>x</title><base href="/old/" target="_blank"></head><body></body></html>"#,
            Some("https://new.test/"),
        );
        assert!(doc
            .as_str()
            .contains(r#"<head><base href="https://new.test/" target="_blank"><title>x</title></head>"#));
        assert_eq!(doc.as_str().matches("<base").count(), 1);
    }

    #[test]
    fn test_blank_base_href_ignored() {
        let doc = sanitize("<p>x</p>", Some("   "));
        assert!(!doc.as_str().contains("<base"));
    }

    #[test]
    fn test_fallback_strips_constructs() {
        let doc = sanitize_fallback(HOSTILE);
        assert!(doc.used_fallback);
        assert_clean(doc.as_str());
        assert_eq!(doc.removed.scripts, 1);
        assert_eq!(doc.removed.refresh_metas, 1);
        assert_eq!(doc.removed.preload_links, 1);
        assert_eq!(doc.removed.event_handlers, 1);
    }

    #[test]
    fn test_fallback_handles_unclosed_script_and_unquoted_values() {
        let doc = sanitize_fallback("<p onclick=go()>x</p><script src=a.js>");
        assert_eq!(doc.as_str(), "<p>x</p>");
    }

    #[test]
    fn test_is_event_handler() {
        assert!(is_event_handler("onclick"));
        assert!(is_event_handler("ONLOAD"));
        assert!(!is_event_handler("o"));
        assert!(!is_event_handler("href"));
    }
}
