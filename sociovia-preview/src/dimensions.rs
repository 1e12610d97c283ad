use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A declared iframe dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Dimension {
    Pixels(u32),
    Percent(u32),
}

impl Dimension {
    /// Value suitable for an HTML `width`/`height` attribute.
    pub fn to_attribute(&self) -> String {
        match self {
            Dimension::Pixels(px) => px.to_string(),
            Dimension::Percent(pct) => format!("{}%", pct),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pixels(px) => write!(f, "{}px", px),
            Dimension::Percent(pct) => write!(f, "{}%", pct),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
}

fn width_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(?:^|[\s"'])width\s*=\s*["']?\s*(\d+)\s*(%)?"#).unwrap())
}

fn height_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(?:^|[\s"'])height\s*=\s*["']?\s*(\d+)\s*(%)?"#).unwrap())
}

fn capture_dimension(re: &Regex, markup: &str) -> Option<Dimension> {
    let caps = re.captures(markup)?;
    // Values too large for u32 are treated as absent.
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    if caps.get(2).is_some() {
        Some(Dimension::Percent(value))
    } else {
        Some(Dimension::Pixels(value))
    }
}

/// Extract declared `width=` / `height=` from a markup fragment.
///
/// Each axis is searched independently; a missing or malformed axis is `None`.
pub fn parse_dimensions(markup: &str) -> Dimensions {
    Dimensions {
        width: capture_dimension(width_regex(), markup),
        height: capture_dimension(height_regex(), markup),
    }
}
