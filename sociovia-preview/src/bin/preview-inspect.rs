//! preview-inspect - run saved preview payloads through the render pipeline.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use sociovia_preview::{
    collect_payloads, normalize_all, render_all, PreviewNoiseFilter, RemovalCounts,
    RenderPolicy, RenderSource, RenderedPreview, DEFAULT_TRUSTED_DOMAIN,
};
use std::fs;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Inspect how saved ad-preview payloads would render.
#[derive(Parser, Debug)]
#[command(name = "preview-inspect")]
#[command(about = "Normalize, sanitize and pick a render mode for saved preview payloads", long_about = None)]
struct Args {
    /// Files holding a preview payload, an array of payloads, or a full `{ok, previews}` response.
    #[arg(required = true)]
    files: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Domain whose iframes may run scripts.
    #[arg(long, env = "SOCIOVIA_TRUSTED_PREVIEW_DOMAIN", default_value = DEFAULT_TRUSTED_DOMAIN)]
    trusted_domain: String,

    #[arg(long)]
    allow_unsafe_scripts: bool,

    /// Base href pinned into inline documents.
    #[arg(long)]
    base_href: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    previews: Vec<PreviewSummary>,
}

#[derive(Debug, Serialize)]
struct PreviewSummary {
    format: String,
    mode: String,
    sandbox: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<RemovalCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_fallback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_bytes: Option<usize>,
}

impl From<&RenderedPreview> for PreviewSummary {
    fn from(preview: &RenderedPreview) -> Self {
        let decision = &preview.decision;
        let document = preview.sanitized_document();
        let src = match &decision.source {
            RenderSource::Remote { src } => Some(src.clone()),
            RenderSource::Image { url } => url.clone(),
            RenderSource::Document { .. } => None,
        };
        Self {
            format: preview.descriptor.format.clone(),
            mode: decision.mode.to_string(),
            sandbox: decision.sandbox_flags.to_attribute(),
            width: decision.width.map(|d| d.to_string()),
            height: decision.height.map(|d| d.to_string()),
            src,
            removed: document.map(|doc| doc.removed),
            used_fallback: document.map(|doc| doc.used_fallback),
            document_bytes: document.map(|doc| doc.as_str().len()),
        }
    }
}

fn main() {
    let args = Args::parse();

    let noise = PreviewNoiseFilter::default();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(noise.fmt_layer())
        .init();

    let policy = match build_policy(&args) {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            process::exit(1);
        }
    };

    let mut exit_code = 0;
    let mut reports = Vec::new();

    for file_path in &args.files {
        match inspect_file(file_path, &policy) {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("✗ {} could not be inspected:", file_path);
                eprintln!("    {:#}", e);
                exit_code = 1;
            }
        }
    }

    if let Err(e) = print_reports(&reports, args.format) {
        eprintln!("✗ failed to write output: {:#}", e);
        exit_code = 1;
    }

    process::exit(exit_code);
}

fn build_policy(args: &Args) -> anyhow::Result<RenderPolicy> {
    let mut policy = RenderPolicy::new(&args.trusted_domain)?
        .with_unsafe_scripts(args.allow_unsafe_scripts);
    if let Some(href) = &args.base_href {
        policy = policy.with_base_href(href)?;
    }
    Ok(policy)
}

fn inspect_file(path: &str, policy: &RenderPolicy) -> anyhow::Result<FileReport> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path))?;
    let raws = collect_payloads(&value)?;
    tracing::debug!(file = %path, count = raws.len(), "collected payloads");

    let previews = render_all(normalize_all(raws), policy);
    Ok(FileReport {
        file: path.to_string(),
        previews: previews.iter().map(PreviewSummary::from).collect(),
    })
}

fn print_reports(reports: &[FileReport], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(reports)?),
        OutputFormat::Text => {
            for report in reports {
                println!("✓ {} ({} previews)", report.file, report.previews.len());
                for (i, preview) in report.previews.iter().enumerate() {
                    print_summary(i, preview);
                }
            }
        }
    }
    Ok(())
}

fn print_summary(index: usize, preview: &PreviewSummary) {
    println!("  [{}] {} -> {}", index, preview.format, preview.mode);
    println!("      sandbox: \"{}\"", preview.sandbox);
    if preview.width.is_some() || preview.height.is_some() {
        let axis = |d: &Option<String>| d.clone().unwrap_or_else(|| "auto".to_string());
        println!("      size: {} x {}", axis(&preview.width), axis(&preview.height));
    }
    if let Some(src) = &preview.src {
        println!("      src: {}", src);
    }
    if let Some(removed) = &preview.removed {
        println!(
            "      removed: {} scripts, {} refresh metas, {} preload links, {} handlers{}",
            removed.scripts,
            removed.refresh_metas,
            removed.preload_links,
            removed.event_handlers,
            if preview.used_fallback == Some(true) {
                " (regex fallback)"
            } else {
                ""
            }
        );
    }
}

