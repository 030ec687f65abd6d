//! Static HTML report rendered from a saved results file.
//!
//! No model is run: scores come from the JSON and the screenshots are
//! embedded as base64 so the page is a single self-contained file.

use crate::evaluation::Screenshot;
use crate::persistence::{ModelRecord, RunRecord, load_run, truncate_chars};
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write;
use std::path::Path;

/// Characters of raw model output shown per image
const RAW_OUTPUT_PREVIEW: usize = 500;

const STYLE: &str = r#"
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: system-ui, -apple-system, sans-serif; background: #0f0f12; color: #e4e4e7; line-height: 1.6; }
        .container { max-width: 1400px; margin: 0 auto; padding: 2rem; }
        h1 { font-size: 2rem; margin-bottom: 0.5rem; color: #60a5fa; }
        h2 { font-size: 1.5rem; margin: 2rem 0 1rem; color: #a1a1aa; border-bottom: 1px solid #27272a; padding-bottom: 0.5rem; }
        .meta { color: #71717a; margin-bottom: 2rem; }
        .summary { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 1rem; margin-bottom: 2rem; }
        .card { background: #18181b; border-radius: 0.5rem; padding: 1.5rem; border: 1px solid #27272a; }
        .card-title { font-size: 0.875rem; color: #71717a; margin-bottom: 0.25rem; }
        .card-value { font-size: 2rem; font-weight: 600; }
        .card-meta { font-size: 0.75rem; color: #71717a; margin-top: 0.5rem; }
        .score-good { color: #4ade80; }
        .score-ok { color: #fbbf24; }
        .score-bad { color: #f87171; }
        .screenshots { display: grid; grid-template-columns: repeat(auto-fit, minmax(400px, 1fr)); gap: 2rem; }
        .screenshot { background: #18181b; border-radius: 0.5rem; overflow: hidden; border: 1px solid #27272a; }
        .screenshot img { width: 100%; height: auto; display: block; }
        .screenshot-info { padding: 1rem; }
        .screenshot-title { font-weight: 600; margin-bottom: 0.5rem; }
        .scores-grid { display: grid; grid-template-columns: repeat(2, 1fr); gap: 0.5rem; font-size: 0.875rem; }
        .score-item { display: flex; justify-content: space-between; padding: 0.25rem 0; border-bottom: 1px solid #27272a; }
        .model-section { margin-bottom: 3rem; }
        table { width: 100%; border-collapse: collapse; margin: 1rem 0; }
        th, td { padding: 0.75rem; text-align: left; border-bottom: 1px solid #27272a; }
        th { color: #a1a1aa; font-weight: 500; }
        .raw-output { background: #09090b; padding: 1rem; border-radius: 0.25rem; font-family: monospace; font-size: 0.75rem; white-space: pre-wrap; max-height: 200px; overflow-y: auto; margin-top: 0.5rem; color: #a1a1aa; }
"#;

/// Badge color of a score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Good,
    Ok,
    Bad,
}

impl ScoreBand {
    pub fn of(score: f64) -> Self {
        if score >= 7.0 {
            ScoreBand::Good
        } else if score >= 5.0 {
            ScoreBand::Ok
        } else {
            ScoreBand::Bad
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            ScoreBand::Good => "score-good",
            ScoreBand::Ok => "score-ok",
            ScoreBand::Bad => "score-bad",
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A screenshot's file name with its base64-encoded content
struct EmbeddedImage {
    name: String,
    base64: String,
}

fn embed_images(screenshots: &[Screenshot]) -> Result<Vec<EmbeddedImage>> {
    screenshots
        .iter()
        .map(|s| {
            let bytes = std::fs::read(&s.path)
                .with_context(|| format!("Failed to read screenshot: {}", s.path.display()))?;
            Ok(EmbeddedImage {
                name: s.name.clone(),
                base64: STANDARD.encode(bytes),
            })
        })
        .collect()
}

/// Render the report page. `generated_at` is shown in the page header.
pub fn render_html(record: &RunRecord, screenshots: &[Screenshot], generated_at: &str) -> Result<String> {
    let images = embed_images(screenshots)?;
    let mut html = String::new();

    writeln!(html, "<!DOCTYPE html>\n<html lang=\"en\">\n<head>")?;
    writeln!(html, "    <meta charset=\"UTF-8\">")?;
    writeln!(
        html,
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">"
    )?;
    writeln!(html, "    <title>VLM UI Evaluation Report</title>")?;
    writeln!(html, "    <style>{}    </style>\n</head>\n<body>", STYLE)?;
    writeln!(html, "    <div class=\"container\">")?;
    writeln!(html, "        <h1>VLM UI Evaluation Report</h1>")?;
    writeln!(
        html,
        "        <p class=\"meta\">Generated: {} | Run: {}</p>",
        escape_html(generated_at),
        escape_html(&record.timestamp)
    )?;

    write_summary_cards(&mut html, record)?;
    write_screenshot_grid(&mut html, record, &images)?;
    for model in &record.results {
        write_model_section(&mut html, model, &images)?;
    }

    writeln!(html, "    </div>\n</body>\n</html>")?;
    Ok(html)
}

fn write_summary_cards(html: &mut String, record: &RunRecord) -> std::fmt::Result {
    writeln!(html, "        <h2>Model Comparison</h2>")?;
    writeln!(html, "        <div class=\"summary\">")?;

    let mut ranked: Vec<_> = record.results.iter().collect();
    ranked.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));
    for model in ranked {
        writeln!(html, "            <div class=\"card\">")?;
        writeln!(
            html,
            "                <div class=\"card-title\">{}</div>",
            escape_html(&model.model_name)
        )?;
        writeln!(
            html,
            "                <div class=\"card-value {}\">{:.1}</div>",
            ScoreBand::of(model.avg_score).css_class(),
            model.avg_score
        )?;
        writeln!(
            html,
            "                <div class=\"card-meta\">{} params | {:.0}ms</div>",
            escape_html(model.parameters.as_deref().unwrap_or("?")),
            model.avg_inference_time_ms
        )?;
        writeln!(html, "            </div>")?;
    }

    writeln!(html, "        </div>")
}

fn write_screenshot_grid(html: &mut String, record: &RunRecord, images: &[EmbeddedImage]) -> std::fmt::Result {
    writeln!(html, "        <h2>Screenshots &amp; Scores</h2>")?;
    writeln!(html, "        <div class=\"screenshots\">")?;

    for image in images {
        let name = escape_html(&image.name);
        writeln!(html, "            <div class=\"screenshot\">")?;
        writeln!(
            html,
            "                <img src=\"data:image/png;base64,{}\" alt=\"{}\">",
            image.base64, name
        )?;
        writeln!(html, "                <div class=\"screenshot-info\">")?;
        writeln!(html, "                    <div class=\"screenshot-title\">{}</div>", name)?;
        writeln!(html, "                    <div class=\"scores-grid\">")?;
        for model in &record.results {
            let score = model.scores_by_image.get(&image.name).copied().unwrap_or(0.0);
            let short_name: String = model.model_name.chars().take(15).collect();
            writeln!(
                html,
                "                        <div class=\"score-item\"><span>{}</span><span class=\"{}\">{:.1}</span></div>",
                escape_html(&short_name),
                ScoreBand::of(score).css_class(),
                score
            )?;
        }
        writeln!(html, "                    </div>\n                </div>\n            </div>")?;
    }

    writeln!(html, "        </div>")
}

fn write_model_section(
    html: &mut String,
    model: &ModelRecord,
    images: &[EmbeddedImage],
) -> std::fmt::Result {
    writeln!(html, "        <div class=\"model-section\">")?;
    writeln!(
        html,
        "            <h2>{} - Detailed Output</h2>",
        escape_html(&model.model_name)
    )?;
    writeln!(html, "            <table>")?;
    writeln!(html, "                <tr><th>Image</th><th>Score</th><th>Raw Output</th></tr>")?;

    for image in images {
        let score = model.scores_by_image.get(&image.name).copied().unwrap_or(0.0);
        let raw = model
            .raw_outputs
            .get(&image.name)
            .map(|raw| truncate_chars(raw, RAW_OUTPUT_PREVIEW))
            .unwrap_or_default();
        writeln!(
            html,
            "                <tr><td>{}</td><td class=\"{}\">{:.1}</td><td><div class=\"raw-output\">{}</div></td></tr>",
            escape_html(&image.name),
            ScoreBand::of(score).css_class(),
            score,
            escape_html(&raw)
        )?;
    }

    writeln!(html, "            </table>\n        </div>")
}

/// Render the report for a results file and write it to `output`
pub fn write_html_report(results_file: &Path, screenshots_dir: &Path, output: &Path) -> Result<()> {
    let record = load_run(results_file)?;
    let screenshots = Screenshot::discover(screenshots_dir)?;
    let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let html = render_html(&record, &screenshots, &generated_at)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(output, html)
        .with_context(|| format!("Failed to write HTML report to: {}", output.display()))
}
