use crate::evaluation::Screenshot;
use crate::models::{BenchmarkMetrics, EvaluationResult};
use crate::persistence::{ModelRecord, RunRecord};
use crate::reporter::Reporter;
use crate::runner::{BenchmarkRun, EvaluatorRun};
use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// One line of the model comparison table
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub model_name: String,
    pub parameters: String,
    pub peak_vram_mb: f64,
    pub avg_score: f64,
    pub avg_inference_time_ms: f64,
    pub error_count: usize,
}

impl SummaryRow {
    pub fn from_metrics(metrics: &BenchmarkMetrics) -> Self {
        Self {
            model_name: metrics.model_name.clone(),
            parameters: metrics.capabilities.parameters.clone(),
            peak_vram_mb: metrics.peak_vram_mb,
            avg_score: metrics.avg_score,
            avg_inference_time_ms: metrics.avg_inference_time_ms,
            error_count: metrics.errors.len(),
        }
    }

    pub fn from_record(record: &ModelRecord) -> Self {
        Self {
            model_name: record.model_name.clone(),
            parameters: record.parameters.clone().unwrap_or_else(|| "?".to_string()),
            peak_vram_mb: record.peak_vram_mb,
            avg_score: record.avg_score,
            avg_inference_time_ms: record.avg_inference_time_ms,
            error_count: record.errors.len(),
        }
    }

    /// Highest mean score first; ties keep their input order
    pub fn ranked(mut rows: Vec<SummaryRow>) -> Vec<SummaryRow> {
        rows.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));
        rows
    }
}

/// Score change of one aspect between the two members of a pair
#[derive(Debug, Clone, PartialEq)]
pub struct AspectDelta {
    pub aspect: String,
    pub first: Option<f64>,
    pub second: Option<f64>,
}

impl AspectDelta {
    /// `second - first`, when both sides have the aspect
    pub fn delta(&self) -> Option<f64> {
        Some(self.second? - self.first?)
    }
}

/// How one evaluator scored the two variants of a screen
#[derive(Debug, Clone, PartialEq)]
pub struct PairComparison {
    pub evaluator: String,
    pub first_image: String,
    pub second_image: String,
    pub overall: AspectDelta,
    pub criteria: Vec<AspectDelta>,
}

/// Pairs `<stem>.png` with `<stem>-dark.png` when both exist
pub fn detect_pairs(screenshots: &[Screenshot]) -> Vec<(String, String)> {
    let names: BTreeSet<&str> = screenshots.iter().map(|s| s.name.as_str()).collect();
    names
        .iter()
        .filter_map(|name| {
            let stem = name.strip_suffix("-dark.png")?;
            let light = format!("{}.png", stem);
            names
                .contains(light.as_str())
                .then(|| (light, name.to_string()))
        })
        .collect()
}

/// Compare every pair for every evaluator. A pair is skipped for an
/// evaluator unless both images were evaluated without error.
pub fn compare_pairs(runs: &[EvaluatorRun], pairs: &[(String, String)]) -> Vec<PairComparison> {
    let mut comparisons = Vec::new();

    for run in runs {
        let by_image: BTreeMap<&str, &EvaluationResult> =
            run.results.iter().map(|r| (r.image.as_str(), r)).collect();

        for (first_name, second_name) in pairs {
            let (Some(first), Some(second)) = (
                by_image.get(first_name.as_str()),
                by_image.get(second_name.as_str()),
            ) else {
                continue;
            };
            if first.is_error() || second.is_error() {
                continue;
            }
            comparisons.push(compare_results(&run.metrics.model_name, first, second));
        }
    }

    comparisons
}

fn compare_results(evaluator: &str, first: &EvaluationResult, second: &EvaluationResult) -> PairComparison {
    let first_criteria: BTreeMap<&str, f64> = first
        .criteria_scores
        .iter()
        .map(|c| (c.name.as_str(), c.score))
        .collect();
    let second_criteria: BTreeMap<&str, f64> = second
        .criteria_scores
        .iter()
        .map(|c| (c.name.as_str(), c.score))
        .collect();
    let aspects: BTreeSet<&str> = first_criteria
        .keys()
        .chain(second_criteria.keys())
        .copied()
        .collect();

    PairComparison {
        evaluator: evaluator.to_string(),
        first_image: first.image.clone(),
        second_image: second.image.clone(),
        overall: AspectDelta {
            aspect: "overall".to_string(),
            first: Some(first.overall_score),
            second: Some(second.overall_score),
        },
        criteria: aspects
            .into_iter()
            .map(|aspect| AspectDelta {
                aspect: aspect.to_string(),
                first: first_criteria.get(aspect).copied(),
                second: second_criteria.get(aspect).copied(),
            })
            .collect(),
    }
}

/// Print a finished run in the requested format
pub fn print_run(
    reporter: &mut dyn Reporter,
    run: &BenchmarkRun,
    record: &RunRecord,
    pairs: &[(String, String)],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Plain => print_plain(reporter, run, pairs),
        OutputFormat::Json => reporter.line(&record.to_json()?),
    }
    Ok(())
}

fn print_plain(reporter: &mut dyn Reporter, run: &BenchmarkRun, pairs: &[(String, String)]) {
    let rows = SummaryRow::ranked(run.runs.iter().map(|r| SummaryRow::from_metrics(&r.metrics)).collect());
    reporter.line("");
    reporter.line(&summary_table(&rows));
    if let Some(errors) = errors_section(&run.runs) {
        reporter.line("");
        reporter.line(&errors);
    }
    reporter.line("");
    reporter.line(&image_table(run));

    for table in criteria_tables(&run.runs) {
        reporter.line("");
        reporter.line(&table);
    }

    for comparison in compare_pairs(&run.runs, pairs) {
        reporter.line("");
        reporter.line(&pair_table(&comparison));
    }
}

/// Model comparison table, rows in the given order
pub fn summary_table(rows: &[SummaryRow]) -> String {
    let mut out = String::from("VLM UI Evaluation Results\n");
    out.push_str(&format!(
        "{:<20} {:>8} {:>10} {:>10} {:>13} {:>8}\n",
        "Model", "Params", "VRAM (MB)", "Avg Score", "Avg Time (ms)", "Errors"
    ));
    out.push_str(&"-".repeat(74));
    for row in rows {
        out.push_str(&format!(
            "\n{:<20} {:>8} {:>10.0} {:>10.2} {:>13.0} {:>8}",
            row.model_name,
            row.parameters,
            row.peak_vram_mb,
            row.avg_score,
            row.avg_inference_time_ms,
            row.error_count
        ));
    }
    out
}

/// Error messages grouped by evaluator, `None` when every evaluation succeeded
pub fn errors_section(runs: &[EvaluatorRun]) -> Option<String> {
    let failing: Vec<&EvaluatorRun> = runs.iter().filter(|r| !r.metrics.errors.is_empty()).collect();
    if failing.is_empty() {
        return None;
    }

    let mut out = String::from("Errors");
    for run in failing {
        out.push_str(&format!("\n  {} ({}):", run.metrics.model_name, run.metrics.errors.len()));
        for error in &run.metrics.errors {
            out.push_str(&format!("\n    - {}", error));
        }
    }
    Some(out)
}

/// Every screenshot against every evaluator's overall score
pub fn image_table(run: &BenchmarkRun) -> String {
    let mut out = String::from("Scores by Image\n");
    out.push_str(&format!("{:<28}", "Image"));
    for evaluator_run in &run.runs {
        out.push_str(&format!(" {:>12}", short_name(&evaluator_run.metrics.model_name, 12)));
    }
    out.push('\n');
    out.push_str(&"-".repeat(28 + 13 * run.runs.len()));

    for screenshot in &run.screenshots {
        out.push_str(&format!("\n{:<28}", screenshot.name));
        for evaluator_run in &run.runs {
            out.push_str(&format!(
                " {:>12}",
                format_score(evaluator_run.metrics.scores_by_image.get(&screenshot.name).copied())
            ));
        }
    }
    out
}

/// Per-criterion breakdown for each evaluator that reported criteria
pub fn criteria_tables(runs: &[EvaluatorRun]) -> Vec<String> {
    runs.iter().filter_map(criteria_table).collect()
}

fn criteria_table(run: &EvaluatorRun) -> Option<String> {
    let successes: Vec<&EvaluationResult> = run.results.iter().filter(|r| !r.is_error()).collect();
    let names: BTreeSet<&str> = successes
        .iter()
        .flat_map(|r| r.criteria_scores.iter().map(|c| c.name.as_str()))
        .collect();
    if names.is_empty() {
        return None;
    }

    let mut out = format!("Per-Criteria Breakdown: {}\n", run.metrics.model_name);
    out.push_str(&format!("{:<28}", "Image"));
    for name in &names {
        out.push_str(&format!(" {:>10}", short_name(&title_case(name), 10)));
    }
    out.push('\n');
    out.push_str(&"-".repeat(28 + 11 * names.len()));

    for result in &successes {
        out.push_str(&format!("\n{:<28}", result.image));
        for name in &names {
            let score = result
                .criteria_scores
                .iter()
                .find(|c| c.name == *name)
                .map(|c| c.score);
            out.push_str(&format!(" {:>10}", format_score(score)));
        }
    }
    Some(out)
}

pub fn pair_table(comparison: &PairComparison) -> String {
    let mut out = format!(
        "{} vs {}: {}\n",
        comparison.first_image, comparison.second_image, comparison.evaluator
    );
    out.push_str(&format!(
        "{:<20} {:>8} {:>8} {:>8}\n",
        "Aspect", "First", "Second", "Diff"
    ));
    out.push_str(&"-".repeat(47));
    for delta in std::iter::once(&comparison.overall).chain(comparison.criteria.iter()) {
        out.push_str(&format!(
            "\n{:<20} {:>8} {:>8} {:>8}",
            title_case(&delta.aspect),
            format_score(delta.first),
            format_score(delta.second),
            delta
                .delta()
                .map(|d| format!("{:+.1}", d))
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    out
}

fn format_score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.1}", s))
        .unwrap_or_else(|| "-".to_string())
}

/// `color_strategy` becomes `Color Strategy`
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn short_name(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}
