//! Results files.
//!
//! Each run is stored as `benchmark_<timestamp>.json` in the output
//! directory. The HTML report and the `report` command read them back.

use crate::runner::{BenchmarkRun, EvaluatorRun};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "benchmark_";
const FILE_EXTENSION: &str = "json";

/// Persisted summary of one evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_name: String,
    pub parameters: Option<String>,
    pub vram_gb: Option<f64>,
    pub total_images: usize,
    pub avg_score: f64,
    pub avg_inference_time_ms: f64,
    pub peak_vram_mb: f64,
    #[serde(default)]
    pub scores_by_image: BTreeMap<String, f64>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub raw_outputs: BTreeMap<String, String>,
}

impl ModelRecord {
    fn from_evaluator_run(run: &EvaluatorRun, raw_output_limit: usize) -> Self {
        let metrics = &run.metrics;
        Self {
            model_name: metrics.model_name.clone(),
            parameters: Some(metrics.capabilities.parameters.clone()),
            vram_gb: Some(metrics.capabilities.vram_required_gb),
            total_images: metrics.total_images,
            avg_score: metrics.avg_score,
            avg_inference_time_ms: metrics.avg_inference_time_ms,
            peak_vram_mb: metrics.peak_vram_mb,
            scores_by_image: metrics.scores_by_image.clone(),
            errors: metrics.errors.clone(),
            raw_outputs: run
                .results
                .iter()
                .map(|r| (r.image.clone(), truncate_chars(&r.raw_output, raw_output_limit)))
                .collect(),
        }
    }
}

/// Document written once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    pub description: String,
    pub results: Vec<ModelRecord>,
}

impl RunRecord {
    pub fn from_run(run: &BenchmarkRun, timestamp: String, raw_output_limit: usize) -> Self {
        Self {
            timestamp,
            description: run.description.clone(),
            results: run
                .runs
                .iter()
                .map(|r| ModelRecord::from_evaluator_run(r, raw_output_limit))
                .collect(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.{}", FILE_PREFIX, self.timestamp, FILE_EXTENSION)
    }

    /// `benchmark_<timestamp>_<n>.json`, used when the plain name is taken
    fn numbered_file_name(&self, n: usize) -> String {
        format!("{}{}_{}.{}", FILE_PREFIX, self.timestamp, n, FILE_EXTENSION)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize results to JSON")
    }
}

/// Local time formatted as used in results file names
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Keep at most `limit` characters
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Write the record into `output_dir`, creating it if needed, and return
/// the file path. An existing results file is never overwritten: a run
/// saved in the same second gets a numbered name instead.
pub fn save_run(record: &RunRecord, output_dir: &Path) -> Result<PathBuf> {
    let json_content = record.to_json()?;
    ensure_directory_exists(output_dir)?;

    let mut attempt = 0;
    loop {
        let name = match attempt {
            0 => record.file_name(),
            n => record.numbered_file_name(n),
        };
        let path = output_dir.join(name);
        if write_new_results_file(&path, &json_content)? {
            return Ok(path);
        }
        attempt += 1;
    }
}

fn ensure_directory_exists(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Returns false, writing nothing, when `path` already exists
fn write_new_results_file(path: &Path, content: &str) -> Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to create results file: {}", path.display()));
        }
    };
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write results to: {}", path.display()))?;
    Ok(true)
}

pub fn load_run(path: &Path) -> Result<RunRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse results file: {}", path.display()))
}

/// Most recent `benchmark_*.json` in a directory. Timestamps sort
/// lexicographically, so the last name is the latest run.
pub fn latest_results_file(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read results directory: {}", dir.display()))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list directory: {}", dir.display()))?
            .path();
        let is_results_file = path.is_file()
            && path.extension().is_some_and(|ext| ext == FILE_EXTENSION)
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(FILE_PREFIX));
        if is_results_file {
            candidates.push(path);
        }
    }

    candidates.sort();
    Ok(candidates.pop())
}

/// A results file as given, or the latest one when `from` is a directory
pub fn resolve_results_path(from: &Path) -> Result<PathBuf> {
    if !from.is_dir() {
        return Ok(from.to_path_buf());
    }
    match latest_results_file(from)? {
        Some(path) => Ok(path),
        None => bail!("No results files found in {}", from.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators;
    use crate::metrics;
    use crate::models::{EvaluationResult, EvaluatorKind};
    use crate::output::SummaryRow;
    use crate::runner::tests::screenshots;
    use tempfile::tempdir;

    fn record(timestamp: &str, scores: &[(&str, f64)]) -> RunRecord {
        RunRecord {
            timestamp: timestamp.to_string(),
            description: "minimal".to_string(),
            results: scores
                .iter()
                .map(|(name, score)| ModelRecord {
                    model_name: name.to_string(),
                    parameters: Some("2B".to_string()),
                    vram_gb: Some(5.0),
                    total_images: 2,
                    avg_score: *score,
                    avg_inference_time_ms: 1500.0,
                    peak_vram_mb: 2048.0,
                    scores_by_image: BTreeMap::from([("a.png".to_string(), *score)]),
                    errors: vec![],
                    raw_outputs: BTreeMap::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let output_dir = temp_dir.path().join("nested").join("results");
        let original = record("20250101_120000", &[("UIClip", 5.5)]);

        let path = save_run(&original, &output_dir).unwrap();
        assert_eq!(path, output_dir.join("benchmark_20250101_120000.json"));

        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_save_twice_in_same_second_keeps_both() {
        let temp_dir = tempdir().unwrap();
        let first = record("20250101_120000", &[("UIClip", 5.5)]);
        let second = record("20250101_120000", &[("Qwen2-VL-2B", 7.5)]);

        let first_path = save_run(&first, temp_dir.path()).unwrap();
        let second_path = save_run(&second, temp_dir.path()).unwrap();
        let third_path = save_run(&second, temp_dir.path()).unwrap();

        assert_eq!(first_path.file_name().unwrap(), "benchmark_20250101_120000.json");
        assert_eq!(second_path.file_name().unwrap(), "benchmark_20250101_120000_1.json");
        assert_eq!(third_path.file_name().unwrap(), "benchmark_20250101_120000_2.json");
        assert_eq!(load_run(&first_path).unwrap(), first);
        assert_eq!(load_run(&second_path).unwrap(), second);
        assert_eq!(
            resolve_results_path(temp_dir.path()).unwrap(),
            third_path
        );
    }

    #[test]
    fn test_ranking_survives_round_trip() {
        let temp_dir = tempdir().unwrap();
        let original = record(
            "20250101_120000",
            &[("SmolVLM2-256M", 4.0), ("Qwen2-VL-2B", 7.5), ("UIClip", 5.5)],
        );
        let path = save_run(&original, temp_dir.path()).unwrap();

        let ranked = |r: &RunRecord| -> Vec<String> {
            SummaryRow::ranked(r.results.iter().map(SummaryRow::from_record).collect())
                .into_iter()
                .map(|row| row.model_name)
                .collect()
        };
        let expected = vec!["Qwen2-VL-2B", "UIClip", "SmolVLM2-256M"];
        assert_eq!(ranked(&original), expected);
        assert_eq!(ranked(&load_run(&path).unwrap()), expected);
    }

    #[test]
    fn test_load_accepts_missing_optional_fields() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("benchmark_20240101_000000.json");
        std::fs::write(
            &path,
            r#"{"timestamp": "20240101_000000", "description": "d", "results": [
                {"model_name": "UIClip", "parameters": null, "vram_gb": null,
                 "total_images": 1, "avg_score": 0.0, "avg_inference_time_ms": 0.0,
                 "peak_vram_mb": 0.0}
            ]}"#,
        )
        .unwrap();

        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded.results[0].parameters, None);
        assert!(loaded.results[0].raw_outputs.is_empty());
    }

    #[test]
    fn test_resolve_latest_in_directory() {
        let temp_dir = tempdir().unwrap();
        save_run(&record("20250101_120000", &[]), temp_dir.path()).unwrap();
        save_run(&record("20250302_080000", &[]), temp_dir.path()).unwrap();
        std::fs::write(temp_dir.path().join("notes.json"), "{}").unwrap();

        let path = resolve_results_path(temp_dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "benchmark_20250302_080000.json");

        let file = temp_dir.path().join("benchmark_20250101_120000.json");
        assert_eq!(resolve_results_path(&file).unwrap(), file);
    }

    #[test]
    fn test_resolve_empty_directory() {
        let temp_dir = tempdir().unwrap();
        let err = resolve_results_path(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("No results files found"));
    }

    #[test]
    fn test_raw_outputs_are_truncated() {
        let caps = evaluators::capabilities(EvaluatorKind::Mobilevlm);
        let results = vec![EvaluationResult::success(
            &caps.name,
            "a.png",
            6.0,
            vec![],
            "x".repeat(50),
            10.0,
            0.0,
        )];
        let run = BenchmarkRun {
            description: "minimal".to_string(),
            screenshots: screenshots(&["a.png"]),
            runs: vec![EvaluatorRun {
                metrics: metrics::aggregate(&caps, 1, &results),
                results,
            }],
        };

        let record = RunRecord::from_run(&run, timestamp_now(), 20);
        let model = &record.results[0];
        assert_eq!(model.raw_outputs["a.png"].len(), 20);
        assert_eq!(model.parameters.as_deref(), Some("0.5B"));
        assert_eq!(model.vram_gb, Some(2.0));
        assert_eq!(record.timestamp.len(), "20250101_120000".len());
    }
}
