use crate::models::{BenchmarkMetrics, CapabilityDescriptor, EvaluationResult};
use std::collections::BTreeMap;

/// Aggregate one evaluator's results over the screenshot set.
///
/// Errored results count toward `total_images` and `errors` only: the
/// means and the per-image scores cover successful results alone, and
/// are 0.0 when there are none.
pub fn aggregate(
    capabilities: &CapabilityDescriptor,
    total_images: usize,
    results: &[EvaluationResult],
) -> BenchmarkMetrics {
    let (successes, failures): (Vec<&EvaluationResult>, Vec<&EvaluationResult>) =
        results.iter().partition(|r| !r.is_error());

    let avg_score = mean(successes.iter().map(|r| r.overall_score));
    let avg_inference_time_ms = mean(successes.iter().map(|r| r.inference_time_ms));

    let peak_vram_mb = results
        .iter()
        .map(|r| r.memory_used_mb)
        .fold(0.0, f64::max);

    let scores_by_image: BTreeMap<String, f64> = successes
        .iter()
        .map(|r| (r.image.clone(), r.overall_score))
        .collect();

    let errors = failures
        .iter()
        .filter_map(|r| r.error.clone())
        .collect();

    BenchmarkMetrics {
        model_name: capabilities.name.clone(),
        total_images,
        avg_score,
        avg_inference_time_ms,
        peak_vram_mb,
        scores_by_image,
        capabilities: capabilities.clone(),
        errors,
    }
}

/// Metrics for an evaluator that never loaded
pub fn load_failure(
    capabilities: &CapabilityDescriptor,
    total_images: usize,
    error: impl Into<String>,
) -> BenchmarkMetrics {
    BenchmarkMetrics {
        model_name: capabilities.name.clone(),
        total_images,
        avg_score: 0.0,
        avg_inference_time_ms: 0.0,
        peak_vram_mb: 0.0,
        scores_by_image: BTreeMap::new(),
        capabilities: capabilities.clone(),
        errors: vec![error.into()],
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
