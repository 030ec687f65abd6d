use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Minimum score for a single criterion to count as passed
pub const CRITERION_PASS_THRESHOLD: f64 = 6.0;

/// Minimum overall score for a whole result to count as passed
pub const RESULT_PASS_THRESHOLD: f64 = 7.0;

/// Design aesthetic every evaluator scores against
pub const VIBRANT_MINIMAL_DESCRIPTION: &str = "A vibrant minimal design system featuring:
- Blue primary color with rose accent on neutral stone background
- Clean typography with 1.25 modular scale
- 8px grid spacing system with generous whitespace
- Consistent, accessible UI components
- Modern, energetic yet sophisticated aesthetic
- Proper dark mode with maintained contrast";

/// Which family an evaluator belongs to. Used for display and selection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluatorKind {
    Uiclip,
    Smolvlm,
    Mobilevlm,
    QwenVl,
}

impl EvaluatorKind {
    pub const ALL: [EvaluatorKind; 4] = [
        EvaluatorKind::Uiclip,
        EvaluatorKind::Smolvlm,
        EvaluatorKind::Mobilevlm,
        EvaluatorKind::QwenVl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorKind::Uiclip => "uiclip",
            EvaluatorKind::Smolvlm => "smolvlm",
            EvaluatorKind::Mobilevlm => "mobilevlm",
            EvaluatorKind::QwenVl => "qwen-vl",
        }
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight quantization the evaluator runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    #[default]
    None,
    #[serde(rename = "8bit")]
    EightBit,
    #[serde(rename = "4bit")]
    FourBit,
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Quantization::None => "none",
            Quantization::EightBit => "8bit",
            Quantization::FourBit => "4bit",
        };
        f.write_str(label)
    }
}

/// Static metadata describing an evaluator's resource needs and features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique display name
    pub name: String,
    pub kind: EvaluatorKind,
    /// Parameter count label, e.g. "2B"
    pub parameters: String,
    pub vram_required_gb: f64,
    pub supports_quality_score: bool,
    pub supports_text_matching: bool,
    pub supports_design_suggestions: bool,
    #[serde(default)]
    pub quantization: Quantization,
}

/// Score for one named aspect of the design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaScore {
    /// Lower-case criterion label
    pub name: String,
    /// Expected range 0 to 10, not clamped
    pub score: f64,
    pub passed: bool,
    pub explanation: String,
}

impl CriteriaScore {
    pub fn new(name: impl Into<String>, score: f64, explanation: impl Into<String>) -> Self {
        let score = finite_or_zero(score);
        Self {
            name: name.into(),
            score,
            passed: score >= CRITERION_PASS_THRESHOLD,
            explanation: explanation.into(),
        }
    }
}

/// Outcome of one evaluator on one screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub evaluator: String,
    /// File name of the screenshot
    pub image: String,
    pub overall_score: f64,
    pub criteria_scores: Vec<CriteriaScore>,
    pub raw_output: String,
    pub inference_time_ms: f64,
    pub memory_used_mb: f64,
    pub error: Option<String>,
}

impl EvaluationResult {
    /// Build a successful result
    pub fn success(
        evaluator: &str,
        image: &str,
        overall_score: f64,
        criteria_scores: Vec<CriteriaScore>,
        raw_output: String,
        inference_time_ms: f64,
        memory_used_mb: f64,
    ) -> Self {
        Self {
            evaluator: evaluator.to_string(),
            image: image.to_string(),
            overall_score: finite_or_zero(overall_score),
            criteria_scores,
            raw_output,
            inference_time_ms: finite_or_zero(inference_time_ms),
            memory_used_mb: finite_or_zero(memory_used_mb),
            error: None,
        }
    }

    /// Build an errored result. Score is zero and there are no criteria.
    pub fn failure(evaluator: &str, image: &str, error: impl Into<String>) -> Self {
        Self {
            evaluator: evaluator.to_string(),
            image: image.to_string(),
            overall_score: 0.0,
            criteria_scores: Vec::new(),
            raw_output: String::new(),
            inference_time_ms: 0.0,
            memory_used_mb: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Overall score at or above 7.0 and every criterion passed
    pub fn passed(&self) -> bool {
        self.overall_score >= RESULT_PASS_THRESHOLD && self.criteria_scores.iter().all(|c| c.passed)
    }
}

/// Aggregated outcome of one evaluator over the whole screenshot set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub model_name: String,
    pub total_images: usize,
    /// Mean overall score over non-errored results
    pub avg_score: f64,
    /// Mean inference time over non-errored results
    pub avg_inference_time_ms: f64,
    pub peak_vram_mb: f64,
    pub scores_by_image: BTreeMap<String, f64>,
    pub capabilities: CapabilityDescriptor,
    pub errors: Vec<String>,
}

/// Replace NaN and infinities with zero so every stored score stays finite
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
