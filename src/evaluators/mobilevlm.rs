use super::BackendDefaults;
use crate::backend::{BackendSettings, OpenAiVisionBackend};
use crate::evaluation::GenerativeEvaluator;
use crate::extraction::MarkerExtractor;
use crate::models::{CapabilityDescriptor, EvaluatorKind, Quantization};
use std::time::Duration;

pub(super) const DEFAULTS: BackendDefaults = BackendDefaults {
    endpoint: "http://localhost:8000/v1",
    model: "llava-hf/llava-onevision-qwen2-0.5b-ov-hf",
    max_tokens: 500,
};

const PROMPT: &str = "Rate this UI design from 1-10.

COLOR: 
LAYOUT: 
TYPOGRAPHY: 
OVERALL: 

Give only numbers 1-10 for each.";

// Case-insensitive, unlike the SmolVLM markers: the prompt asks for
// uppercase labels and they come back in any case.
const MARKERS: &[(&str, &str)] = &[
    (r"(?i)colors?[:\s]+(\d+)", "color"),
    (r"(?i)layout[:\s]+(\d+)", "layout"),
    (r"(?i)typography?[:\s]+(\d+)", "typography"),
    (r"(?i)overall[:\s]+(\d+)", "overall"),
];

pub(super) fn capabilities() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "LLaVA-OneVision-0.5B".to_string(),
        kind: EvaluatorKind::Mobilevlm,
        parameters: "0.5B".to_string(),
        vram_required_gb: 2.0,
        supports_quality_score: true,
        supports_text_matching: true,
        supports_design_suggestions: true,
        quantization: Quantization::None,
    }
}

pub(super) fn build(
    settings: BackendSettings,
    timeout: Option<Duration>,
) -> Result<GenerativeEvaluator, regex::Error> {
    Ok(GenerativeEvaluator::new(
        capabilities(),
        PROMPT,
        Box::new(MarkerExtractor::new(MARKERS)?),
        Box::new(OpenAiVisionBackend::new(settings)),
    )
    .with_timeout(timeout))
}
