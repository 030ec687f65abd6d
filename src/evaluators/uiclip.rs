use super::BackendDefaults;
use crate::backend::{BackendSettings, HttpSimilarityBackend};
use crate::evaluation::SimilarityEvaluator;
use crate::models::{CapabilityDescriptor, EvaluatorKind, Quantization};
use std::time::Duration;

pub(super) const DEFAULTS: BackendDefaults = BackendDefaults {
    endpoint: "http://localhost:8100",
    model: "biglab/uiclip_jitteredwebsites-2-224-paraphrased_webpairs_humanpairs",
    max_tokens: 0,
};

const GOOD_DESIGN_PROMPT: &str = "A high quality, well-designed user interface";
const BAD_DESIGN_PROMPT: &str = "A low quality, poorly designed user interface";

pub(super) fn capabilities() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "UIClip".to_string(),
        kind: EvaluatorKind::Uiclip,
        parameters: "400M".to_string(),
        vram_required_gb: 2.0,
        supports_quality_score: true,
        supports_text_matching: true,
        supports_design_suggestions: false,
        quantization: Quantization::None,
    }
}

pub(super) fn build(settings: BackendSettings, timeout: Option<Duration>) -> SimilarityEvaluator {
    SimilarityEvaluator::new(
        capabilities(),
        GOOD_DESIGN_PROMPT,
        BAD_DESIGN_PROMPT,
        Box::new(HttpSimilarityBackend::new(settings)),
    )
    .with_timeout(timeout)
}
