use super::BackendDefaults;
use crate::backend::{BackendSettings, OpenAiVisionBackend};
use crate::evaluation::GenerativeEvaluator;
use crate::extraction::LabeledScoreExtractor;
use crate::models::{CapabilityDescriptor, EvaluatorKind, Quantization};
use std::time::Duration;

pub(super) const DEFAULTS: BackendDefaults = BackendDefaults {
    endpoint: "http://localhost:8000/v1",
    model: "Qwen/Qwen2-VL-2B-Instruct",
    max_tokens: 500,
};

const PROMPT: &str = "Analyze this UI screenshot as a professional design reviewer.

Target design: {description}

FIRST: Check if this is a properly rendered UI with actual styled components, colors, and visual design elements. If the page shows only raw text, unstyled HTML, config dumps, error messages, or code - give all scores 1-2/10.

If it IS a properly rendered UI, evaluate these aspects (score 1-10 each):

1. COLOR_STRATEGY: Strategic use of limited color palette with bold accents
2. WHITE_SPACE: Clean layout with generous negative space
3. TYPOGRAPHY: Clear type hierarchy and consistent font usage
4. VISUAL_NOISE: Purposeful elements, minimal decorative clutter
5. ACCESSIBILITY: Readable text, sufficient contrast ratios
6. EMOTIONAL_IMPACT: Modern, professional, energetic feel

Format your response exactly as:
IS_RENDERED_UI: [yes/no] - [brief explanation of what you see]
COLOR_STRATEGY: [score]/10 - [explanation]
WHITE_SPACE: [score]/10 - [explanation]
TYPOGRAPHY: [score]/10 - [explanation]
VISUAL_NOISE: [score]/10 - [explanation]
ACCESSIBILITY: [score]/10 - [explanation]
EMOTIONAL_IMPACT: [score]/10 - [explanation]
OVERALL: [score]/10 - [summary assessment]";

pub(super) fn capabilities() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "Qwen2-VL-2B".to_string(),
        kind: EvaluatorKind::QwenVl,
        parameters: "2B".to_string(),
        vram_required_gb: 5.0,
        supports_quality_score: true,
        supports_text_matching: true,
        supports_design_suggestions: true,
        quantization: Quantization::FourBit,
    }
}

pub(super) fn build(
    settings: BackendSettings,
    timeout: Option<Duration>,
) -> Result<GenerativeEvaluator, regex::Error> {
    Ok(GenerativeEvaluator::new(
        capabilities(),
        PROMPT,
        Box::new(LabeledScoreExtractor::new()?),
        Box::new(OpenAiVisionBackend::new(settings)),
    )
    .with_timeout(timeout))
}
