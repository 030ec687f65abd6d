use super::BackendDefaults;
use crate::backend::{BackendSettings, OpenAiVisionBackend};
use crate::evaluation::GenerativeEvaluator;
use crate::extraction::MarkerExtractor;
use crate::models::{CapabilityDescriptor, EvaluatorKind, Quantization};
use std::time::Duration;

pub(super) const DEFAULTS: BackendDefaults = BackendDefaults {
    endpoint: "http://localhost:8000/v1",
    model: "HuggingFaceTB/SmolVLM2-256M-Video-Instruct",
    // longer answers start repeating themselves
    max_tokens: 100,
};

// 256M parameters cannot follow a structured answer format
const PROMPT: &str = "Look at this UI screenshot and rate its design quality.

Rate these aspects from 1-10:
- Colors: Is the color palette good?
- Layout: Is there enough white space?
- Typography: Are fonts readable?
- Overall: What's the overall quality?

Give short answers with numbers.";

/// Synonyms map onto the same criterion, earlier rules win
const MARKERS: &[(&str, &str)] = &[
    (r"[Cc]olor[s]?[:\s-]+(\d+)", "color"),
    (r"[Ll]ayout[:\s-]+(\d+)", "layout"),
    (r"[Ww]hite\s*[Ss]pace[:\s-]+(\d+)", "layout"),
    (r"[Tt]ypograph[y]?[:\s-]+(\d+)", "typography"),
    (r"[Ff]ont[s]?[:\s-]+(\d+)", "typography"),
    (r"[Oo]verall[:\s-]+(\d+)", "overall"),
    (r"[Qq]uality[:\s-]+(\d+)", "overall"),
];

pub(super) fn capabilities() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "SmolVLM2-256M".to_string(),
        kind: EvaluatorKind::Smolvlm,
        parameters: "256M".to_string(),
        vram_required_gb: 1.0,
        supports_quality_score: true,
        supports_text_matching: false,
        supports_design_suggestions: false,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::TextExtractor;

    #[test]
    fn test_synonyms() {
        let extractor = MarkerExtractor::new(MARKERS).unwrap();
        let extraction = extractor.extract("White space - 7\nFonts: 5\nQuality: 6");

        let names: Vec<_> = extraction.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["layout", "typography"]);
        assert_eq!(extraction.criteria[0].score, 7.0);
        assert!(!extraction.criteria[1].passed);
        assert_eq!(extraction.overall_score, 6.0);
    }

    #[test]
    fn test_primary_marker_wins_over_synonym() {
        let extractor = MarkerExtractor::new(MARKERS).unwrap();
        let extraction = extractor.extract("White space: 3\nLayout: 9");

        assert_eq!(extraction.criteria.len(), 1);
        assert_eq!(extraction.criteria[0].score, 9.0);
        // no overall marker, so the mean of criteria
        assert_eq!(extraction.overall_score, 9.0);
    }

    #[test]
    fn test_rambling_output() {
        let extractor = MarkerExtractor::new(MARKERS).unwrap();
        let extraction = extractor.extract("The colors are nice and the layout is clean.");
        assert!(extraction.criteria.is_empty());
        assert_eq!(extraction.overall_score, 0.0);
    }
}
