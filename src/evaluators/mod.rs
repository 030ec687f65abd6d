//! The shipped evaluators and the factory that builds them from config.

mod mobilevlm;
mod qwen_vl;
mod smolvlm;
mod uiclip;

use crate::backend::BackendSettings;
use crate::config::EvaluatorConfig;
use crate::evaluation::Evaluator;
use crate::models::{CapabilityDescriptor, EvaluatorKind};
use anyhow::{Context, Result};
use std::time::Duration;

/// Where a kind is served when the config does not say otherwise
struct BackendDefaults {
    endpoint: &'static str,
    model: &'static str,
    max_tokens: u16,
}

fn defaults(kind: EvaluatorKind) -> BackendDefaults {
    match kind {
        EvaluatorKind::Uiclip => uiclip::DEFAULTS,
        EvaluatorKind::Smolvlm => smolvlm::DEFAULTS,
        EvaluatorKind::Mobilevlm => mobilevlm::DEFAULTS,
        EvaluatorKind::QwenVl => qwen_vl::DEFAULTS,
    }
}

/// Static capabilities of an evaluator kind
pub fn capabilities(kind: EvaluatorKind) -> CapabilityDescriptor {
    match kind {
        EvaluatorKind::Uiclip => uiclip::capabilities(),
        EvaluatorKind::Smolvlm => smolvlm::capabilities(),
        EvaluatorKind::Mobilevlm => mobilevlm::capabilities(),
        EvaluatorKind::QwenVl => qwen_vl::capabilities(),
    }
}

/// Merge an evaluator entry with its kind's defaults
pub fn backend_settings(config: &EvaluatorConfig) -> BackendSettings {
    let defaults = defaults(config.kind);
    BackendSettings {
        endpoint: config
            .endpoint
            .clone()
            .unwrap_or_else(|| defaults.endpoint.to_string()),
        model: config
            .model
            .clone()
            .unwrap_or_else(|| defaults.model.to_string()),
        env_var_api_key: config.env_var_api_key.clone(),
        max_tokens: config.max_tokens.unwrap_or(defaults.max_tokens),
        memory_endpoint: config.memory_endpoint.clone(),
    }
}

/// Build an unloaded evaluator for one config entry
pub fn build_evaluator(
    config: &EvaluatorConfig,
    timeout: Option<Duration>,
) -> Result<Box<dyn Evaluator>> {
    let settings = backend_settings(config);
    let evaluator: Box<dyn Evaluator> = match config.kind {
        EvaluatorKind::Uiclip => Box::new(uiclip::build(settings, timeout)),
        EvaluatorKind::Smolvlm => Box::new(smolvlm::build(settings, timeout)?),
        EvaluatorKind::Mobilevlm => Box::new(mobilevlm::build(settings, timeout)?),
        EvaluatorKind::QwenVl => Box::new(qwen_vl::build(settings, timeout)?),
    };
    Ok(evaluator)
}

/// Keep the entries whose capability name or kind tag matches one of
/// `names`, case-insensitively. An empty filter keeps everything.
pub fn select<'a>(configs: &'a [EvaluatorConfig], names: &[String]) -> Vec<&'a EvaluatorConfig> {
    if names.is_empty() {
        return configs.iter().collect();
    }
    let wanted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    configs
        .iter()
        .filter(|config| {
            let name = capabilities(config.kind).name.to_lowercase();
            let tag = config.kind.as_str();
            wanted.iter().any(|w| *w == name || w == tag)
        })
        .collect()
}

/// Build every selected evaluator, in config order
pub fn build_selected(
    configs: &[EvaluatorConfig],
    names: &[String],
    timeout: Option<Duration>,
) -> Result<Vec<Box<dyn Evaluator>>> {
    select(configs, names)
        .into_iter()
        .map(|config| {
            build_evaluator(config, timeout)
                .with_context(|| format!("Failed to build evaluator {}", config.kind))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quantization;

    #[test]
    fn test_capability_table() {
        let uiclip = capabilities(EvaluatorKind::Uiclip);
        assert_eq!(uiclip.name, "UIClip");
        assert_eq!(uiclip.parameters, "400M");
        assert!(uiclip.supports_text_matching);
        assert!(!uiclip.supports_design_suggestions);

        let smol = capabilities(EvaluatorKind::Smolvlm);
        assert_eq!(smol.name, "SmolVLM2-256M");
        assert_eq!(smol.vram_required_gb, 1.0);
        assert!(!smol.supports_text_matching);

        let llava = capabilities(EvaluatorKind::Mobilevlm);
        assert_eq!(llava.name, "LLaVA-OneVision-0.5B");
        assert!(llava.supports_design_suggestions);

        let qwen = capabilities(EvaluatorKind::QwenVl);
        assert_eq!(qwen.name, "Qwen2-VL-2B");
        assert_eq!(qwen.quantization, Quantization::FourBit);
        assert_eq!(qwen.vram_required_gb, 5.0);
    }

    #[test]
    fn test_capability_names_are_unique() {
        let mut names: Vec<_> = EvaluatorKind::ALL
            .iter()
            .map(|k| capabilities(*k).name)
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EvaluatorKind::ALL.len());
    }

    #[test]
    fn test_capabilities_carry_their_kind() {
        for kind in EvaluatorKind::ALL {
            assert_eq!(capabilities(kind).kind, kind);
        }
    }

    #[test]
    fn test_backend_settings_defaults_and_overrides() {
        let settings = backend_settings(&EvaluatorConfig::for_kind(EvaluatorKind::Smolvlm));
        assert_eq!(settings.model, "HuggingFaceTB/SmolVLM2-256M-Video-Instruct");
        assert_eq!(settings.max_tokens, 100);

        let mut config = EvaluatorConfig::for_kind(EvaluatorKind::QwenVl);
        config.endpoint = Some("http://gpu:9000/v1".to_string());
        config.max_tokens = Some(64);
        let settings = backend_settings(&config);
        assert_eq!(settings.endpoint, "http://gpu:9000/v1");
        assert_eq!(settings.model, "Qwen/Qwen2-VL-2B-Instruct");
        assert_eq!(settings.max_tokens, 64);
    }

    #[test]
    fn test_select_by_name_or_tag() {
        let configs: Vec<_> = EvaluatorKind::ALL
            .iter()
            .copied()
            .map(EvaluatorConfig::for_kind)
            .collect();

        let picked = select(&configs, &["QWEN-VL".to_string(), "uiclip".to_string()]);
        let kinds: Vec<_> = picked.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![EvaluatorKind::Uiclip, EvaluatorKind::QwenVl]);

        let picked = select(&configs, &["smolvlm2-256m".to_string()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].kind, EvaluatorKind::Smolvlm);

        assert_eq!(select(&configs, &[]).len(), 4);
        assert!(select(&configs, &["gpt-4o".to_string()]).is_empty());
    }

    #[test]
    fn test_build_every_kind() {
        for kind in EvaluatorKind::ALL {
            let evaluator = build_evaluator(&EvaluatorConfig::for_kind(kind), None).unwrap();
            assert_eq!(evaluator.capabilities().kind, kind);
        }
    }
}
