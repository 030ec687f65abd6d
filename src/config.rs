use crate::models::{EvaluatorKind, VIBRANT_MINIMAL_DESCRIPTION};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backend settings for one evaluator. Unset fields fall back to the
/// defaults of the evaluator kind.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EvaluatorConfig {
    /// Which evaluator this entry configures
    pub kind: EvaluatorKind,
    /// Base URL of the inference server
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model identifier served by the endpoint
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key, if the server needs one
    #[serde(default)]
    pub env_var_api_key: Option<String>,
    /// Maximum number of generated tokens
    #[serde(default)]
    pub max_tokens: Option<u16>,
    /// URL reporting current accelerator memory as `{"allocated_mb": ..}`
    #[serde(default)]
    pub memory_endpoint: Option<String>,
}

impl EvaluatorConfig {
    /// Entry relying entirely on the kind's defaults
    pub fn for_kind(kind: EvaluatorKind) -> Self {
        Self {
            kind,
            endpoint: None,
            model: None,
            env_var_api_key: None,
            max_tokens: None,
            memory_endpoint: None,
        }
    }
}

fn default_description() -> String {
    VIBRANT_MINIMAL_DESCRIPTION.to_string()
}

fn default_raw_output_limit() -> usize {
    1000
}

fn default_evaluators() -> Vec<EvaluatorConfig> {
    EvaluatorKind::ALL
        .iter()
        .copied()
        .map(EvaluatorConfig::for_kind)
        .collect()
}

/// Root benchmark configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Target design description every evaluator scores against
    #[serde(default = "default_description")]
    pub description: String,
    /// Maximum characters of raw model output kept in the results file
    #[serde(default = "default_raw_output_limit")]
    pub raw_output_limit: usize,
    /// Upper bound for a single inference call. Unbounded when unset.
    #[serde(default)]
    pub inference_timeout_secs: Option<u64>,
    /// Screenshot pairs showing the same UI in two states, e.g. light and dark
    #[serde(default)]
    pub pairs: Vec<(String, String)>,
    /// Evaluators to run, in order
    #[serde(default = "default_evaluators")]
    pub evaluators: Vec<EvaluatorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            description: default_description(),
            raw_output_limit: default_raw_output_limit(),
            inference_timeout_secs: None,
            pairs: Vec::new(),
            evaluators: default_evaluators(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Load from the given file, or fall back to the built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
description = "A calm pastel dashboard"
raw_output_limit = 200
inference_timeout_secs = 90
pairs = [["home.png", "home-dark.png"]]

[[evaluators]]
kind = "qwen-vl"
endpoint = "http://gpu-box:8000/v1"
model = "Qwen/Qwen2-VL-2B-Instruct"
env_var_api_key = "VLLM_API_KEY"
max_tokens = 300
memory_endpoint = "http://gpu-box:8000/memory"

[[evaluators]]
kind = "uiclip"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.description, "A calm pastel dashboard");
        assert_eq!(config.raw_output_limit, 200);
        assert_eq!(config.inference_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(
            config.pairs,
            vec![("home.png".to_string(), "home-dark.png".to_string())]
        );
        assert_eq!(config.evaluators.len(), 2);
        assert_eq!(config.evaluators[0].kind, EvaluatorKind::QwenVl);
        assert_eq!(config.evaluators[0].max_tokens, Some(300));
        assert_eq!(
            config.evaluators[0].env_var_api_key.as_deref(),
            Some("VLLM_API_KEY")
        );
        assert_eq!(config.evaluators[1], EvaluatorConfig::for_kind(EvaluatorKind::Uiclip));
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "raw_output_limit = 50\n").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.description, VIBRANT_MINIMAL_DESCRIPTION);
        assert_eq!(config.raw_output_limit, 50);
        assert_eq!(config.inference_timeout(), None);
        assert!(config.pairs.is_empty());
        let kinds: Vec<_> = config.evaluators.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, EvaluatorKind::ALL.to_vec());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.raw_output_limit, 1000);
        assert_eq!(config.evaluators.len(), 4);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[[evaluators]]\nkind = \"gpt-vision\"\n").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/bench.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
