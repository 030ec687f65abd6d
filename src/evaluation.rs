use crate::backend::{ImageInput, SimilarityBackend, VisionBackend};
use crate::error::{InferenceError, LoadError};
use crate::extraction::{ContrastivePair, TextExtractor, similarity_scores, softmax};
use crate::models::{CapabilityDescriptor, EvaluationResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A screenshot to evaluate, identified by its file name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Screenshot {
    pub name: String,
    pub path: PathBuf,
}

impl Screenshot {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }

    /// All PNG files in a directory, sorted by file name
    pub fn discover(dir: &Path) -> Result<Vec<Screenshot>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read screenshots directory: {}", dir.display()))?;

        let mut screenshots = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to list directory: {}", dir.display()))?
                .path();
            let is_png = path.extension().is_some_and(|ext| ext == "png");
            if path.is_file() && is_png {
                screenshots.push(Screenshot::from_path(path));
            }
        }

        screenshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(screenshots)
    }
}

/// A model that scores UI screenshots.
///
/// Lifecycle is `load`, any number of `evaluate` calls, then `unload`.
/// `evaluate` never fails: problems are reported in the result's `error`.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Static metadata, available before loading
    fn capabilities(&self) -> &CapabilityDescriptor;

    async fn load(&mut self) -> Result<(), LoadError>;

    async fn evaluate(&self, image: &Screenshot, description: &str) -> EvaluationResult;

    /// Release everything acquired by `load`. Safe after a failed load.
    async fn unload(&mut self);
}

/// Run one backend call under an optional timeout, returning its output and
/// wall-clock duration in milliseconds
async fn timed_inference<T, F>(timeout: Option<Duration>, call: F) -> Result<(T, f64), InferenceError>
where
    F: Future<Output = Result<T, InferenceError>>,
{
    let start = Instant::now();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| InferenceError::Timeout(limit))??,
        None => call.await?,
    };
    Ok((output, start.elapsed().as_secs_f64() * 1000.0))
}

/// Evaluator backed by a generative vision-language model.
///
/// The model answers a prompt in free text and the extractor turns that
/// text into scores.
pub struct GenerativeEvaluator {
    capabilities: CapabilityDescriptor,
    prompt_template: String,
    extractor: Box<dyn TextExtractor>,
    backend: Box<dyn VisionBackend>,
    timeout: Option<Duration>,
}

impl GenerativeEvaluator {
    pub fn new(
        capabilities: CapabilityDescriptor,
        prompt_template: impl Into<String>,
        extractor: Box<dyn TextExtractor>,
        backend: Box<dyn VisionBackend>,
    ) -> Self {
        Self {
            capabilities,
            prompt_template: prompt_template.into(),
            extractor,
            backend,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fill the `{description}` placeholder, if the template has one
    fn build_prompt(&self, description: &str) -> String {
        self.prompt_template.replace("{description}", description)
    }

    async fn try_evaluate(
        &self,
        image: &Screenshot,
        description: &str,
    ) -> Result<EvaluationResult, InferenceError> {
        let input = ImageInput::read(&image.name, &image.path).await?;
        let prompt = self.build_prompt(description);

        let memory_before = self.backend.memory_usage_mb().await;
        let (output_text, inference_time_ms) =
            timed_inference(self.timeout, self.backend.generate(&input, &prompt)).await?;
        let memory_after = self.backend.memory_usage_mb().await;

        let extraction = self.extractor.extract(&output_text);

        Ok(EvaluationResult::success(
            &self.capabilities.name,
            &image.name,
            extraction.overall_score,
            extraction.criteria,
            output_text,
            inference_time_ms,
            memory_before.max(memory_after),
        ))
    }
}

#[async_trait]
impl Evaluator for GenerativeEvaluator {
    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    async fn load(&mut self) -> Result<(), LoadError> {
        self.backend.load().await
    }

    async fn evaluate(&self, image: &Screenshot, description: &str) -> EvaluationResult {
        match self.try_evaluate(image, description).await {
            Ok(result) => result,
            Err(e) => EvaluationResult::failure(&self.capabilities.name, &image.name, e.to_string()),
        }
    }

    async fn unload(&mut self) {
        self.backend.unload().await
    }
}

/// Evaluator backed by a contrastive image-text model.
///
/// Scores come from two prompt pairs: a good/bad design pair and the
/// target description against its negation.
pub struct SimilarityEvaluator {
    capabilities: CapabilityDescriptor,
    good_design_prompt: String,
    bad_design_prompt: String,
    backend: Box<dyn SimilarityBackend>,
    timeout: Option<Duration>,
}

impl SimilarityEvaluator {
    pub fn new(
        capabilities: CapabilityDescriptor,
        good_design_prompt: impl Into<String>,
        bad_design_prompt: impl Into<String>,
        backend: Box<dyn SimilarityBackend>,
    ) -> Self {
        Self {
            capabilities,
            good_design_prompt: good_design_prompt.into(),
            bad_design_prompt: bad_design_prompt.into(),
            backend,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prompts in the order good, bad, matches, does not match
    fn build_prompts(&self, description: &str) -> Vec<String> {
        vec![
            self.good_design_prompt.clone(),
            self.bad_design_prompt.clone(),
            description.to_string(),
            format!("NOT {}", description),
        ]
    }

    async fn try_evaluate(
        &self,
        image: &Screenshot,
        description: &str,
    ) -> Result<EvaluationResult, InferenceError> {
        let input = ImageInput::read(&image.name, &image.path).await?;
        let prompts = self.build_prompts(description);

        let memory_before = self.backend.memory_usage_mb().await;
        let (logits, inference_time_ms) =
            timed_inference(self.timeout, self.backend.logits(&input, &prompts)).await?;
        let memory_after = self.backend.memory_usage_mb().await;

        let probs = softmax(&logits);
        let &[good, bad, matches, not_matches] = probs.as_slice() else {
            return Err(InferenceError::MalformedResponse(format!(
                "expected 4 finite logits, got {:?}",
                logits
            )));
        };

        let extraction = similarity_scores(
            ContrastivePair { positive: good, negative: bad },
            ContrastivePair { positive: matches, negative: not_matches },
        );
        let raw_output = format!(
            "Probs: quality={:.3}, bad={:.3}, match={:.3}, not={:.3}",
            good, bad, matches, not_matches
        );

        Ok(EvaluationResult::success(
            &self.capabilities.name,
            &image.name,
            extraction.overall_score,
            extraction.criteria,
            raw_output,
            inference_time_ms,
            memory_before.max(memory_after),
        ))
    }
}

#[async_trait]
impl Evaluator for SimilarityEvaluator {
    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    async fn load(&mut self) -> Result<(), LoadError> {
        self.backend.load().await
    }

    async fn evaluate(&self, image: &Screenshot, description: &str) -> EvaluationResult {
        match self.try_evaluate(image, description).await {
            Ok(result) => result,
            Err(e) => EvaluationResult::failure(&self.capabilities.name, &image.name, e.to_string()),
        }
    }

    async fn unload(&mut self) {
        self.backend.unload().await
    }
}
