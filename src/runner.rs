use crate::evaluation::{Evaluator, Screenshot};
use crate::metrics;
use crate::models::{BenchmarkMetrics, EvaluationResult};
use crate::reporter::Reporter;
use tracing::{debug, warn};

/// One evaluator's pass over the screenshot set
#[derive(Debug, Clone)]
pub struct EvaluatorRun {
    pub metrics: BenchmarkMetrics,
    /// Per-image results in screenshot order, empty if the model never loaded
    pub results: Vec<EvaluationResult>,
}

/// Everything produced by one benchmark invocation
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    pub description: String,
    pub screenshots: Vec<Screenshot>,
    pub runs: Vec<EvaluatorRun>,
}

/// Runs evaluators one after the other so that only one model holds
/// accelerator memory at a time
pub struct Runner<'a> {
    reporter: &'a mut dyn Reporter,
    description: String,
}

impl<'a> Runner<'a> {
    pub fn new(reporter: &'a mut dyn Reporter, description: impl Into<String>) -> Self {
        Self {
            reporter,
            description: description.into(),
        }
    }

    /// Run every evaluator over every screenshot, in order.
    ///
    /// Always completes: an evaluator that fails to load is reported with
    /// zeroed metrics and the run moves on to the next one.
    pub async fn run_benchmark(
        &mut self,
        evaluators: Vec<Box<dyn Evaluator>>,
        screenshots: &[Screenshot],
    ) -> BenchmarkRun {
        self.log_benchmark_start(screenshots.len(), evaluators.len());

        let mut runs = Vec::with_capacity(evaluators.len());
        for mut evaluator in evaluators {
            let run = self.run_single_evaluator(evaluator.as_mut(), screenshots).await;
            runs.push(run);
        }

        BenchmarkRun {
            description: self.description.clone(),
            screenshots: screenshots.to_vec(),
            runs,
        }
    }

    /// Load, evaluate every screenshot, then unload
    async fn run_single_evaluator(
        &mut self,
        evaluator: &mut dyn Evaluator,
        screenshots: &[Screenshot],
    ) -> EvaluatorRun {
        let capabilities = evaluator.capabilities().clone();
        self.reporter.line(&format!("\nLoading {}...", capabilities.name));
        self.reporter.line(&format!(
            "  Parameters: {}, VRAM: {}GB",
            capabilities.parameters, capabilities.vram_required_gb
        ));

        if let Err(e) = evaluator.load().await {
            warn!(evaluator = %capabilities.name, error = %e, "model failed to load");
            self.reporter
                .line(&format!("Failed to load {}: {}", capabilities.name, e));
            evaluator.unload().await;
            return EvaluatorRun {
                metrics: metrics::load_failure(&capabilities, screenshots.len(), e.to_string()),
                results: Vec::new(),
            };
        }

        let mut results = Vec::with_capacity(screenshots.len());
        for (index, screenshot) in screenshots.iter().enumerate() {
            self.log_image_progress(&capabilities.name, screenshot, index + 1, screenshots.len());
            let result = evaluator.evaluate(screenshot, &self.description).await;
            self.log_image_result(&result);
            results.push(result);
        }

        evaluator.unload().await;
        debug!(evaluator = %capabilities.name, "model unloaded");

        EvaluatorRun {
            metrics: metrics::aggregate(&capabilities, screenshots.len(), &results),
            results,
        }
    }

    fn log_benchmark_start(&mut self, screenshot_count: usize, evaluator_count: usize) {
        self.reporter.line("VLM UI Design Evaluation Benchmark");
        self.reporter.line(&format!("Screenshots: {}", screenshot_count));
        self.reporter.line(&format!("Evaluators: {}", evaluator_count));
    }

    fn log_image_progress(&mut self, evaluator: &str, screenshot: &Screenshot, num: usize, total: usize) {
        self.reporter
            .progress(&format!("{}: {} ({}/{})", evaluator, screenshot.name, num, total));
    }

    fn log_image_result(&mut self, result: &EvaluationResult) {
        match &result.error {
            Some(error) => {
                warn!(evaluator = %result.evaluator, image = %result.image, %error, "evaluation failed");
                self.reporter.progress(&format!("  error: {}", error));
            }
            None => self.reporter.progress(&format!(
                "  score {:.1} ({}) in {:.0}ms",
                result.overall_score,
                if result.passed() { "pass" } else { "fail" },
                result.inference_time_ms
            )),
        }
    }
}
