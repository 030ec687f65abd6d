use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod backend;
mod config;
mod error;
mod evaluation;
mod evaluators;
mod extraction;
mod html_report;
mod metrics;
mod models;
mod output;
mod persistence;
mod reporter;
mod runner;

use crate::config::Config;
use crate::evaluation::Screenshot;
use crate::models::EvaluatorKind;
use crate::output::{OutputFormat, SummaryRow};
use crate::persistence::RunRecord;
use crate::reporter::{ConsoleReporter, Reporter};
use crate::runner::Runner;

/// VLM UI Benchmark - Score UI screenshots with several vision-language models and compare them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output - show progress for each screenshot
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every screenshot with every selected model
    Run {
        /// Directory containing the PNG screenshots
        #[arg(long, default_value = "screenshots")]
        screenshots: PathBuf,

        /// Directory receiving the results file
        #[arg(long, default_value = "results")]
        output: PathBuf,

        /// Models to run by name or kind (default: all). Options: uiclip, smolvlm, mobilevlm, qwen-vl
        #[arg(long, num_args = 1..)]
        models: Vec<String>,

        /// Output format: plain or json
        #[arg(short, long, default_value = "plain")]
        format: OutputFormat,
    },

    /// List the available evaluators and their capabilities
    ListModels,

    /// Render an HTML report from a saved results file
    Report {
        /// Results file, or a directory whose latest results file is used
        #[arg(long, default_value = "results")]
        from: PathBuf,

        /// Directory containing the PNG screenshots
        #[arg(long, default_value = "screenshots")]
        screenshots: PathBuf,

        /// Where to write the HTML report
        #[arg(long)]
        html: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut reporter = ConsoleReporter::new(args.verbose);

    match args.command {
        Command::Run {
            screenshots,
            output,
            models,
            format,
        } => {
            let config = Config::load(args.config.as_deref())?;
            let mut progress = match format {
                OutputFormat::Plain => ConsoleReporter::new(args.verbose),
                OutputFormat::Json => ConsoleReporter::stderr(args.verbose),
            };
            let options = RunOptions {
                screenshots_dir: &screenshots,
                output_dir: &output,
                models: &models,
                format,
            };
            run(&mut progress, &mut reporter, &config, options).await
        }
        Command::ListModels => {
            list_models(&mut reporter);
            Ok(())
        }
        Command::Report {
            from,
            screenshots,
            html,
        } => {
            let results_file = persistence::resolve_results_path(&from)?;
            html_report::write_html_report(&results_file, &screenshots, &html)?;

            let record = persistence::load_run(&results_file)?;
            let rows = record.results.iter().map(SummaryRow::from_record).collect();
            reporter.line(&output::summary_table(&SummaryRow::ranked(rows)));
            reporter.line(&format!("\nHTML report generated: {}", html.display()));
            Ok(())
        }
    }
}

struct RunOptions<'a> {
    screenshots_dir: &'a Path,
    output_dir: &'a Path,
    models: &'a [String],
    format: OutputFormat,
}

/// Run the benchmark. Progress goes to `progress`, tables or the JSON
/// document to `reporter`.
async fn run(
    progress: &mut dyn Reporter,
    reporter: &mut dyn Reporter,
    config: &Config,
    options: RunOptions<'_>,
) -> Result<()> {
    let RunOptions {
        screenshots_dir,
        output_dir,
        models,
        format,
    } = options;

    if !screenshots_dir.is_dir() {
        bail!("Screenshots directory not found: {}", screenshots_dir.display());
    }

    let screenshots = Screenshot::discover(screenshots_dir)?;
    if screenshots.is_empty() {
        progress.line("No screenshots found!");
        return Ok(());
    }

    let evaluators = evaluators::build_selected(&config.evaluators, models, config.inference_timeout())?;
    if evaluators.is_empty() {
        progress.line(&format!("No evaluators match: {}", models.join(", ")));
        return Ok(());
    }

    let pairs = if config.pairs.is_empty() {
        output::detect_pairs(&screenshots)
    } else {
        config.pairs.clone()
    };

    let run = Runner::new(progress, config.description.as_str())
        .run_benchmark(evaluators, &screenshots)
        .await;

    let record = RunRecord::from_run(&run, persistence::timestamp_now(), config.raw_output_limit);
    output::print_run(reporter, &run, &record, &pairs, format)?;

    let path = persistence::save_run(&record, output_dir)?;
    progress.line(&format!("\nResults saved to: {}", path.display()));
    Ok(())
}

fn list_models(reporter: &mut dyn Reporter) {
    let mark = |supported: bool| if supported { "✓" } else { "✗" };

    reporter.line("\nAvailable VLM Evaluators:");
    reporter.line(&"-".repeat(60));
    for kind in EvaluatorKind::ALL {
        let caps = evaluators::capabilities(kind);
        reporter.line(&format!("\n  {}", caps.name));
        reporter.line(&format!("    Type: {}", caps.kind));
        reporter.line(&format!("    Parameters: {}", caps.parameters));
        reporter.line(&format!("    VRAM Required: {}GB", caps.vram_required_gb));
        reporter.line(&format!("    Quantization: {}", caps.quantization));
        reporter.line(&format!("    Quality Score: {}", mark(caps.supports_quality_score)));
        reporter.line(&format!("    Text Matching: {}", mark(caps.supports_text_matching)));
        reporter.line(&format!("    Suggestions: {}", mark(caps.supports_design_suggestions)));
    }
    reporter.line("");
}
