//! DtClassifier CLI - presence/absence raster classification

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dtclassifier_algorithms::classifier::ClassifierKind;
use dtclassifier_algorithms::morphology::GeneralizeMethod;
use dtclassifier_algorithms::pipeline::{ClassificationConfig, Pipeline, RunReport};
use dtclassifier_algorithms::progress::ProgressEvent;
use dtclassifier_algorithms::stack::ProcessBandStacker;
use dtclassifier_core::Error;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "dtclassifier")]
#[command(author, version, about = "Presence/absence raster classification with decision trees", long_about = None)]
struct Cli {
    /// Input rasters; several rasters are stacked band by band
    #[arg(long = "input_rasters", num_args = 1.., value_name = "PATH")]
    input_rasters: Vec<PathBuf>,

    /// Presence layers (points, lines or polygons)
    #[arg(long, num_args = 1.., value_name = "PATH")]
    presence: Vec<PathBuf>,

    /// Absence layers (points, lines or polygons)
    #[arg(long, num_args = 1.., value_name = "PATH")]
    absence: Vec<PathBuf>,

    /// Classify the input rasters and write the result here
    #[arg(long, value_name = "PATH")]
    classify: Option<PathBuf>,

    /// Save the trained model
    #[arg(long = "save_model", value_name = "PATH")]
    save_model: Option<PathBuf>,

    /// Save the training samples as a point layer
    #[arg(long = "save_train_layer", value_name = "PATH")]
    save_train_layer: Option<PathBuf>,

    /// Use a saved model instead of training
    #[arg(long = "use_model", value_name = "PATH")]
    use_model: Option<PathBuf>,

    /// Train from a saved train layer instead of presence/absence layers
    #[arg(long = "use_train_layer", value_name = "PATH")]
    use_train_layer: Option<PathBuf>,

    /// Use a single decision tree instead of a random forest
    #[arg(long = "decision_tree")]
    decision_tree: bool,

    /// Treat band values and labels as discrete classes
    #[arg(long = "discrete_classes")]
    discrete_classes: bool,

    /// Generalize the classified raster with this kernel size
    #[arg(long, value_name = "KERNEL_SIZE")]
    generalize: Option<usize>,

    /// Generalization filter: median, dilate_erode_dilate
    #[arg(long = "generalize_method", default_value = "median", value_name = "METHOD")]
    generalize_method: String,

    /// External merge program used to stack several rasters (e.g. gdal_merge.py)
    #[arg(long = "merge_command", value_name = "PROGRAM")]
    merge_command: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Result<ClassificationConfig> {
        Ok(ClassificationConfig {
            input_rasters: self.input_rasters.clone(),
            presence: self.presence.clone(),
            absence: self.absence.clone(),
            output_raster: self.classify.clone(),
            save_model: self.save_model.clone(),
            save_train_layer: self.save_train_layer.clone(),
            use_model: self.use_model.clone(),
            use_train_layer: self.use_train_layer.clone(),
            classifier: if self.decision_tree {
                ClassifierKind::DecisionTree
            } else {
                ClassifierKind::RandomForest
            },
            discrete_labels: self.discrete_classes,
            generalize: self.generalize,
            generalize_method: parse_generalize_method(&self.generalize_method)?,
            ..ClassificationConfig::default()
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn parse_generalize_method(s: &str) -> Result<GeneralizeMethod> {
    match s.to_lowercase().as_str() {
        "median" => Ok(GeneralizeMethod::Median),
        "dilate_erode_dilate" | "ded" => Ok(GeneralizeMethod::DilateErodeDilate),
        _ => Err(Error::InvalidParameter {
            name: "generalize_method",
            value: s.to_string(),
            reason: "use median or dilate_erode_dilate".to_string(),
        }
        .into()),
    }
}

/// Configuration mistakes are reported together with the usage text
fn shows_usage(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidParameter { .. } | Error::InputNotFound { .. })
    )
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

const PROGRESS_TICKS: u64 = 1000;

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(PROGRESS_TICKS);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn report_progress(pb: &ProgressBar, event: ProgressEvent) {
    pb.set_message(format!("step {}/{}", event.step_index + 1, event.step_count));
    pb.set_position((event.fraction() * PROGRESS_TICKS as f64).round() as u64);
}

fn saved(name: &str, path: Option<&PathBuf>) {
    if let Some(path) = path {
        println!("{} saved to: {}", name, path.display());
    }
}

fn summarize(report: &RunReport, elapsed: std::time::Duration) {
    if report.samples > 0 {
        println!(
            "Training samples: {} ({} presence, {} absence)",
            report.samples, report.presence_samples, report.absence_samples
        );
    }
    if let Some(kind) = report.model_kind {
        println!("Classifier: {}", kind);
    }
    saved("Train layer", report.train_layer.as_ref());
    saved("Model", report.model.as_ref());
    saved("Classified raster", report.classified.as_ref());
    saved("Generalized raster", report.generalized.as_ref());
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    println!("  Processing time: {:.2?}", elapsed);
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    info!(
        input_rasters = ?config.input_rasters,
        presence = ?config.presence,
        absence = ?config.absence,
        "starting classification"
    );

    let pb = progress_bar()?;
    let sink = pb.clone();
    let mut pipeline = Pipeline::new(config).with_progress(move |event: ProgressEvent| report_progress(&sink, event));
    if let Some(program) = &cli.merge_command {
        pipeline = pipeline.with_stacker(Box::new(ProcessBandStacker::new(program)));
    }

    let start = Instant::now();
    let result = pipeline.run();
    pb.finish_and_clear();
    let report = result.context("Classification failed")?;
    summarize(&report, start.elapsed());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    if let Err(e) = setup_logging(cli.verbose).and_then(|_| run(&cli)) {
        eprintln!("Error: {:#}", e);
        if shows_usage(&e) {
            eprintln!();
            let _ = Cli::command().write_help(&mut std::io::stderr());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}
