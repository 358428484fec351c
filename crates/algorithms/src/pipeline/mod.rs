//! End-to-end classification runs
//!
//! A [`Pipeline`] turns a validated [`ClassificationConfig`] into an ordered
//! list of [`Step`]s and executes them, reporting progress per step and
//! honouring cancellation between steps, features and rows.

mod config;

pub use config::{ClassificationConfig, TrainingSource};

use dtclassifier_core::io::{create_raster, open_raster, RasterSource};
use dtclassifier_core::vector::{VectorFormat, VectorLayer};
use dtclassifier_core::{Error, Result, CRS};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::classifier::{
    output_grid, output_pixel_type, predict_raster, ClassifierKind, ClassifierModel,
};
use crate::morphology::{GeneralizeParams, Generalizer};
use crate::progress::{CancelToken, NoProgress, ProgressSink, StepContext};
use crate::stack::{BandStacker, NativeBandStacker};
use crate::training::{TrainingSet, ABSENCE, PRESENCE};

/// One stage of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    Stack,
    BuildTrainingSet,
    SaveTrainLayer,
    Train,
    LoadModel,
    SaveModel,
    Classify,
    Generalize,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Validate => "validate",
            Step::Stack => "stack rasters",
            Step::BuildTrainingSet => "build training set",
            Step::SaveTrainLayer => "save train layer",
            Step::Train => "train",
            Step::LoadModel => "load model",
            Step::SaveModel => "save model",
            Step::Classify => "classify",
            Step::Generalize => "generalize",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub steps: Vec<Step>,
    pub presence_samples: usize,
    pub absence_samples: usize,
    pub samples: usize,
    pub model_kind: Option<ClassifierKind>,
    pub train_layer: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub classified: Option<PathBuf>,
    pub generalized: Option<PathBuf>,
    /// Failures that did not stop the run
    pub warnings: Vec<String>,
}

/// Classification run over a configuration
pub struct Pipeline {
    config: ClassificationConfig,
    stacker: Box<dyn BandStacker>,
    progress: Box<dyn ProgressSink>,
    cancel: CancelToken,
}

/// Intermediate results carried between steps
#[derive(Default)]
struct RunState {
    raster: Option<PathBuf>,
    source: Option<Box<dyn RasterSource>>,
    training: Option<TrainingSet>,
    crs: Option<CRS>,
    model: Option<ClassifierModel>,
    /// Holds the stacked composite; dropped after the source
    scratch: Option<TempDir>,
}

impl RunState {
    /// The raster to sample and classify, opened once
    fn source(&mut self) -> Result<&dyn RasterSource> {
        if self.source.is_none() {
            let path = self.raster.as_deref().ok_or_else(|| Error::InvalidParameter {
                name: "input_rasters",
                value: "none".into(),
                reason: "no input raster to read".into(),
            })?;
            let source = open_raster(path)?;
            if self.crs.is_none() {
                self.crs = source.grid_info().crs.clone();
            }
            self.source = Some(source);
        }
        self.source
            .as_deref()
            .ok_or_else(|| Error::Other("raster source unavailable".into()))
    }

    fn training(&self) -> Result<&TrainingSet> {
        self.training
            .as_ref()
            .ok_or_else(|| Error::Other("no training set has been built".into()))
    }

    fn model(&self) -> Result<&ClassifierModel> {
        self.model
            .as_ref()
            .ok_or_else(|| Error::Other("no model has been trained or loaded".into()))
    }
}

fn missing_option(name: &'static str) -> Error {
    Error::InvalidParameter {
        name,
        value: "none".into(),
        reason: "required by the planned step".into(),
    }
}

impl Pipeline {
    pub fn new(config: ClassificationConfig) -> Self {
        Self {
            config,
            stacker: Box::new(NativeBandStacker),
            progress: Box::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_stacker(mut self, stacker: Box<dyn BandStacker>) -> Self {
        self.stacker = stacker;
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    /// Steps this configuration runs, in order
    pub fn steps(&self) -> Vec<Step> {
        let config = &self.config;
        let source = config.training_source();
        let needs_raster = config.output_raster.is_some() || source == TrainingSource::Layers;

        let mut steps = vec![Step::Validate];
        if needs_raster && config.input_rasters.len() > 1 {
            steps.push(Step::Stack);
        }
        match source {
            TrainingSource::Model(_) => steps.push(Step::LoadModel),
            TrainingSource::TrainLayer(_) | TrainingSource::Layers => {
                steps.push(Step::BuildTrainingSet);
                if config.save_train_layer.is_some() {
                    steps.push(Step::SaveTrainLayer);
                }
                if config.save_model.is_some() || config.output_raster.is_some() {
                    steps.push(Step::Train);
                }
            }
        }
        if config.save_model.is_some() {
            steps.push(Step::SaveModel);
        }
        if config.output_raster.is_some() {
            steps.push(Step::Classify);
            if config.generalize.is_some() {
                steps.push(Step::Generalize);
            }
        }
        steps
    }

    /// Execute every step, stopping at the first error
    pub fn run(&self) -> Result<RunReport> {
        let steps = self.steps();
        let count = steps.len();
        let mut report = RunReport {
            steps: steps.clone(),
            ..RunReport::default()
        };
        let mut state = RunState {
            raster: self.config.input_rasters.first().cloned(),
            ..RunState::default()
        };

        for (index, step) in steps.iter().enumerate() {
            let ctx = StepContext::new(index, count, self.progress.as_ref(), self.cancel.clone());
            ctx.checkpoint()?;
            ctx.sub_step(0, 1);
            info!(step = %step, index = index + 1, count, "running step");
            self.run_step(*step, &mut state, &mut report, &ctx)?;
            ctx.sub_step(1, 1);
        }

        info!(
            samples = report.samples,
            classified = ?report.classified,
            generalized = ?report.generalized,
            warnings = report.warnings.len(),
            "run finished"
        );
        // scratch files (the stacked composite) go away with the state
        drop(state);
        Ok(report)
    }

    fn run_step(&self, step: Step, state: &mut RunState, report: &mut RunReport, ctx: &StepContext<'_>) -> Result<()> {
        let config = &self.config;
        match step {
            Step::Validate => config.validate(),
            Step::Stack => {
                let dir = tempfile::Builder::new().prefix("dtclassifier-").tempdir()?;
                let composite = self
                    .stacker
                    .stack_bands(&config.input_rasters, &dir.path().join("composite.tif"))?;
                info!(stacker = self.stacker.name(), composite = %composite.display(), "using stacked raster");
                state.raster = Some(composite);
                state.scratch = Some(dir);
                Ok(())
            }
            Step::BuildTrainingSet => {
                let set = match config.training_source() {
                    TrainingSource::TrainLayer(path) => {
                        let layer = VectorLayer::open(&path)?;
                        state.crs = layer.crs().cloned();
                        TrainingSet::build_from_point_layer(&layer)?
                    }
                    TrainingSource::Layers => {
                        let presence = open_layers(&config.presence)?;
                        let absence = open_layers(&config.absence)?;
                        let source = state.source()?;
                        TrainingSet::build_from_layers(&presence, &absence, source, &config.extract, ctx)?
                    }
                    TrainingSource::Model(_) => return Err(Error::Other("a loaded model has no training set".into())),
                };
                report.presence_samples = set.count_label(PRESENCE);
                report.absence_samples = set.count_label(ABSENCE);
                report.samples = set.len();
                state.training = Some(set);
                Ok(())
            }
            Step::SaveTrainLayer => {
                let path = config.save_train_layer.as_deref().ok_or_else(|| missing_option("save_train_layer"))?;
                match save_train_layer(state.training()?, state.crs.clone(), path) {
                    Ok(()) => report.train_layer = Some(path.to_path_buf()),
                    Err(e) if e.is_recoverable() => {
                        warn!(path = %path.display(), error = %e, "train layer not saved");
                        report.warnings.push(e.to_string());
                    }
                    Err(e) => return Err(e),
                }
                Ok(())
            }
            Step::Train => {
                let model = ClassifierModel::train(state.training()?, &config.train_options())?;
                report.model_kind = Some(model.kind());
                state.model = Some(model);
                Ok(())
            }
            Step::LoadModel => {
                let path = config.use_model.as_deref().ok_or_else(|| missing_option("use_model"))?;
                let (name, model) = ClassifierModel::load_named(path)?;
                info!(name = %name, kind = %model.kind(), bands = model.n_features(), "using saved model");
                report.model_kind = Some(model.kind());
                state.model = Some(model);
                Ok(())
            }
            Step::SaveModel => {
                let path = config.save_model.as_deref().ok_or_else(|| missing_option("save_model"))?;
                state.model()?.save(path, &config.model_name)?;
                report.model = Some(path.to_path_buf());
                Ok(())
            }
            Step::Classify => {
                let path = config.output_raster.as_deref().ok_or_else(|| missing_option("output_raster"))?;
                state.source()?;
                let (Some(source), Some(model)) = (state.source.as_deref(), state.model.as_ref()) else {
                    return Err(Error::Other("classification inputs unavailable".into()));
                };
                let pixel_type = output_pixel_type(model);
                let grid = output_grid(source.grid_info(), pixel_type);
                let mut sink = create_raster(path, &grid, pixel_type)?;
                predict_raster(source, model, sink.as_mut(), ctx)?;
                report.classified = Some(path.to_path_buf());
                Ok(())
            }
            Step::Generalize => {
                let classified = report.classified.clone().ok_or_else(|| missing_option("output_raster"))?;
                let kernel_size = config.generalize.ok_or_else(|| missing_option("generalize"))?;
                let params = GeneralizeParams {
                    kernel_size,
                    method: config.generalize_method,
                    pixel_type: output_pixel_type(state.model()?),
                };
                report.generalized = Some(Generalizer.smooth(&classified, &params)?);
                Ok(())
            }
        }
    }
}

fn open_layers(paths: &[PathBuf]) -> Result<Vec<VectorLayer>> {
    paths.iter().map(|p| VectorLayer::open(p)).collect()
}

fn save_train_layer(set: &TrainingSet, crs: Option<CRS>, path: &Path) -> Result<()> {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("train");
    let layer = set.to_train_layer(name, crs)?;
    layer.write_to_file(path, VectorFormat::from_path(path).unwrap_or(VectorFormat::GeoJson))?;
    info!(path = %path.display(), features = layer.len(), "saved train layer");
    Ok(())
}
