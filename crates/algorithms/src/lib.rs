//! # DtClassifier Algorithms
//!
//! Presence/absence raster classification built on `dtclassifier-core`.
//!
//! ## Modules
//!
//! - **sampling**: Pixel extraction under points, lines and polygons
//! - **training**: Labelled training sets and train layers
//! - **classifier**: Decision tree and random forest models, raster prediction
//! - **stack**: Band stacking of several input rasters
//! - **morphology**: Neighborhood filters and generalization of class rasters
//! - **pipeline**: End-to-end runs over a [`pipeline::ClassificationConfig`]
//! - **progress**: Progress reporting and cancellation

pub mod classifier;
pub mod morphology;
pub mod pipeline;
pub mod progress;
pub mod sampling;
pub mod stack;
pub mod training;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{
        predict_raster, ClassifierKind, ClassifierModel, DecisionTree, ForestParams, RandomForest,
        TrainOptions, TreeParams,
    };
    pub use crate::morphology::{generalize, GeneralizeMethod, GeneralizeParams, Generalizer};
    pub use crate::pipeline::{ClassificationConfig, Pipeline, RunReport, Step};
    pub use crate::progress::{CancelToken, NoProgress, ProgressEvent, ProgressSink, StepContext};
    pub use crate::sampling::{ExtractParams, Sample, SampleExtractor};
    pub use crate::stack::{BandStacker, NativeBandStacker, ProcessBandStacker};
    pub use crate::training::{TrainingSet, ABSENCE, PRESENCE};
    pub use dtclassifier_core::prelude::*;
}
