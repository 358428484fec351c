//! Decision tree and random forest classifiers
//!
//! - [`DecisionTree`]: CART with surrogate splits, categorical subsets in
//!   discrete mode and cross-validated cost-complexity pruning
//! - [`RandomForest`]: bagged CART trees with random feature subsets
//! - [`ClassifierModel`]: tagged choice of the two, with JSON persistence
//! - [`predict_raster`]: row-by-row inference over a raster

mod forest;
mod model;
mod predict;
mod prune;
mod split;
mod tree;

pub use forest::{ForestParams, RandomForest};
pub use model::{ClassifierKind, ClassifierModel, TrainOptions, DEFAULT_MODEL_NAME, MODEL_FORMAT, MODEL_VERSION};
pub use predict::{output_grid, output_pixel_type, predict_raster, PredictSummary};
pub use split::{Split, SplitRule};
pub use tree::{DecisionTree, Node, Task, TreeParams};
