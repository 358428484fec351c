//! Bagged ensemble of CART trees
//!
//! Each tree is grown on a bootstrap sample of the rows and tries a random
//! subset of `max_features` features at every node. Trees are neither pruned
//! nor given surrogates; rows missing a split feature take the majority
//! direction of that node.

use dtclassifier_core::{Error, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::split::SearchConfig;
use super::tree::{grow, validate_inputs, DecisionTree, GrowConfig, Targets, Task};

/// Parameters for [`RandomForest::fit`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_sample_count: usize,
    /// Candidate features per node; `None` means `sqrt(n_features)`
    pub max_features: Option<usize>,
    pub max_categories: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 5,
            min_sample_count: 10,
            max_features: None,
            max_categories: 10,
            seed: 42,
        }
    }
}

impl ForestParams {
    /// Candidate feature count for `n_features` columns
    pub fn features_per_split(&self, n_features: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features.max(1))
    }
}

/// A trained random forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    task: Task,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(features: ArrayView2<'_, f64>, labels: &[i32], params: &ForestParams, discrete: bool) -> Result<Self> {
        validate_inputs(features, labels)?;
        if params.n_trees == 0 {
            return Err(Error::InvalidParameter {
                name: "n_trees",
                value: "0".into(),
                reason: "a forest needs at least one tree".into(),
            });
        }

        let n = labels.len();
        let n_features = features.ncols();
        let targets = Targets::new(labels, discrete);
        let config = GrowConfig {
            max_depth: params.max_depth,
            min_sample_count: params.min_sample_count,
            use_surrogates: false,
            search: SearchConfig {
                categorical: discrete,
                max_categories: params.max_categories,
            },
            max_features: Some(params.features_per_split(n_features)),
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees)
            .map(|_| {
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                let nodes = grow(features, &targets, rows, &config, Some(&mut tree_rng));
                DecisionTree::from_parts(nodes, targets.task().clone(), n_features)
            })
            .collect::<Vec<_>>();

        debug!(
            trees = trees.len(),
            features_per_split = ?config.max_features,
            mean_leaves = trees.iter().map(DecisionTree::leaf_count).sum::<usize>() as f64 / trees.len() as f64,
            "grew random forest"
        );
        Ok(Self {
            trees,
            task: targets.task().clone(),
            n_features,
        })
    }

    /// Mean of the tree outputs, or the most voted label (ties to the smallest)
    pub fn predict(&self, row: &[f64]) -> f64 {
        match self.task {
            Task::Regression => self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64,
            Task::Classification { .. } => {
                let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
                for tree in &self.trees {
                    *votes.entry(tree.predict(row) as i64).or_default() += 1;
                }
                votes
                    .into_iter()
                    .fold((0i64, 0usize), |best, (label, count)| if count > best.1 { (label, count) } else { best })
                    .0 as f64
            }
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self.task, Task::Classification { .. })
    }
}
