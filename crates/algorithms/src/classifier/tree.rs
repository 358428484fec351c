//! CART decision tree
//!
//! Nodes live in a flat arena indexed by `usize`, root at 0. A tree grown in
//! discrete mode is a classification tree over categorical features (Gini
//! impurity, majority class in each leaf); otherwise it is a regression tree
//! on the numeric label (squared error, mean in each leaf).
//!
//! Pruning is non-destructive: every internal node records the complexity
//! parameter at which it collapses into a leaf, and the tree predicts with a
//! selected `active_alpha`. See [`super::prune`].

use dtclassifier_core::{Error, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prune;
use super::split::{best_split_on, find_surrogates, Response, SearchConfig, Split};

/// Parameters for [`DecisionTree::fit`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    /// Nodes at this depth are leaves (root has depth 0)
    pub max_depth: usize,
    /// Nodes with fewer rows are not split
    pub min_sample_count: usize,
    /// Compute surrogate splits for rows missing the primary feature
    pub use_surrogates: bool,
    /// Above this many distinct values a feature is split as ordered
    pub max_categories: usize,
    /// Cross-validation folds for pruning; 0 or 1 disables pruning
    pub cv_folds: usize,
    /// Prefer the smallest tree within one standard error of the best
    pub use_1se_rule: bool,
    /// Physically remove pruned branches
    pub truncate_pruned: bool,
    /// Seed for the fold assignment
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 8,
            min_sample_count: 10,
            use_surrogates: true,
            max_categories: 10,
            cv_folds: 10,
            use_1se_rule: false,
            truncate_pruned: false,
            seed: 0,
        }
    }
}

/// What a tree predicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Task {
    Regression,
    /// Sorted distinct labels; leaf values are labels
    Classification { classes: Vec<i32> },
}

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Prediction when this node acts as a leaf
    pub value: f64,
    /// Resubstitution risk: squared error or misclassified rows
    pub risk: f64,
    pub samples: usize,
    pub depth: usize,
    pub split: Option<Split>,
    /// Ranked fallbacks for rows missing the split feature
    pub surrogates: Vec<Split>,
    /// Direction for rows no split can route
    pub default_left: bool,
    /// `(left, right)` arena indices
    pub children: Option<(usize, usize)>,
    /// Complexity parameter at which this node becomes a leaf
    pub prune_alpha: Option<f64>,
}

impl Node {
    /// Direction of a row through this node's split
    pub fn routes_left(&self, row: &[f64]) -> bool {
        let value_of = |s: &Split| row.get(s.feature).copied().unwrap_or(f64::NAN);
        self.split
            .iter()
            .chain(self.surrogates.iter())
            .find_map(|s| s.goes_left(value_of(s)))
            .unwrap_or(self.default_left)
    }
}

/// Settings shared by single trees and forest members while growing
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowConfig {
    pub max_depth: usize,
    pub min_sample_count: usize,
    pub use_surrogates: bool,
    pub search: SearchConfig,
    /// Random feature subset size per node; `None` tries every feature
    pub max_features: Option<usize>,
}

impl GrowConfig {
    pub fn from_params(params: &TreeParams, discrete: bool) -> Self {
        Self {
            max_depth: params.max_depth,
            min_sample_count: params.min_sample_count,
            use_surrogates: params.use_surrogates,
            search: SearchConfig {
                categorical: discrete,
                max_categories: params.max_categories,
            },
            max_features: None,
        }
    }
}

/// Training targets in the form the split search needs
pub(crate) struct Targets {
    task: Task,
    values: Vec<f64>,
    class_of: Vec<usize>,
}

impl Targets {
    pub fn new(labels: &[i32], discrete: bool) -> Self {
        if discrete {
            let mut classes = labels.to_vec();
            classes.sort_unstable();
            classes.dedup();
            let class_of = labels
                .iter()
                .map(|l| classes.binary_search(l).unwrap_or(0))
                .collect();
            Self {
                task: Task::Classification { classes },
                values: Vec::new(),
                class_of,
            }
        } else {
            Self {
                task: Task::Regression,
                values: labels.iter().map(|&l| l as f64).collect(),
                class_of: Vec::new(),
            }
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn response(&self) -> Response<'_> {
        match &self.task {
            Task::Regression => Response::Regression(&self.values),
            Task::Classification { classes } => Response::Classification {
                class_of: &self.class_of,
                n_classes: classes.len(),
            },
        }
    }

    /// Loss of predicting `prediction` for training row `row`
    pub fn loss(&self, row: usize, prediction: f64) -> f64 {
        match &self.task {
            Task::Regression => (prediction - self.values[row]).powi(2),
            Task::Classification { classes } => {
                if classes[self.class_of[row]] as f64 == prediction {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

/// Grow an unpruned tree on `rows`
pub(crate) fn grow(
    x: ArrayView2<'_, f64>,
    targets: &Targets,
    rows: Vec<usize>,
    config: &GrowConfig,
    rng: Option<&mut StdRng>,
) -> Vec<Node> {
    let mut grower = Grower {
        x,
        response: targets.response(),
        task: targets.task(),
        config,
        rng,
        nodes: Vec::new(),
    };
    grower.grow_node(rows, 0);
    grower.nodes
}

struct Grower<'x, 'a, 'r> {
    x: ArrayView2<'x, f64>,
    response: Response<'a>,
    task: &'a Task,
    config: &'a GrowConfig,
    rng: Option<&'r mut StdRng>,
    nodes: Vec<Node>,
}

impl Grower<'_, '_, '_> {
    fn grow_node(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let stats = self.response.node_stats(&rows);
        let value = match self.task {
            Task::Regression => stats.value,
            Task::Classification { classes } => classes[stats.value as usize] as f64,
        };
        let id = self.nodes.len();
        self.nodes.push(Node {
            value,
            risk: stats.risk,
            samples: rows.len(),
            depth,
            split: None,
            surrogates: Vec::new(),
            default_left: true,
            children: None,
            prune_alpha: None,
        });

        if depth >= self.config.max_depth || rows.len() < self.config.min_sample_count || stats.risk <= 0.0 {
            return id;
        }

        let Some(split) = self.best_split(&rows) else {
            return id;
        };

        let directions: Vec<(usize, bool)> = rows
            .iter()
            .filter_map(|&r| split.goes_left(self.x[[r, split.feature]]).map(|left| (r, left)))
            .collect();
        let n_left = directions.iter().filter(|d| d.1).count();
        let default_left = n_left * 2 >= directions.len();
        let surrogates = if self.config.use_surrogates {
            find_surrogates(&self.x, &directions, split.feature, self.config.search)
        } else {
            Vec::new()
        };

        let node = &mut self.nodes[id];
        node.split = Some(split);
        node.surrogates = surrogates;
        node.default_left = default_left;

        let (left, right): (Vec<usize>, Vec<usize>) = {
            let node = &self.nodes[id];
            let x = &self.x;
            rows.iter().partition(|&&r| {
                let row: Vec<f64> = x.row(r).to_vec();
                node.routes_left(&row)
            })
        };
        if left.is_empty() || right.is_empty() {
            let node = &mut self.nodes[id];
            node.split = None;
            node.surrogates.clear();
            return id;
        }

        let l = self.grow_node(left, depth + 1);
        let r = self.grow_node(right, depth + 1);
        self.nodes[id].children = Some((l, r));
        id
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Split> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let (Some(k), Some(rng)) = (self.config.max_features, self.rng.as_deref_mut()) {
            features.shuffle(rng);
            features.truncate(k.clamp(1, n_features));
            features.sort_unstable();
        }

        let mut best: Option<Split> = None;
        for f in features {
            if let Some(split) = best_split_on(&self.x, &self.response, rows, f, self.config.search) {
                if best.as_ref().map_or(true, |b| split.quality > b.quality) {
                    best = Some(split);
                }
            }
        }
        best
    }
}

/// A trained CART tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    task: Task,
    n_features: usize,
    /// Nodes with `prune_alpha <= active_alpha` act as leaves
    active_alpha: Option<f64>,
}

impl DecisionTree {
    /// Grow a tree on `features` (rows × features) and `labels`, then prune it
    /// by cross-validation when `params.cv_folds > 1`
    pub fn fit(features: ArrayView2<'_, f64>, labels: &[i32], params: &TreeParams, discrete: bool) -> Result<Self> {
        validate_inputs(features, labels)?;

        let targets = Targets::new(labels, discrete);
        let config = GrowConfig::from_params(params, discrete);
        let rows: Vec<usize> = (0..labels.len()).collect();
        let mut nodes = grow(features, &targets, rows, &config, None);
        let alphas = prune::assign_prune_alphas(&mut nodes);

        let mut tree = Self {
            nodes,
            task: targets.task().clone(),
            n_features: features.ncols(),
            active_alpha: None,
        };

        if params.cv_folds > 1 && !alphas.is_empty() {
            tree.active_alpha = prune::select_alpha(features, &targets, &config, params, &alphas);
            if params.truncate_pruned {
                if let Some(alpha) = tree.active_alpha {
                    tree.nodes = prune::truncate(&tree.nodes, alpha);
                    tree.active_alpha = None;
                }
            }
        }

        debug!(
            nodes = tree.nodes.len(),
            leaves = tree.leaf_count(),
            depth = tree.depth(),
            alpha = ?tree.active_alpha,
            "grew decision tree"
        );
        Ok(tree)
    }

    pub(crate) fn from_parts(nodes: Vec<Node>, task: Task, n_features: usize) -> Self {
        Self {
            nodes,
            task,
            n_features,
            active_alpha: None,
        }
    }

    /// Predicted value for one row; values beyond the row length count as missing
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.nodes[self.leaf_for(row, self.active_alpha)].value
    }

    pub(crate) fn leaf_for(&self, row: &[f64], alpha: Option<f64>) -> usize {
        let mut id = 0;
        loop {
            let node = &self.nodes[id];
            let Some((left, right)) = node.children else {
                return id;
            };
            if let (Some(active), Some(p)) = (alpha, node.prune_alpha) {
                if p <= active {
                    return id;
                }
            }
            id = if node.routes_left(row) { left } else { right };
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn active_alpha(&self) -> Option<f64> {
        self.active_alpha
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self.task, Task::Classification { .. })
    }

    /// Leaves of the pruned tree
    pub fn leaf_count(&self) -> usize {
        self.count_active(0).1
    }

    /// Depth of the pruned tree
    pub fn depth(&self) -> usize {
        self.count_active(0).0
    }

    fn count_active(&self, id: usize) -> (usize, usize) {
        let node = &self.nodes[id];
        let pruned = matches!((self.active_alpha, node.prune_alpha), (Some(a), Some(p)) if p <= a);
        match node.children {
            Some((l, r)) if !pruned => {
                let (dl, nl) = self.count_active(l);
                let (dr, nr) = self.count_active(r);
                (1 + dl.max(dr), nl + nr)
            }
            _ => (0, 1),
        }
    }
}

pub(crate) fn validate_inputs(features: ArrayView2<'_, f64>, labels: &[i32]) -> Result<()> {
    if features.nrows() != labels.len() {
        return Err(Error::SizeMismatch {
            er: labels.len(),
            ec: features.ncols(),
            ar: features.nrows(),
            ac: features.ncols(),
        });
    }
    if labels.is_empty() {
        return Err(Error::Algorithm("cannot train on an empty feature matrix".into()));
    }
    if features.ncols() == 0 {
        return Err(Error::Algorithm("feature matrix has no columns".into()));
    }
    Ok(())
}
