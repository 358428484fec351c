//! Minimal cost-complexity pruning
//!
//! For an internal node `t` with subtree `T_t`, the weakest-link strength is
//! `g(t) = (R(t) - R(T_t)) / (|leaves(T_t)| - 1)`. Repeatedly collapsing the
//! nodes with the smallest `g` yields an increasing alpha sequence and a
//! nested family of subtrees; each collapsed node records its alpha.
//!
//! The alpha used for prediction is chosen by k-fold cross-validation over the
//! geometric midpoints of consecutive alphas, optionally with the one
//! standard error rule.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use super::tree::{grow, DecisionTree, GrowConfig, Node, Targets, TreeParams};

/// Record on every internal node the alpha at which it collapses.
///
/// Returns the distinct alphas in increasing order; empty for a single leaf.
pub(crate) fn assign_prune_alphas(nodes: &mut [Node]) -> Vec<f64> {
    let n = nodes.len();
    let mut collapsed = vec![false; n];
    for node in nodes.iter_mut() {
        node.prune_alpha = None;
    }

    let mut alphas = Vec::new();
    while !nodes.is_empty() && nodes[0].children.is_some() && !collapsed[0] {
        let mut g = vec![f64::INFINITY; n];
        subtree_risk(nodes, &collapsed, 0, &mut g);

        let weakest = g.iter().copied().fold(f64::INFINITY, f64::min);
        if !weakest.is_finite() {
            break;
        }
        let alpha = weakest.max(alphas.last().copied().unwrap_or(0.0));
        let tolerance = 1e-12 * alpha.abs().max(1.0);
        for id in 0..n {
            if g[id] <= weakest + tolerance {
                collapse(nodes, &mut collapsed, id, alpha);
            }
        }
        alphas.push(alpha);
    }
    alphas.dedup();
    alphas
}

/// `(R(T_t), |leaves(T_t)|)` over the uncollapsed subtree, filling `g`
fn subtree_risk(nodes: &[Node], collapsed: &[bool], id: usize, g: &mut [f64]) -> (f64, usize) {
    let node = &nodes[id];
    match node.children {
        Some((l, r)) if !collapsed[id] => {
            let (rl, nl) = subtree_risk(nodes, collapsed, l, g);
            let (rr, nr) = subtree_risk(nodes, collapsed, r, g);
            let risk = rl + rr;
            let leaves = nl + nr;
            g[id] = (node.risk - risk) / (leaves - 1) as f64;
            (risk, leaves)
        }
        _ => (node.risk, 1),
    }
}

fn collapse(nodes: &mut [Node], collapsed: &mut [bool], id: usize, alpha: f64) {
    if collapsed[id] {
        return;
    }
    let Some((l, r)) = nodes[id].children else {
        return;
    };
    collapsed[id] = true;
    nodes[id].prune_alpha = Some(alpha);
    collapse(nodes, collapsed, l, alpha);
    collapse(nodes, collapsed, r, alpha);
}

/// Alpha to prune at, or `None` when the full tree cross-validates best
pub(crate) fn select_alpha(
    x: ArrayView2<'_, f64>,
    targets: &Targets,
    config: &GrowConfig,
    params: &TreeParams,
    alphas: &[f64],
) -> Option<f64> {
    let n = x.nrows();
    let folds = params.cv_folds.min(n);
    if folds < 2 || alphas.is_empty() {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(params.seed));
    let mut fold_of = vec![0; n];
    for (i, &row) in order.iter().enumerate() {
        fold_of[row] = i % folds;
    }

    // candidate k = 0 is the full tree, k = K the root alone
    let k_max = alphas.len();
    let candidates: Vec<Option<f64>> = (0..=k_max)
        .map(|k| match k {
            0 => None,
            k if k == k_max => Some(f64::INFINITY),
            k => Some((alphas[k - 1] * alphas[k]).sqrt()),
        })
        .collect();

    let mut sum = vec![0.0; k_max + 1];
    let mut sum_sq = vec![0.0; k_max + 1];
    for fold in 0..folds {
        let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|&r| fold_of[r] == fold);
        if train.is_empty() || test.is_empty() {
            continue;
        }
        let mut nodes = grow(x, targets, train, config, None);
        assign_prune_alphas(&mut nodes);
        let tree = DecisionTree::from_parts(nodes, targets.task().clone(), x.ncols());

        for &r in &test {
            let row = x.row(r).to_vec();
            for (k, beta) in candidates.iter().enumerate() {
                let prediction = tree.nodes()[tree.leaf_for(&row, *beta)].value;
                let loss = targets.loss(r, prediction);
                sum[k] += loss;
                sum_sq[k] += loss * loss;
            }
        }
    }

    let count = n as f64;
    let mean: Vec<f64> = sum.iter().map(|s| s / count).collect();
    let se: Vec<f64> = sum_sq
        .iter()
        .zip(&mean)
        .map(|(sq, m)| ((sq / count - m * m).max(0.0) / count).sqrt())
        .collect();

    // ties go to the smaller tree
    let best = (0..=k_max).fold(0, |b, k| if mean[k] <= mean[b] { k } else { b });
    let chosen = if params.use_1se_rule {
        let limit = mean[best] + se[best];
        (0..=k_max).rev().find(|&k| mean[k] <= limit).unwrap_or(best)
    } else {
        best
    };

    debug!(
        folds,
        candidates = k_max + 1,
        chosen,
        cv_error = mean[chosen],
        "cross-validated pruning"
    );
    match chosen {
        0 => None,
        k => Some(alphas[k - 1]),
    }
}

/// Copy of the arena without the branches pruned at `alpha`
pub(crate) fn truncate(nodes: &[Node], alpha: f64) -> Vec<Node> {
    let mut out = Vec::new();
    if !nodes.is_empty() {
        copy_subtree(nodes, 0, alpha, &mut out);
    }
    out
}

fn copy_subtree(nodes: &[Node], id: usize, alpha: f64, out: &mut Vec<Node>) -> usize {
    let node = &nodes[id];
    let new_id = out.len();
    let mut copy = node.clone();
    let pruned = node.prune_alpha.map_or(false, |p| p <= alpha);
    match node.children {
        Some((l, r)) if !pruned => {
            out.push(copy);
            let nl = copy_subtree(nodes, l, alpha, out);
            let nr = copy_subtree(nodes, r, alpha, out);
            out[new_id].children = Some((nl, nr));
        }
        _ => {
            copy.split = None;
            copy.surrogates.clear();
            copy.children = None;
            copy.prune_alpha = None;
            out.push(copy);
        }
    }
    new_id
}
