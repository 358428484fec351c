//! Split search for CART trees
//!
//! Impurity is the sum of squared errors for regression and `n * gini` for
//! classification; a split's quality is the impurity decrease it achieves.
//! Rows whose split feature is NaN take no part in the search.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Test applied at an internal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitRule {
    /// `x <= threshold` goes left
    Ordered { threshold: f64 },
    /// Listed categories (sorted) go left, everything else right
    Categorical { left: Vec<f64> },
}

/// A split on one feature; `inverted` swaps the two directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub feature: usize,
    pub rule: SplitRule,
    pub inverted: bool,
    /// Impurity decrease (primary splits) or agreement with the primary
    /// split (surrogates)
    pub quality: f64,
}

impl Split {
    /// Direction for a value; `None` when the value is missing
    pub fn goes_left(&self, value: f64) -> Option<bool> {
        if value.is_nan() {
            return None;
        }
        let left = match &self.rule {
            SplitRule::Ordered { threshold } => value <= *threshold,
            SplitRule::Categorical { left } => left.binary_search_by(|c| c.total_cmp(&value)).is_ok(),
        };
        Some(left != self.inverted)
    }
}

/// Training targets as seen by the split search
#[derive(Debug, Clone, Copy)]
pub(crate) enum Response<'a> {
    Regression(&'a [f64]),
    Classification { class_of: &'a [usize], n_classes: usize },
}

/// Prediction and resubstitution risk of a node
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeStats {
    /// Mean response, or index of the majority class
    pub value: f64,
    /// Sum of squared errors, or number of misclassified rows
    pub risk: f64,
}

impl<'a> Response<'a> {
    pub fn n_classes(&self) -> usize {
        match self {
            Response::Regression(_) => 0,
            Response::Classification { n_classes, .. } => *n_classes,
        }
    }

    pub fn node_stats(&self, rows: &[usize]) -> NodeStats {
        match self {
            Response::Regression(y) => {
                if rows.is_empty() {
                    return NodeStats { value: 0.0, risk: 0.0 };
                }
                let mean = rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64;
                let risk = rows.iter().map(|&r| (y[r] - mean).powi(2)).sum();
                NodeStats { value: mean, risk }
            }
            Response::Classification { class_of, n_classes } => {
                let mut counts = vec![0usize; *n_classes];
                for &r in rows {
                    counts[class_of[r]] += 1;
                }
                // ties go to the lowest class index
                let (best, best_count) = counts
                    .iter()
                    .enumerate()
                    .fold((0, 0), |acc, (k, &c)| if c > acc.1 { (k, c) } else { acc });
                NodeStats {
                    value: best as f64,
                    risk: (rows.len() - best_count) as f64,
                }
            }
        }
    }

    fn empty_acc(&self) -> Acc {
        match self {
            Response::Regression(_) => Acc::Reg { n: 0.0, sum: 0.0, sumsq: 0.0 },
            Response::Classification { n_classes, .. } => Acc::Cls {
                n: 0.0,
                counts: vec![0.0; *n_classes],
            },
        }
    }
}

/// Running impurity statistics of a set of rows
#[derive(Debug, Clone)]
enum Acc {
    Reg { n: f64, sum: f64, sumsq: f64 },
    Cls { n: f64, counts: Vec<f64> },
}

impl Acc {
    fn add(&mut self, response: &Response<'_>, row: usize, sign: f64) {
        match (self, response) {
            (Acc::Reg { n, sum, sumsq }, Response::Regression(y)) => {
                *n += sign;
                *sum += sign * y[row];
                *sumsq += sign * y[row] * y[row];
            }
            (Acc::Cls { n, counts }, Response::Classification { class_of, .. }) => {
                *n += sign;
                counts[class_of[row]] += sign;
            }
            _ => {}
        }
    }

    fn n(&self) -> f64 {
        match self {
            Acc::Reg { n, .. } | Acc::Cls { n, .. } => *n,
        }
    }

    fn impurity(&self) -> f64 {
        match self {
            Acc::Reg { n, sum, sumsq } => {
                if *n <= 0.0 {
                    0.0
                } else {
                    (sumsq - sum * sum / n).max(0.0)
                }
            }
            Acc::Cls { n, counts } => {
                if *n <= 0.0 {
                    0.0
                } else {
                    n - counts.iter().map(|c| c * c).sum::<f64>() / n
                }
            }
        }
    }

    /// Score used to order categories: mean response, or share of class 1
    fn order_key(&self) -> f64 {
        match self {
            Acc::Reg { n, sum, .. } => sum / n,
            Acc::Cls { n, counts } => counts.get(1).copied().unwrap_or(0.0) / n,
        }
    }

    fn merge(&mut self, other: &Acc) {
        match (self, other) {
            (Acc::Reg { n, sum, sumsq }, Acc::Reg { n: n2, sum: s2, sumsq: q2 }) => {
                *n += n2;
                *sum += s2;
                *sumsq += q2;
            }
            (Acc::Cls { n, counts }, Acc::Cls { n: n2, counts: c2 }) => {
                *n += n2;
                for (c, o) in counts.iter_mut().zip(c2) {
                    *c += o;
                }
            }
            _ => {}
        }
    }
}

/// Knobs of the split search
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchConfig {
    /// Treat features as categorical where they have few enough categories
    pub categorical: bool,
    pub max_categories: usize,
}

/// Non-missing `(value, row)` pairs of a feature, sorted by value
fn sorted_pairs(x: &ArrayView2<'_, f64>, rows: &[usize], feature: usize) -> Vec<(f64, usize)> {
    let mut pairs: Vec<(f64, usize)> = rows
        .iter()
        .map(|&r| (x[[r, feature]], r))
        .filter(|(v, _)| !v.is_nan())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    pairs
}

/// Distinct values of sorted pairs with their row ranges
fn category_runs(pairs: &[(f64, usize)]) -> Vec<(f64, std::ops::Range<usize>)> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=pairs.len() {
        if i == pairs.len() || pairs[i].0 != pairs[start].0 {
            runs.push((pairs[start].0, start..i));
            start = i;
        }
    }
    runs
}

fn midpoint(a: f64, b: f64) -> f64 {
    let mid = a + (b - a) / 2.0;
    if mid < b {
        mid
    } else {
        a
    }
}

/// Best split of `rows` on one feature, if any improves impurity
pub(crate) fn best_split_on(
    x: &ArrayView2<'_, f64>,
    response: &Response<'_>,
    rows: &[usize],
    feature: usize,
    config: SearchConfig,
) -> Option<Split> {
    let pairs = sorted_pairs(x, rows, feature);
    if pairs.len() < 2 {
        return None;
    }
    let runs = category_runs(&pairs);
    if runs.len() < 2 {
        return None;
    }

    if config.categorical && runs.len() <= config.max_categories {
        categorical_split(response, &pairs, &runs, feature)
    } else {
        ordered_split(response, &pairs, feature)
    }
}

fn ordered_split(response: &Response<'_>, pairs: &[(f64, usize)], feature: usize) -> Option<Split> {
    let mut total = response.empty_acc();
    for &(_, r) in pairs {
        total.add(response, r, 1.0);
    }
    let parent = total.impurity();

    let mut left = response.empty_acc();
    let mut right = total;
    let mut best: Option<(f64, f64)> = None;
    for i in 0..pairs.len() - 1 {
        left.add(response, pairs[i].1, 1.0);
        right.add(response, pairs[i].1, -1.0);
        if pairs[i].0 == pairs[i + 1].0 {
            continue;
        }
        let gain = parent - left.impurity() - right.impurity();
        if best.map_or(true, |(g, _)| gain > g) {
            best = Some((gain, midpoint(pairs[i].0, pairs[i + 1].0)));
        }
    }

    best.filter(|(gain, _)| *gain > 0.0).map(|(gain, threshold)| Split {
        feature,
        rule: SplitRule::Ordered { threshold },
        inverted: false,
        quality: gain,
    })
}

fn categorical_split(
    response: &Response<'_>,
    pairs: &[(f64, usize)],
    runs: &[(f64, std::ops::Range<usize>)],
    feature: usize,
) -> Option<Split> {
    let groups: Vec<(f64, Acc)> = runs
        .iter()
        .map(|(value, range)| {
            let mut acc = response.empty_acc();
            for &(_, r) in &pairs[range.clone()] {
                acc.add(response, r, 1.0);
            }
            (*value, acc)
        })
        .collect();

    let mut total = response.empty_acc();
    for (_, acc) in &groups {
        total.merge(acc);
    }
    let parent = total.impurity();

    let score = |mask: &dyn Fn(usize) -> bool| -> f64 {
        let mut left = response.empty_acc();
        let mut right = response.empty_acc();
        for (i, (_, acc)) in groups.iter().enumerate() {
            if mask(i) {
                left.merge(acc);
            } else {
                right.merge(acc);
            }
        }
        if left.n() == 0.0 || right.n() == 0.0 {
            return f64::NEG_INFINITY;
        }
        parent - left.impurity() - right.impurity()
    };

    let m = groups.len();
    let mut best: Option<(f64, Vec<f64>)> = None;

    if response.n_classes() <= 2 {
        // categories ordered by response reduce the search to m - 1 cuts
        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by(|&a, &b| {
            groups[a]
                .1
                .order_key()
                .partial_cmp(&groups[b].1.order_key())
                .unwrap_or(Ordering::Equal)
                .then(groups[a].0.total_cmp(&groups[b].0))
        });
        for cut in 1..m {
            let left_set = &order[..cut];
            let gain = score(&|i| left_set.contains(&i));
            if best.as_ref().map_or(true, |(g, _)| gain > *g) {
                best = Some((gain, left_set.iter().map(|&i| groups[i].0).collect()));
            }
        }
    } else {
        // every partition once: the last category always goes right
        for mask in 1u32..(1u32 << (m - 1)) {
            let gain = score(&|i| mask & (1 << i) != 0);
            if best.as_ref().map_or(true, |(g, _)| gain > *g) {
                let left = (0..m).filter(|&i| mask & (1 << i) != 0).map(|i| groups[i].0).collect();
                best = Some((gain, left));
            }
        }
    }

    best.filter(|(gain, _)| *gain > 0.0).map(|(gain, mut left)| {
        left.sort_by(f64::total_cmp);
        Split {
            feature,
            rule: SplitRule::Categorical { left },
            inverted: false,
            quality: gain,
        }
    })
}

/// Surrogate splits for a primary split, best first.
///
/// `directions` holds `(row, goes_left)` for the rows the primary split could
/// route. A surrogate is kept only when it agrees with the primary split on
/// more rows than simply sending everything the majority way.
pub(crate) fn find_surrogates(
    x: &ArrayView2<'_, f64>,
    directions: &[(usize, bool)],
    primary: usize,
    config: SearchConfig,
) -> Vec<Split> {
    let mut surrogates = Vec::new();
    for feature in 0..x.ncols() {
        if feature == primary {
            continue;
        }
        let mut pairs: Vec<(f64, bool)> = directions
            .iter()
            .map(|&(r, left)| (x[[r, feature]], left))
            .filter(|(v, _)| !v.is_nan())
            .collect();
        if pairs.len() < 2 {
            continue;
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let n_left = pairs.iter().filter(|p| p.1).count();
        let baseline = n_left.max(n - n_left);

        let distinct = 1 + pairs.windows(2).filter(|w| w[0].0 != w[1].0).count();
        let candidate = if config.categorical && distinct <= config.max_categories {
            categorical_surrogate(&pairs, feature)
        } else {
            ordered_surrogate(&pairs, feature)
        };

        if let Some((agree, mut split)) = candidate {
            if agree > baseline {
                split.quality = agree as f64 / n as f64;
                surrogates.push(split);
            }
        }
    }
    surrogates.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
    surrogates
}

fn ordered_surrogate(pairs: &[(f64, bool)], feature: usize) -> Option<(usize, Split)> {
    let n = pairs.len();
    // threshold below every value: all rows go right
    let mut agree = pairs.iter().filter(|p| !p.1).count() as i64;
    let mut best: Option<(usize, f64, bool)> = None;
    for i in 0..n - 1 {
        agree += if pairs[i].1 { 1 } else { -1 };
        if pairs[i].0 == pairs[i + 1].0 {
            continue;
        }
        let straight = agree as usize;
        let (count, inverted) = if straight >= n - straight {
            (straight, false)
        } else {
            (n - straight, true)
        };
        if best.map_or(true, |(c, _, _)| count > c) {
            best = Some((count, midpoint(pairs[i].0, pairs[i + 1].0), inverted));
        }
    }
    best.map(|(count, threshold, inverted)| {
        (
            count,
            Split {
                feature,
                rule: SplitRule::Ordered { threshold },
                inverted,
                quality: 0.0,
            },
        )
    })
}

fn categorical_surrogate(pairs: &[(f64, bool)], feature: usize) -> Option<(usize, Split)> {
    let mut left = Vec::new();
    let mut agree = 0;
    let mut categories = 0;
    let mut start = 0;
    for i in 1..=pairs.len() {
        if i < pairs.len() && pairs[i].0 == pairs[start].0 {
            continue;
        }
        let run = &pairs[start..i];
        let to_left = run.iter().filter(|p| p.1).count();
        let to_right = run.len() - to_left;
        if to_left > to_right {
            left.push(pairs[start].0);
        }
        agree += to_left.max(to_right);
        categories += 1;
        start = i;
    }
    if left.is_empty() || left.len() == categories {
        return None;
    }
    Some((
        agree,
        Split {
            feature,
            rule: SplitRule::Categorical { left },
            inverted: false,
            quality: 0.0,
        },
    ))
}
