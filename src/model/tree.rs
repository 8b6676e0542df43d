//! Regression trees and a bagged tree ensemble.
//!
//! Trees are grown with the squared-error criterion until leaves are pure
//! or hit the size limits; split thresholds are midpoints between adjacent
//! distinct feature values.

use crate::error::{ExperimentError, Result};
use crate::model::Regressor;
use crate::random::seeded_rng;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Depth ceiling applied when `max_depth` is `None`.
pub const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A CART regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    /// Maximum depth (`None` = [`MAX_TREE_DEPTH`]).
    pub max_depth: Option<usize>,
    /// Minimum rows required to split a node.
    pub min_samples_split: usize,
    /// Minimum rows in each child.
    pub min_samples_leaf: usize,
    nodes: Vec<Node>,
    n_features: usize,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            nodes: Vec::new(),
            n_features: 0,
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n.max(1);
        self
    }

    /// Number of nodes in the fitted tree.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the fitted tree; a lone leaf has depth 0.
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = self.nodes[id] {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        deepest
    }

    /// Fit on the given row indices of `x` (repeats allowed).
    pub fn fit_indices(&mut self, x: &DMatrix<f64>, y: &[f64], rows: &[usize]) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(ExperimentError::DimensionMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        if rows.is_empty() {
            return Err(ExperimentError::EmptyData("no rows to fit a tree on".to_string()));
        }
        self.nodes.clear();
        self.n_features = x.ncols();
        let mut rows = rows.to_vec();
        self.grow(x, y, &mut rows, 0);
        Ok(())
    }

    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, x: &DMatrix<f64>, y: &[f64], rows: &mut [usize], depth: usize) -> usize {
        let n = rows.len();
        let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        let depth_reached = depth >= self.max_depth.unwrap_or(MAX_TREE_DEPTH);
        if depth_reached || n < self.min_samples_split || n < 2 * self.min_samples_leaf {
            return id;
        }
        let pure = rows.iter().all(|&i| y[i] == y[rows[0]]);
        if pure {
            return id;
        }

        let Some(split) = self.best_split(x, y, rows) else {
            return id;
        };

        let mut left: Vec<usize> = Vec::with_capacity(n);
        let mut right: Vec<usize> = Vec::with_capacity(n);
        for &i in rows.iter() {
            if x[(i, split.feature)] <= split.threshold {
                left.push(i);
            } else {
                right.push(i);
            }
        }

        let left_id = self.grow(x, y, &mut left, depth + 1);
        let right_id = self.grow(x, y, &mut right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    /// Split maximizing `S_l²/n_l + S_r²/n_r` (equivalent to minimizing SSE).
    fn best_split(&self, x: &DMatrix<f64>, y: &[f64], rows: &mut [usize]) -> Option<BestSplit> {
        let n = rows.len();
        let total: f64 = rows.iter().map(|&i| y[i]).sum();
        let parent = total * total / n as f64;
        let leaf = self.min_samples_leaf;
        let mut best: Option<BestSplit> = None;

        for feature in 0..self.n_features {
            rows.sort_by(|&a, &b| x[(a, feature)].total_cmp(&x[(b, feature)]));
            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += y[rows[k]];
                let here = x[(rows[k], feature)];
                let next = x[(rows[k + 1], feature)];
                let n_left = k + 1;
                let n_right = n - n_left;
                if here == next || n_left < leaf || n_right < leaf {
                    continue;
                }
                let right_sum = total - left_sum;
                let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                if score > parent + 1e-12 && best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        score,
                    });
                }
            }
        }
        best
    }

    /// Predict one row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn check_fitted(&self, x: &DMatrix<f64>) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ExperimentError::InvalidParameter("model has not been fitted".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(ExperimentError::DimensionMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(())
    }
}

fn rows_of(x: &DMatrix<f64>) -> impl Iterator<Item = Vec<f64>> + '_ {
    x.row_iter().map(|r| r.iter().copied().collect())
}

impl Regressor for RegressionTree {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> Result<()> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.fit_indices(x, y, &rows)
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        self.check_fitted(x)?;
        Ok(rows_of(x).map(|r| self.predict_row(&r)).collect())
    }
}

/// Bagged ensemble of regression trees on bootstrap resamples.
///
/// Every split considers all features. Tree `i` draws its bootstrap sample
/// from a generator seeded with `seed + i`, so seeded forests are
/// reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: Option<u64>,
    #[serde(skip)]
    trees: Vec<RegressionTree>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: None,
            trees: Vec::new(),
        }
    }
}

impl RandomForestRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn without_bootstrap(mut self) -> Self {
        self.bootstrap = false;
        self
    }

    /// Fitted trees.
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(ExperimentError::EmptyData("no rows to fit a forest on".to_string()));
        }

        let template = RegressionTree {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            ..RegressionTree::default()
        };

        let mut trees = Vec::with_capacity(self.n_estimators);
        for i in 0..self.n_estimators {
            let rows: Vec<usize> = if self.bootstrap {
                let mut rng = seeded_rng(self.seed.map(|s| s.wrapping_add(i as u64)));
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let mut tree = template.clone();
            tree.fit_indices(x, y, &rows)?;
            trees.push(tree);
        }
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        let Some(first) = self.trees.first() else {
            return Err(ExperimentError::InvalidParameter("model has not been fitted".to_string()));
        };
        first.check_fitted(x)?;
        let k = self.trees.len() as f64;
        Ok(rows_of(x)
            .map(|r| self.trees.iter().map(|t| t.predict_row(&r)).sum::<f64>() / k)
            .collect())
    }
}
