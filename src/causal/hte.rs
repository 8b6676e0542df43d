//! Heterogeneous treatment effects with a T-learner.
//!
//! One regressor is trained on control rows and another on treated rows;
//! the CATE of every row is the difference of their predictions.

use crate::data::{Dataset, VariableType};
use crate::error::{ExperimentError, Result};
use crate::model::{RandomForestRegressor, Regressor};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Name of the column added by [`HteLearner::fit_predict`].
pub const CATE_COL: &str = "cate";

/// Highest- and lowest-CATE groups of one categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInsight {
    pub feature: String,
    pub best_group: String,
    pub best_effect: f64,
    pub worst_group: String,
    pub worst_effect: f64,
}

/// T-learner over a caller-chosen regressor.
///
/// The regressor is used as a template: each arm is fitted on its own clone.
#[derive(Debug, Clone, Default)]
pub struct HteLearner<M = RandomForestRegressor> {
    model: M,
}

impl<M: Regressor + Clone> HteLearner<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Fit both arms and return a copy of `dataset` with a `cate` column.
    ///
    /// Treatment must be coded 0 (control) / 1 (treated); rows with any
    /// other treatment value or a missing outcome are not used for training
    /// but still receive a prediction. Categorical features are expanded to
    /// indicator columns (first level dropped).
    ///
    /// # Errors
    /// Missing columns, missing feature values, or an empty arm.
    pub fn fit_predict(
        &self,
        dataset: &Dataset,
        feature_cols: &[&str],
        treatment_col: &str,
        outcome_col: &str,
    ) -> Result<Dataset> {
        dataset.require_columns(feature_cols)?;
        dataset.require_columns(&[treatment_col, outcome_col])?;
        if feature_cols.is_empty() {
            return Err(ExperimentError::InvalidParameter("no feature columns given".to_string()));
        }

        let x = feature_matrix(dataset, feature_cols)?;
        let treatment = dataset.numeric(treatment_col)?;
        let outcome = dataset.numeric(outcome_col)?;

        let arm_rows = |code: f64| -> Vec<usize> {
            (0..dataset.n_rows())
                .filter(|&i| treatment[i] == Some(code) && outcome[i].is_some())
                .collect()
        };
        let control_rows = arm_rows(0.0);
        let treated_rows = arm_rows(1.0);
        if control_rows.is_empty() || treated_rows.is_empty() {
            return Err(ExperimentError::EmptyData(
                "Both treatment and control groups must be present".to_string(),
            ));
        }
        debug!(
            control = control_rows.len(),
            treated = treated_rows.len(),
            features = x.ncols(),
            "fitting T-learner"
        );

        let fit_arm = |rows: &[usize]| -> Result<M> {
            let xs = x.select_rows(rows.iter());
            let ys: Vec<f64> = rows.iter().filter_map(|&i| outcome[i]).collect();
            let mut model = self.model.clone();
            model.fit(&xs, &ys)?;
            Ok(model)
        };
        let m0 = fit_arm(&control_rows)?;
        let m1 = fit_arm(&treated_rows)?;

        let cate: Vec<f64> = m1
            .predict(&x)?
            .into_iter()
            .zip(m0.predict(&x)?)
            .map(|(t, c)| t - c)
            .collect();

        dataset.clone().with_continuous(CATE_COL, cate)
    }
}

/// Numeric design from feature columns; categorical columns become
/// indicators of every level but the first seen.
fn feature_matrix(dataset: &Dataset, feature_cols: &[&str]) -> Result<DMatrix<f64>> {
    let n = dataset.n_rows();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for &col in feature_cols {
        match dataset.column_type(col) {
            Some(VariableType::Categorical) => {
                let labels = dataset.labels(col)?;
                let levels = dataset.distinct(col)?;
                if labels.iter().any(Option::is_none) {
                    return Err(missing_feature(col));
                }
                for level in levels.iter().skip(1) {
                    columns.push(
                        labels
                            .iter()
                            .map(|l| if l.as_deref() == Some(level.as_str()) { 1.0 } else { 0.0 })
                            .collect(),
                    );
                }
            }
            _ => {
                let values = dataset.numeric(col)?;
                let complete: Option<Vec<f64>> = values.into_iter().collect();
                columns.push(complete.ok_or_else(|| missing_feature(col))?);
            }
        }
    }

    Ok(DMatrix::from_fn(n, columns.len(), |i, j| columns[j][i]))
}

fn missing_feature(col: &str) -> ExperimentError {
    ExperimentError::InvalidParameter(format!("feature column '{}' has missing values", col))
}

/// Report the highest- and lowest-average CATE group of every categorical
/// column.
///
/// A heuristic scan for heterogeneity, not a formal test.
pub fn find_sensitive_segments(dataset: &Dataset, cate_col: &str) -> Result<Vec<SegmentInsight>> {
    let cate = dataset.numeric(cate_col)?;
    let mut insights = Vec::new();

    for col in dataset.column_names() {
        if dataset.column_type(col) != Some(VariableType::Categorical) {
            continue;
        }
        let labels = dataset.labels(col)?;
        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        for (label, value) in labels.into_iter().zip(&cate) {
            if let (Some(label), Some(v)) = (label, value) {
                let entry = sums.entry(label).or_insert((0.0, 0));
                entry.0 += v;
                entry.1 += 1;
            }
        }

        let mut means: Vec<(String, f64)> = dataset
            .distinct(col)?
            .into_iter()
            .filter_map(|g| sums.get(&g).map(|(s, n)| (g.clone(), s / *n as f64)))
            .collect();
        means.sort_by(|a, b| b.1.total_cmp(&a.1));

        if let (Some(best), Some(worst)) = (means.first(), means.last()) {
            insights.push(SegmentInsight {
                feature: col.clone(),
                best_group: best.0.clone(),
                best_effect: best.1,
                worst_group: worst.0.clone(),
                worst_effect: worst.1,
            });
        }
    }

    Ok(insights)
}
