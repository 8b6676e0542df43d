//! Synthetic control method.
//!
//! The treated unit's pre-intervention outcomes are regressed on the control
//! units' outcomes; the fitted weights then extrapolate a counterfactual for
//! the post period.

use crate::causal::panel::{sorted_unique, time_points, TimePoint};
use crate::causal::CausalResult;
use crate::data::Dataset;
use crate::error::{ExperimentError, Result};
use crate::model::{fit_linear, Penalty};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Method name reported in results.
pub const SCM_METHOD: &str = "Synthetic Control Method";

/// Regression used to learn control-unit weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScmMethod {
    /// Unpenalized least squares.
    Ols,
    /// Ridge with α = 1.0.
    #[default]
    Ridge,
    /// Lasso with α = 0.1.
    Lasso,
}

impl ScmMethod {
    pub fn penalty(&self) -> Penalty {
        match self {
            ScmMethod::Ols => Penalty::None,
            ScmMethod::Ridge => Penalty::Ridge(1.0),
            ScmMethod::Lasso => Penalty::Lasso(0.1),
        }
    }
}

impl fmt::Display for ScmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScmMethod::Ols => "ols",
            ScmMethod::Ridge => "ridge",
            ScmMethod::Lasso => "lasso",
        })
    }
}

impl FromStr for ScmMethod {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ols" => Ok(ScmMethod::Ols),
            "ridge" => Ok(ScmMethod::Ridge),
            "lasso" => Ok(ScmMethod::Lasso),
            other => Err(ExperimentError::InvalidParameter(format!(
                "unknown SCM method '{}' (expected ols, ridge or lasso)",
                other
            ))),
        }
    }
}

/// Column roles and the intervention for a synthetic control fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticControl {
    pub unit_col: String,
    pub time_col: String,
    pub outcome_col: String,
    pub treated_unit: String,
    /// First time point of the post period (inclusive).
    pub intervention_time: TimePoint,
    #[serde(default)]
    pub method: ScmMethod,
}

/// Outcomes pivoted to time × unit.
struct Panel {
    times: Vec<TimePoint>,
    units: Vec<String>,
    values: DMatrix<f64>,
}

impl SyntheticControl {
    pub fn new(
        unit_col: &str,
        time_col: &str,
        outcome_col: &str,
        treated_unit: &str,
        intervention_time: impl Into<TimePoint>,
    ) -> Self {
        Self {
            unit_col: unit_col.to_string(),
            time_col: time_col.to_string(),
            outcome_col: outcome_col.to_string(),
            treated_unit: treated_unit.to_string(),
            intervention_time: intervention_time.into(),
            method: ScmMethod::default(),
        }
    }

    pub fn with_method(mut self, method: ScmMethod) -> Self {
        self.method = method;
        self
    }

    /// Build the synthetic counterfactual and estimate the post-period ATT.
    ///
    /// # Errors
    /// Missing columns, an unbalanced or duplicated panel, an unknown treated
    /// unit, no control units, or no pre- or post-intervention time points.
    pub fn fit(&self, dataset: &Dataset) -> Result<CausalResult> {
        let panel = self.pivot(dataset)?;

        let treated = panel
            .units
            .iter()
            .position(|u| *u == self.treated_unit)
            .ok_or_else(|| {
                ExperimentError::InvalidParameter(format!(
                    "treated unit '{}' not found in column '{}'",
                    self.treated_unit, self.unit_col
                ))
            })?;
        let controls: Vec<usize> = (0..panel.units.len()).filter(|&j| j != treated).collect();
        if controls.is_empty() {
            return Err(ExperimentError::EmptyData("no control units".to_string()));
        }

        let mut pre = Vec::new();
        let mut post = Vec::new();
        for (i, t) in panel.times.iter().enumerate() {
            if t.at_or_after(&self.intervention_time)? {
                post.push(i);
            } else {
                pre.push(i);
            }
        }
        if pre.is_empty() {
            return Err(ExperimentError::EmptyData(
                "No pre-intervention data available".to_string(),
            ));
        }
        if post.is_empty() {
            return Err(ExperimentError::EmptyData(
                "No post-intervention data available".to_string(),
            ));
        }

        let block = |rows: &[usize]| DMatrix::from_fn(rows.len(), controls.len(), |i, j| panel.values[(rows[i], controls[j])]);
        let outcome = |rows: &[usize]| -> Vec<f64> { rows.iter().map(|&i| panel.values[(i, treated)]).collect() };

        let x_pre = block(&pre);
        let y_pre = outcome(&pre);
        let fit = fit_linear(&x_pre, &y_pre, self.method.penalty())?;

        let synthetic_pre = fit.predict(&x_pre);
        let pre_rmse = (y_pre
            .iter()
            .zip(&synthetic_pre)
            .map(|(a, s)| (a - s).powi(2))
            .sum::<f64>()
            / y_pre.len() as f64)
            .sqrt();

        let actual_post = outcome(&post);
        let synthetic_post = fit.predict(&block(&post));
        let effect = actual_post
            .iter()
            .zip(&synthetic_post)
            .map(|(a, s)| a - s)
            .sum::<f64>()
            / actual_post.len() as f64;
        debug!(effect, pre_rmse, method = %self.method, "synthetic control fitted");

        let weights: serde_json::Map<String, serde_json::Value> = controls
            .iter()
            .zip(&fit.weights)
            .map(|(&j, w)| (panel.units[j].clone(), json!(w)))
            .collect();
        let post_times: Vec<serde_json::Value> = post.iter().map(|&i| panel.times[i].to_json()).collect();

        let mut result = CausalResult::new(effect, SCM_METHOD);
        result.details.insert("weights".to_string(), serde_json::Value::Object(weights));
        result.details.insert("intercept".to_string(), json!(fit.intercept));
        result.details.insert("actual_post".to_string(), json!(actual_post));
        result.details.insert("synthetic_post".to_string(), json!(synthetic_post));
        result.details.insert("post_times".to_string(), json!(post_times));
        result.details.insert("pre_rmse".to_string(), json!(pre_rmse));
        result.details.insert("regression".to_string(), json!(self.method.to_string()));
        Ok(result)
    }

    fn pivot(&self, dataset: &Dataset) -> Result<Panel> {
        dataset.require_columns(&[self.unit_col.as_str(), self.time_col.as_str(), self.outcome_col.as_str()])?;

        let units = dataset.labels(&self.unit_col)?;
        let times = time_points(dataset, &self.time_col)?;
        let outcome = dataset.numeric(&self.outcome_col)?;

        let mut cells = Vec::with_capacity(dataset.n_rows());
        for i in 0..dataset.n_rows() {
            match (&units[i], &times[i], outcome[i]) {
                (Some(u), Some(t), Some(y)) => cells.push((u.clone(), t.clone(), y)),
                _ => {
                    return Err(ExperimentError::InvalidParameter(format!(
                        "row {} has a missing unit, time or outcome",
                        i
                    )))
                }
            }
        }

        let unit_names: Vec<String> = cells
            .iter()
            .map(|c| c.0.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let time_axis = sorted_unique(&cells.iter().map(|c| c.1.clone()).collect::<Vec<_>>())?;
        let unit_index: HashMap<&str, usize> = unit_names
            .iter()
            .enumerate()
            .map(|(j, u)| (u.as_str(), j))
            .collect();

        let mut values = DMatrix::from_element(time_axis.len(), unit_names.len(), f64::NAN);
        for (u, t, y) in &cells {
            let j = unit_index[u.as_str()];
            let i = time_axis
                .iter()
                .position(|p| p == t)
                .ok_or_else(|| ExperimentError::Numerical(format!("time point {} not on axis", t)))?;
            if !values[(i, j)].is_nan() {
                return Err(ExperimentError::InvalidParameter(format!(
                    "duplicate observation for unit '{}' at time {}",
                    u, t
                )));
            }
            values[(i, j)] = *y;
        }
        if values.iter().any(|v| v.is_nan()) {
            return Err(ExperimentError::InvalidParameter(
                "unbalanced panel: every unit needs an outcome at every time point".to_string(),
            ));
        }

        Ok(Panel {
            times: time_axis,
            units: unit_names,
            values,
        })
    }
}
