//! Difference-in-differences via OLS.
//!
//! Fits `y = α + β·treat + γ·post + δ·(treat × post) + ε`; δ is the effect.
//! Standard errors assume iid errors and are not clustered by unit, so they
//! understate uncertainty when outcomes are correlated within units.

use crate::causal::panel::{time_points, TimePoint};
use crate::causal::CausalResult;
use crate::data::Dataset;
use crate::error::{ExperimentError, Result};
use crate::model::fit_ols;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

/// Method name reported in results.
pub const DID_METHOD: &str = "Difference-in-Differences (OLS)";

const INTERACTION: &str = "treat_post";

/// Column roles and the post-period boundary for a DiD fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceInDifferences {
    pub unit_col: String,
    pub time_col: String,
    /// 0/1 indicator of the treated group.
    pub treatment_col: String,
    pub outcome_col: String,
    /// First time point of the post period (inclusive).
    pub post_period_start: TimePoint,
}

impl DifferenceInDifferences {
    pub fn new(
        unit_col: &str,
        time_col: &str,
        treatment_col: &str,
        outcome_col: &str,
        post_period_start: impl Into<TimePoint>,
    ) -> Self {
        Self {
            unit_col: unit_col.to_string(),
            time_col: time_col.to_string(),
            treatment_col: treatment_col.to_string(),
            outcome_col: outcome_col.to_string(),
            post_period_start: post_period_start.into(),
        }
    }

    /// Estimate the treated × post interaction.
    ///
    /// Rows with a missing time, treatment or outcome are dropped.
    ///
    /// # Errors
    /// Missing columns, no rows before or after `post_period_start`, or a
    /// singular design (e.g. no treated or no control rows).
    pub fn fit(&self, dataset: &Dataset) -> Result<CausalResult> {
        dataset.require_columns(&[
            self.unit_col.as_str(),
            self.time_col.as_str(),
            self.treatment_col.as_str(),
            self.outcome_col.as_str(),
        ])?;

        let times = time_points(dataset, &self.time_col)?;
        let treat = dataset.numeric(&self.treatment_col)?;
        let outcome = dataset.numeric(&self.outcome_col)?;
        let units = dataset.labels(&self.unit_col)?;

        let mut rows: Vec<[f64; 4]> = Vec::new();
        let mut y = Vec::new();
        let mut unit_set = HashSet::new();
        for i in 0..dataset.n_rows() {
            let (Some(t), Some(d), Some(yi)) = (&times[i], treat[i], outcome[i]) else {
                continue;
            };
            let post = if t.at_or_after(&self.post_period_start)? { 1.0 } else { 0.0 };
            rows.push([1.0, d, post, d * post]);
            y.push(yi);
            if let Some(u) = &units[i] {
                unit_set.insert(u.clone());
            }
        }

        let dropped = dataset.n_rows() - rows.len();
        if dropped > 0 {
            debug!(dropped, "DiD rows with missing values dropped");
        }

        let n_post = rows.iter().filter(|r| r[2] == 1.0).count();
        if n_post == rows.len() {
            return Err(ExperimentError::EmptyData(format!(
                "no pre-period rows before {}",
                self.post_period_start
            )));
        }
        if n_post == 0 {
            return Err(ExperimentError::EmptyData(format!(
                "no post-period rows at or after {}",
                self.post_period_start
            )));
        }

        let x = DMatrix::from_fn(rows.len(), 4, |i, j| rows[i][j]);
        let names = vec![
            "(Intercept)".to_string(),
            "treatment".to_string(),
            "post".to_string(),
            INTERACTION.to_string(),
        ];
        let fit = fit_ols(&x, &y, names)?;

        let coef = |name: &str| fit.coefficient(name).unwrap_or(f64::NAN);
        let effect = coef(INTERACTION);
        let ci = fit.confidence_interval(INTERACTION, 0.95)?;
        let p_value = fit.p_value(INTERACTION)?;
        debug!(effect, r_squared = fit.r_squared, n = y.len(), "DiD fitted");

        let mut result = CausalResult::new(effect, DID_METHOD);
        result.ci_lower = ci.map(|c| c.0);
        result.ci_upper = ci.map(|c| c.1);
        result.p_value = p_value;
        result.details.insert(
            "coefficients".to_string(),
            json!({
                "treatment": coef("treatment"),
                "post": coef("post"),
                "interaction": effect,
                "intercept": coef("(Intercept)"),
            }),
        );
        result
            .details
            .insert("std_error".to_string(), json!(fit.std_error(INTERACTION)));
        result.details.insert("r_squared".to_string(), json!(fit.r_squared));
        result.details.insert("n_obs".to_string(), json!(y.len()));
        result.details.insert("n_units".to_string(), json!(unit_set.len()));
        result
            .details
            .insert("standard_errors".to_string(), json!("iid, not clustered by unit"));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two units per arm, two periods, exact effect of 3.
    fn exact_panel() -> Dataset {
        let mut unit = Vec::new();
        let mut time = Vec::new();
        let mut treat = Vec::new();
        let mut y = Vec::new();
        for u in 0..4 {
            let d = if u >= 2 { 1.0 } else { 0.0 };
            for t in [2020.0, 2021.0, 2022.0, 2023.0] {
                let post = if t >= 2022.0 { 1.0 } else { 0.0 };
                let noise = if (u + t as usize) % 2 == 0 { 0.1 } else { -0.1 };
                unit.push(format!("u{}", u));
                time.push(t);
                treat.push(d);
                y.push(10.0 + 2.0 * d + 1.0 * post + 3.0 * d * post + noise);
            }
        }
        Dataset::new()
            .with_categorical("unit", unit)
            .unwrap()
            .with_continuous("time", time)
            .unwrap()
            .with_continuous("treat", treat)
            .unwrap()
            .with_continuous("y", y)
            .unwrap()
    }

    #[test]
    fn test_recovers_interaction() {
        let did = DifferenceInDifferences::new("unit", "time", "treat", "y", 2022.0);
        let res = did.fit(&exact_panel()).unwrap();

        assert_eq!(res.method, DID_METHOD);
        assert_relative_eq!(res.effect, 3.0, epsilon = 0.2);
        assert!(res.ci_lower.unwrap() < res.effect && res.effect < res.ci_upper.unwrap());
        assert!(res.p_value.unwrap() < 0.001);
        assert_eq!(res.details["n_units"], json!(4));
        assert_relative_eq!(
            res.details["coefficients"]["treatment"].as_f64().unwrap(),
            2.0,
            epsilon = 0.2
        );
    }

    #[test]
    fn test_no_post_period() {
        let did = DifferenceInDifferences::new("unit", "time", "treat", "y", 2030.0);
        assert!(matches!(did.fit(&exact_panel()), Err(ExperimentError::EmptyData(_))));
    }

    #[test]
    fn test_no_pre_period() {
        let did = DifferenceInDifferences::new("unit", "time", "treat", "y", 1999.0);
        assert!(matches!(did.fit(&exact_panel()), Err(ExperimentError::EmptyData(_))));
    }

    #[test]
    fn test_no_treated_rows_is_singular() {
        let data = exact_panel().filter_eq("unit", "u0").unwrap();
        let did = DifferenceInDifferences::new("unit", "time", "treat", "y", 2022.0);
        assert!(matches!(did.fit(&data), Err(ExperimentError::Numerical(_))));
    }

    #[test]
    fn test_missing_column() {
        let did = DifferenceInDifferences::new("unit", "period", "treat", "y", 2022.0);
        assert!(matches!(did.fit(&exact_panel()), Err(ExperimentError::MissingColumn(_))));
    }
}
