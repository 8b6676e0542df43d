//! CUPED covariate adjustment.
//!
//! Replaces a metric `Y` with `Y − θ·(X − mean(X))` where `X` is a
//! pre-experiment covariate and `θ = cov(Y, X) / var(X)`, estimated on rows
//! where both values are present.

use crate::error::{ExperimentError, Result};
use crate::test::Summary;
use serde::{Deserialize, Serialize};

/// A CUPED-adjusted metric and the fitted adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CupedAdjustment {
    /// Fitted slope θ.
    pub theta: f64,
    /// Mean of the covariate over valid rows.
    pub covariate_mean: f64,
    /// Rows where both metric and covariate were present.
    pub n_valid: usize,
    /// Adjusted metric; `None` where the metric or covariate is missing.
    #[serde(skip)]
    pub values: Vec<Option<f64>>,
}

impl CupedAdjustment {
    /// Fraction of metric variance removed on the valid rows.
    pub fn variance_reduction(&self, metric: &[Option<f64>]) -> f64 {
        let pairs: Vec<(f64, f64)> = metric
            .iter()
            .zip(&self.values)
            .filter_map(|(y, adj)| Some(((*y)?, (*adj)?)))
            .collect();
        let raw: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let adjusted: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let raw_var = Summary::of(&raw).variance;
        if !(raw_var > 0.0) {
            return 0.0;
        }
        1.0 - Summary::of(&adjusted).variance / raw_var
    }
}

/// Apply CUPED to a metric using a pre-period covariate.
///
/// θ is the sample covariance (n − 1 denominator) divided by the population
/// variance of the covariate (n denominator).
///
/// # Errors
/// `Numerical` when fewer than two rows have both values or the covariate
/// has zero variance; callers fall back to the raw metric.
pub fn apply_cuped(metric: &[Option<f64>], covariate: &[Option<f64>]) -> Result<CupedAdjustment> {
    if metric.len() != covariate.len() {
        return Err(ExperimentError::DimensionMismatch {
            expected: metric.len(),
            actual: covariate.len(),
        });
    }

    let valid: Vec<(f64, f64)> = metric
        .iter()
        .zip(covariate)
        .filter_map(|(y, x)| Some(((*y)?, (*x)?)))
        .collect();
    let n = valid.len();
    if n < 2 {
        return Err(ExperimentError::Numerical(format!(
            "CUPED needs at least 2 rows with metric and covariate, found {}",
            n
        )));
    }

    let nf = n as f64;
    let y_mean = valid.iter().map(|p| p.0).sum::<f64>() / nf;
    let x_mean = valid.iter().map(|p| p.1).sum::<f64>() / nf;
    let covariance = valid
        .iter()
        .map(|(y, x)| (y - y_mean) * (x - x_mean))
        .sum::<f64>()
        / (nf - 1.0);
    let variance = valid.iter().map(|(_, x)| (x - x_mean).powi(2)).sum::<f64>() / nf;

    if variance == 0.0 {
        return Err(ExperimentError::Numerical(
            "CUPED covariate has zero variance".to_string(),
        ));
    }

    let theta = covariance / variance;
    let values = metric
        .iter()
        .zip(covariate)
        .map(|(y, x)| match (y, x) {
            (Some(y), Some(x)) => Some(y - theta * (x - x_mean)),
            _ => None,
        })
        .collect();

    Ok(CupedAdjustment {
        theta,
        covariate_mean: x_mean,
        n_valid: n,
        values,
    })
}
