//! Linear models: OLS with inference, and penalized least squares
//! (none / ridge / lasso) with an unpenalized intercept.

use crate::error::{ExperimentError, Result};
use crate::model::Regressor;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Ordinary least squares fit with coefficient inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OlsFit {
    /// Names of the design columns.
    pub coefficient_names: Vec<String>,
    /// Estimated coefficients.
    pub coefficients: Vec<f64>,
    /// Standard errors of coefficients (iid errors).
    pub std_errors: Vec<f64>,
    /// Residuals.
    #[serde(skip)]
    pub residuals: Vec<f64>,
    /// Residual standard error (sigma).
    pub sigma: f64,
    /// R-squared.
    pub r_squared: f64,
    /// Degrees of freedom (residual).
    pub df_residual: usize,
}

impl OlsFit {
    /// Index of a named coefficient.
    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }

    /// Get a coefficient by name.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.coefficients.get(self.coefficient_index(name)?).copied()
    }

    /// Get a standard error by name.
    pub fn std_error(&self, name: &str) -> Option<f64> {
        self.std_errors.get(self.coefficient_index(name)?).copied()
    }

    /// t-statistic for a coefficient.
    pub fn t_statistic(&self, name: &str) -> Option<f64> {
        let coef = self.coefficient(name)?;
        let se = self.std_error(name)?;
        if se > 0.0 {
            Some(coef / se)
        } else {
            None
        }
    }

    /// Two-sided p-value of a coefficient against zero.
    pub fn p_value(&self, name: &str) -> Result<Option<f64>> {
        let Some(t) = self.t_statistic(name) else {
            return Ok(None);
        };
        let dist = StudentsT::new(0.0, 1.0, self.df_residual as f64).map_err(ExperimentError::distribution)?;
        Ok(Some(2.0 * (1.0 - dist.cdf(t.abs()))))
    }

    /// Two-sided `level` confidence interval of a coefficient.
    pub fn confidence_interval(&self, name: &str, level: f64) -> Result<Option<(f64, f64)>> {
        let (Some(coef), Some(se)) = (self.coefficient(name), self.std_error(name)) else {
            return Ok(None);
        };
        if !se.is_finite() {
            return Ok(None);
        }
        let dist = StudentsT::new(0.0, 1.0, self.df_residual as f64).map_err(ExperimentError::distribution)?;
        let crit = dist.inverse_cdf(1.0 - (1.0 - level) / 2.0);
        Ok(Some((coef - crit * se, coef + crit * se)))
    }
}

/// Fit OLS of `y` on the columns of `x`.
///
/// The design must carry its own intercept column if one is wanted.
/// Coefficients are `(X'X)^-1 X'y`; standard errors assume iid errors.
/// A saturated design (as many rows as columns) still yields coefficients,
/// but its standard errors are NaN and p-values and intervals are `None`.
///
/// # Arguments
/// * `x` - Design matrix (rows = observations)
/// * `y` - Response
/// * `names` - One name per design column
pub fn fit_ols(x: &DMatrix<f64>, y: &[f64], names: Vec<String>) -> Result<OlsFit> {
    let (n, p) = x.shape();
    if y.len() != n {
        return Err(ExperimentError::DimensionMismatch {
            expected: n,
            actual: y.len(),
        });
    }
    if names.len() != p {
        return Err(ExperimentError::DimensionMismatch {
            expected: p,
            actual: names.len(),
        });
    }

    if n < p {
        return Err(ExperimentError::Numerical(format!(
            "Fewer observations ({}) than coefficients ({})",
            n, p
        )));
    }
    let df_residual = n - p;

    let xtx = x.transpose() * x;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| {
        ExperimentError::Numerical("Design matrix is singular (X'X not invertible)".to_string())
    })?;

    let y_vec = DVector::from_column_slice(y);
    let beta = &xtx_inv * (x.transpose() * &y_vec);
    let residuals_vec = &y_vec - x * &beta;
    let residuals: Vec<f64> = residuals_vec.iter().copied().collect();

    let rss: f64 = residuals.iter().map(|e| e * e).sum();
    // Saturated fit: coefficients are exact, inference is undefined.
    let sigma = if df_residual > 0 {
        (rss / df_residual as f64).sqrt()
    } else {
        f64::NAN
    };
    let std_errors: Vec<f64> = (0..p).map(|j| sigma * xtx_inv[(j, j)].sqrt()).collect();

    let y_mean = y.iter().sum::<f64>() / n as f64;
    let tss: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    Ok(OlsFit {
        coefficient_names: names,
        coefficients: beta.iter().copied().collect(),
        std_errors,
        residuals,
        sigma,
        r_squared,
        df_residual,
    })
}

/// Regularization for [`fit_linear`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "alpha", rename_all = "lowercase")]
pub enum Penalty {
    /// Minimum-norm least squares.
    None,
    /// L2 penalty `alpha·||w||²`.
    Ridge(f64),
    /// L1 penalty with objective `(1/2n)·||y − Xw − b||² + alpha·||w||₁`.
    Lasso(f64),
}

/// Linear predictor `intercept + x·weights`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl LinearFit {
    /// Predict one row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>()
    }

    /// Predict every row of `x`.
    pub fn predict(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let w = DVector::from_column_slice(&self.weights);
        (x * w).iter().map(|v| v + self.intercept).collect()
    }
}

const LASSO_MAX_ITER: usize = 1000;
const LASSO_TOL: f64 = 1e-4;

/// Fit `y ≈ intercept + x·w` with an optional penalty on `w`.
///
/// Columns and response are centered first so the intercept is never
/// penalized.
pub fn fit_linear(x: &DMatrix<f64>, y: &[f64], penalty: Penalty) -> Result<LinearFit> {
    let (n, p) = x.shape();
    if y.len() != n {
        return Err(ExperimentError::DimensionMismatch {
            expected: n,
            actual: y.len(),
        });
    }
    if n == 0 {
        return Err(ExperimentError::EmptyData("no rows to fit".to_string()));
    }

    let x_means: Vec<f64> = (0..p).map(|j| x.column(j).mean()).collect();
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let xc = DMatrix::from_fn(n, p, |i, j| x[(i, j)] - x_means[j]);
    let yc = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));

    let weights: Vec<f64> = match penalty {
        Penalty::None => least_squares(&xc, &yc)?,
        Penalty::Ridge(alpha) => {
            check_alpha(alpha)?;
            ridge(&xc, &yc, alpha)?
        }
        Penalty::Lasso(alpha) => {
            check_alpha(alpha)?;
            lasso(&xc, &yc, alpha)
        }
    };

    let intercept = y_mean - x_means.iter().zip(&weights).map(|(m, w)| m * w).sum::<f64>();
    Ok(LinearFit { intercept, weights })
}

fn check_alpha(alpha: f64) -> Result<()> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(())
    } else {
        Err(ExperimentError::InvalidParameter(format!(
            "penalty must be finite and non-negative, got {}",
            alpha
        )))
    }
}

/// Minimum-norm least squares through the SVD pseudo-inverse.
fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<Vec<f64>> {
    let (n, p) = x.shape();
    if p == 0 {
        return Ok(Vec::new());
    }
    let svd = x.clone().svd(true, true);
    let s_max = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    let eps = f64::EPSILON * n.max(p) as f64 * s_max;
    let w = svd
        .solve(y, eps)
        .map_err(|e| ExperimentError::Numerical(format!("least squares failed: {}", e)))?;
    Ok(w.iter().copied().collect())
}

fn ridge(x: &DMatrix<f64>, y: &DVector<f64>, alpha: f64) -> Result<Vec<f64>> {
    let p = x.ncols();
    let a = x.transpose() * x + DMatrix::identity(p, p) * alpha;
    let b = x.transpose() * y;
    let chol = a
        .cholesky()
        .ok_or_else(|| ExperimentError::Numerical("ridge system is not positive definite".to_string()))?;
    Ok(chol.solve(&b).iter().copied().collect())
}

/// Cyclic coordinate descent on centered data.
fn lasso(x: &DMatrix<f64>, y: &DVector<f64>, alpha: f64) -> Vec<f64> {
    let (n, p) = x.shape();
    let threshold = alpha * n as f64;
    let col_sq: Vec<f64> = (0..p).map(|j| x.column(j).norm_squared()).collect();
    let mut w = vec![0.0; p];
    let mut residual = y.clone();

    for _ in 0..LASSO_MAX_ITER {
        let mut max_update = 0.0_f64;
        let mut max_weight = 0.0_f64;
        for j in 0..p {
            if col_sq[j] == 0.0 {
                continue;
            }
            let col = x.column(j);
            let old = w[j];
            let rho = col.dot(&residual) + col_sq[j] * old;
            let new = soft_threshold(rho, threshold) / col_sq[j];
            if new != old {
                residual -= col * (new - old);
                w[j] = new;
            }
            max_update = max_update.max((new - old).abs());
            max_weight = max_weight.max(new.abs());
        }
        if max_weight == 0.0 || max_update / max_weight < LASSO_TOL {
            break;
        }
    }
    w
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// [`Regressor`] wrapper around [`fit_linear`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub penalty: Penalty,
    #[serde(skip)]
    fit: Option<LinearFit>,
}

impl LinearRegressor {
    pub fn new(penalty: Penalty) -> Self {
        Self { penalty, fit: None }
    }

    /// The fitted coefficients, if any.
    pub fn fitted(&self) -> Option<&LinearFit> {
        self.fit.as_ref()
    }
}

impl Default for LinearRegressor {
    fn default() -> Self {
        Self::new(Penalty::None)
    }
}

impl Regressor for LinearRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> Result<()> {
        self.fit = Some(fit_linear(x, y, self.penalty)?);
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ExperimentError::InvalidParameter("model has not been fitted".to_string()))?;
        if x.ncols() != fit.weights.len() {
            return Err(ExperimentError::DimensionMismatch {
                expected: fit.weights.len(),
                actual: x.ncols(),
            });
        }
        Ok(fit.predict(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn design(rows: &[[f64; 2]]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), 3, |i, j| if j == 0 { 1.0 } else { rows[i][j - 1] })
    }

    #[test]
    fn test_fit_ols_exact() {
        let rows = [[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let x = design(&rows);
        let y: Vec<f64> = rows.iter().map(|r| 1.0 + 2.0 * r[0] - 3.0 * r[1]).collect();
        let fit = fit_ols(&x, &y, vec!["(Intercept)".into(), "a".into(), "b".into()]).unwrap();

        assert_relative_eq!(fit.coefficient("(Intercept)").unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficient("a").unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficient("b").unwrap(), -3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-9);
        assert_eq!(fit.df_residual, 3);
        assert!(fit.coefficient("c").is_none());
    }

    #[test]
    fn test_fit_ols_inference() {
        let rows = [[0.0, 0.0], [1.0, 1.0], [2.0, 0.0], [3.0, 1.0], [4.0, 0.0], [5.0, 1.0], [6.0, 0.0]];
        let x = design(&rows);
        let noise = [0.1, -0.2, 0.15, -0.05, 0.0, 0.1, -0.1];
        let y: Vec<f64> = rows.iter().zip(noise).map(|(r, e)| 0.5 * r[0] + e).collect();
        let fit = fit_ols(&x, &y, vec!["(Intercept)".into(), "a".into(), "b".into()]).unwrap();

        assert!(fit.p_value("a").unwrap().unwrap() < 0.001);
        assert!(fit.p_value("b").unwrap().unwrap() > 0.05);
        let (lo, hi) = fit.confidence_interval("a", 0.95).unwrap().unwrap();
        assert!(lo < 0.5 && 0.5 < hi);
    }

    #[test]
    fn test_fit_ols_singular() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        let res = fit_ols(&x, &[1.0, 2.0, 3.0, 4.0], vec!["a".into(), "b".into()]);
        assert!(matches!(res, Err(ExperimentError::Numerical(_))));
    }

    #[test]
    fn test_fit_ols_saturated() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let fit = fit_ols(&x, &[1.0, 3.0], vec!["a".into(), "b".into()]).unwrap();

        assert_eq!(fit.df_residual, 0);
        assert_relative_eq!(fit.coefficient("b").unwrap(), 2.0, epsilon = 1e-12);
        assert!(fit.t_statistic("b").is_none());
        assert!(fit.p_value("b").unwrap().is_none());
        assert!(fit.confidence_interval("b", 0.95).unwrap().is_none());
    }

    #[test]
    fn test_fit_ols_underdetermined() {
        let x = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        assert!(fit_ols(&x, &[1.0], vec!["a".into(), "b".into()]).is_err());
    }

    #[test]
    fn test_least_squares_recovers_combination() {
        let x = DMatrix::from_row_slice(5, 2, &[1.0, 2.0, 2.0, 1.0, 3.0, 5.0, 4.0, 3.0, 5.0, 4.0]);
        let y: Vec<f64> = (0..5).map(|i| 3.0 + 0.6 * x[(i, 0)] + 0.4 * x[(i, 1)]).collect();
        let fit = fit_linear(&x, &y, Penalty::None).unwrap();

        assert_relative_eq!(fit.intercept, 3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.weights[0], 0.6, epsilon = 1e-9);
        assert_relative_eq!(fit.weights[1], 0.4, epsilon = 1e-9);
        assert_relative_eq!(fit.predict(&x)[2], y[2], epsilon = 1e-9);
        assert_relative_eq!(fit.predict_row(&[3.0, 5.0]), y[2], epsilon = 1e-9);
    }

    #[test]
    fn test_least_squares_rank_deficient() {
        // Duplicate columns: minimum-norm solution splits the weight evenly.
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
        let y = [2.0, 4.0, 6.0, 8.0];
        let fit = fit_linear(&x, &y, Penalty::None).unwrap();
        assert_relative_eq!(fit.weights[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.weights[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ridge_shrinks() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = [2.0, 4.0, 6.0, 8.0];
        // Centered x'x = 5, x'y = 10: w = 10 / (5 + 1)
        let fit = fit_linear(&x, &y, Penalty::Ridge(1.0)).unwrap();
        assert_relative_eq!(fit.weights[0], 10.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 5.0 - 2.5 * 10.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lasso_single_feature_closed_form() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = [2.0, 4.0, 6.0, 8.0];
        // w = S(x'y, n·alpha) / x'x = (10 − 0.4) / 5
        let fit = fit_linear(&x, &y, Penalty::Lasso(0.1)).unwrap();
        assert_relative_eq!(fit.weights[0], 9.6 / 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lasso_zeroes_weak_feature() {
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[1.0, 0.1, 2.0, -0.1, 3.0, 0.1, 4.0, -0.1, 5.0, 0.1, 6.0, -0.1],
        );
        let y: Vec<f64> = (0..6).map(|i| 2.0 * x[(i, 0)]).collect();
        let fit = fit_linear(&x, &y, Penalty::Lasso(0.5)).unwrap();
        assert_eq!(fit.weights[1], 0.0);
        assert!(fit.weights[0] > 1.5);
    }

    #[test]
    fn test_linear_regressor() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let mut model = LinearRegressor::default();
        assert!(model.predict(&x).is_err());
        model.fit(&x, &[3.0, 5.0, 7.0, 9.0]).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_relative_eq!(pred[3], 9.0, epsilon = 1e-9);
        assert_relative_eq!(model.fitted().unwrap().intercept, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        assert!(fit_linear(&x, &[1.0, 2.0], Penalty::Ridge(-1.0)).is_err());
    }
}
