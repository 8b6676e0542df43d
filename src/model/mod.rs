//! Regression models used by the causal estimators.

pub mod lm;
pub mod tree;

use crate::error::Result;
use nalgebra::DMatrix;

pub use lm::{fit_linear, fit_ols, LinearFit, LinearRegressor, OlsFit, Penalty};
pub use tree::{RandomForestRegressor, RegressionTree, MAX_TREE_DEPTH};

/// A regression model that can be fitted and queried.
///
/// Rows of `x` are observations, columns are features.
pub trait Regressor {
    /// Fit the model, replacing any previous fit.
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> Result<()>;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>>;
}
