//! Monte Carlo power estimation for the two-proportion z-test.
//!
//! Used to cross-check the closed-form sample size: draw binomial outcomes
//! for both arms under hypothesized rates, run a pooled-variance z-test and
//! count rejections.

use crate::error::{ExperimentError, Result};
use crate::random::seeded_rng;
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Configuration for power simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of simulated experiments.
    pub iterations: usize,
    /// Random seed; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Two-sided or one-sided (treatment > control) test.
    pub two_sided: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: None,
            two_sided: true,
        }
    }
}

impl SimulationConfig {
    /// Set the number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use a one-sided test.
    pub fn one_sided(mut self) -> Self {
        self.two_sided = false;
        self
    }
}

/// Estimate the empirical power of a two-proportion z-test.
///
/// Trials where the pooled standard error is zero count as non-rejections.
///
/// # Arguments
/// * `n_per_group` - Units per arm
/// * `baseline_rate` - Control rate p0
/// * `mde_abs` - Absolute effect, so p1 = p0 + mde_abs
/// * `alpha` - Rejection threshold for the p-value
/// * `config` - Iterations, seed and sidedness
///
/// # Returns
/// Fraction of simulated experiments that rejected H0.
pub fn simulate_power_two_proportion(
    n_per_group: u64,
    baseline_rate: f64,
    mde_abs: f64,
    alpha: f64,
    config: &SimulationConfig,
) -> Result<f64> {
    if n_per_group == 0 {
        return Err(ExperimentError::InvalidParameter(
            "n_per_group must be positive".to_string(),
        ));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(ExperimentError::InvalidParameter(format!(
            "alpha must be in (0, 1), got {}",
            alpha
        )));
    }
    if config.iterations == 0 {
        return Err(ExperimentError::InvalidParameter(
            "iterations must be positive".to_string(),
        ));
    }

    let eps = 1e-9;
    let p0 = baseline_rate.clamp(eps, 1.0 - eps);
    let p1 = (baseline_rate + mde_abs).clamp(eps, 1.0 - eps);

    let control = Binomial::new(n_per_group, p0).map_err(ExperimentError::distribution)?;
    let treatment = Binomial::new(n_per_group, p1).map_err(ExperimentError::distribution)?;
    let normal = Normal::new(0.0, 1.0).map_err(ExperimentError::distribution)?;
    let mut rng = seeded_rng(config.seed);

    let n = n_per_group as f64;
    let mut rejections = 0usize;

    for _ in 0..config.iterations {
        let x0 = control.sample(&mut rng) as f64;
        let x1 = treatment.sample(&mut rng) as f64;

        let p_pool = (x0 + x1) / (2.0 * n);
        let se = (2.0 * p_pool * (1.0 - p_pool) / n).sqrt();
        if se == 0.0 {
            continue;
        }

        let z = (x1 / n - x0 / n) / se;
        let p_value = if config.two_sided {
            2.0 * (1.0 - normal.cdf(z.abs()))
        } else {
            1.0 - normal.cdf(z)
        };

        if p_value < alpha {
            rejections += 1;
        }
    }

    Ok(rejections as f64 / config.iterations as f64)
}
