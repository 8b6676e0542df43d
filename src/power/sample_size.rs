//! Closed-form sample size for two-group experiments.
//!
//! For a target effect δ (absolute MDE) the required size per group is
//!
//! ```text
//! n = ceil( (z_crit + z_power)² · σ²_combined / δ² )
//! ```
//!
//! where `σ²_combined` is `p0(1−p0) + p1(1−p1)` for binary metrics and `2σ²`
//! for continuous ones, optionally multiplied by `(1 − ρ²)` when CUPED with
//! pre-period correlation ρ is planned.

use crate::data::MetricType;
use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Bound used to keep rates away from 0 and 1.
const RATE_EPSILON: f64 = 1e-9;

fn default_alpha() -> f64 {
    0.05
}

fn default_power() -> f64 {
    0.8
}

fn default_two_sided() -> bool {
    true
}

/// Inputs for a sample size calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRequest {
    /// Binary (rate) or continuous (mean) metric.
    pub metric_type: MetricType,
    /// Baseline conversion rate (binary) or mean (continuous).
    pub baseline: f64,
    /// Absolute minimum detectable effect.
    pub mde_abs: f64,
    /// Significance level.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Target power (1 − β).
    #[serde(default = "default_power")]
    pub power: f64,
    /// Two-sided or one-sided test.
    #[serde(default = "default_two_sided")]
    pub two_sided: bool,
    /// Standard deviation of a continuous metric.
    #[serde(default)]
    pub std_dev: Option<f64>,
    /// Pre-period correlation ρ when CUPED is planned.
    #[serde(default)]
    pub cuped_correlation: Option<f64>,
}

impl PowerRequest {
    /// Request for a binary metric with α = 0.05, power = 0.8, two-sided.
    pub fn binary(baseline_rate: f64, mde_abs: f64) -> Self {
        Self {
            metric_type: MetricType::Binary,
            baseline: baseline_rate,
            mde_abs,
            alpha: default_alpha(),
            power: default_power(),
            two_sided: true,
            std_dev: None,
            cuped_correlation: None,
        }
    }

    /// Request for a continuous metric with α = 0.05, power = 0.8, two-sided.
    pub fn continuous(mean: f64, mde_abs: f64) -> Self {
        Self {
            metric_type: MetricType::Continuous,
            ..Self::binary(mean, mde_abs)
        }
    }

    /// Set significance level.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set target power.
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    /// Use a one-sided critical value.
    pub fn one_sided(mut self) -> Self {
        self.two_sided = false;
        self
    }

    /// Set the standard deviation of a continuous metric.
    pub fn with_std_dev(mut self, std_dev: f64) -> Self {
        self.std_dev = Some(std_dev);
        self
    }

    /// Plan for CUPED with the given pre-period correlation.
    pub fn with_cuped(mut self, correlation: f64) -> Self {
        self.cuped_correlation = Some(correlation);
        self
    }

    /// Reject out-of-range inputs before any computation.
    pub fn validate(&self) -> Result<()> {
        let open_unit = |v: f64| v > 0.0 && v < 1.0;
        if !open_unit(self.alpha) {
            return Err(ExperimentError::InvalidParameter(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if !open_unit(self.power) {
            return Err(ExperimentError::InvalidParameter(format!(
                "power must be in (0, 1), got {}",
                self.power
            )));
        }
        if !self.mde_abs.is_finite() || self.mde_abs < 0.0 {
            return Err(ExperimentError::InvalidParameter(format!(
                "mde_abs must be a non-negative number, got {}",
                self.mde_abs
            )));
        }
        if !self.baseline.is_finite() {
            return Err(ExperimentError::InvalidParameter(
                "baseline must be finite".to_string(),
            ));
        }
        if self.metric_type == MetricType::Binary && !open_unit(self.baseline) {
            return Err(ExperimentError::InvalidParameter(format!(
                "baseline rate must be in (0, 1), got {}",
                self.baseline
            )));
        }
        if let Some(sd) = self.std_dev {
            if !(sd.is_finite() && sd > 0.0) {
                return Err(ExperimentError::InvalidParameter(format!(
                    "std_dev must be positive, got {}",
                    sd
                )));
            }
        }
        if let Some(rho) = self.cuped_correlation {
            if !(rho.is_finite() && rho.abs() < 1.0) {
                return Err(ExperimentError::InvalidParameter(format!(
                    "CUPED correlation must be in (-1, 1), got {}",
                    rho
                )));
            }
        }
        if self.metric_type == MetricType::Continuous
            && self.std_dev.is_none()
            && self.baseline == 0.0
        {
            return Err(ExperimentError::InvalidParameter(
                "continuous metric needs std_dev when the baseline mean is 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Required sample size and the quantities it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerResult {
    /// Required units per group.
    pub n_per_group: u64,
    /// Units across both groups (`2 × n_per_group`).
    pub total_n: u64,
    /// Critical value of the standard normal for α.
    pub z_alpha: f64,
    /// Standard normal quantile of the target power.
    pub z_beta: f64,
    /// Human-readable statement of the modelling assumptions.
    pub assumptions: String,
}

fn clamp_rate(p: f64) -> f64 {
    p.clamp(RATE_EPSILON, 1.0 - RATE_EPSILON)
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(ExperimentError::distribution)
}

/// Critical values `(z_alpha, z_beta)` for a design.
fn critical_values(alpha: f64, power: f64, two_sided: bool) -> Result<(f64, f64)> {
    let normal = standard_normal()?;
    let tail = if two_sided { alpha / 2.0 } else { alpha };
    Ok((normal.inverse_cdf(1.0 - tail), normal.inverse_cdf(power)))
}

/// Compute the per-group sample size for a two-group comparison.
///
/// A zero MDE requests no detectable effect and yields `n_per_group = 0`.
pub fn calculate_sample_size(request: &PowerRequest) -> Result<PowerResult> {
    request.validate()?;

    let (z_alpha, z_beta) = critical_values(request.alpha, request.power, request.two_sided)?;
    let mut notes: Vec<String> = Vec::new();

    let mut variance = match request.metric_type {
        MetricType::Binary => {
            let p0 = clamp_rate(request.baseline);
            let p1 = clamp_rate(p0 + request.mde_abs);
            notes.push("Two-proportion z-test, normal approximation".to_string());
            p0 * (1.0 - p0) + p1 * (1.0 - p1)
        }
        MetricType::Continuous => {
            let sigma = match request.std_dev {
                Some(sd) => sd,
                None => {
                    notes.push(
                        "std_dev not supplied: the baseline mean is used as a rough standard \
                         deviation (unverified approximation)"
                            .to_string(),
                    );
                    request.baseline.abs()
                }
            };
            notes.push("Two-sample comparison of means, normal approximation".to_string());
            2.0 * sigma * sigma
        }
    };

    match request.cuped_correlation {
        Some(rho) => {
            variance *= 1.0 - rho * rho;
            notes.push(format!(
                "CUPED variance reduction with pre-period correlation {:.3} (factor {:.3})",
                rho,
                1.0 - rho * rho
            ));
        }
        None => notes.push("no CUPED/variance reduction".to_string()),
    }
    notes.push(format!(
        "{} test at alpha {}; independent samples; equal allocation; fixed horizon",
        if request.two_sided { "two-sided" } else { "one-sided" },
        request.alpha
    ));

    let n_per_group = if request.mde_abs == 0.0 {
        0
    } else {
        let n = (z_alpha + z_beta).powi(2) * variance / request.mde_abs.powi(2);
        n.ceil() as u64
    };

    Ok(PowerResult {
        n_per_group,
        total_n: 2 * n_per_group,
        z_alpha,
        z_beta,
        assumptions: notes.join("; "),
    })
}

/// Textbook two-proportion sizing with a pooled variance under the null.
///
/// `n = (z_α·√(2p̄(1−p̄)) + z_β·√(p0(1−p0) + p1(1−p1)))² / δ²`, two-sided,
/// floored at one unit per group.
pub fn classic_two_proportion_sample_size(
    baseline_rate: f64,
    mde_abs: f64,
    alpha: f64,
    power: f64,
) -> Result<PowerResult> {
    let request = PowerRequest::binary(baseline_rate, mde_abs)
        .with_alpha(alpha)
        .with_power(power);
    request.validate()?;
    if mde_abs == 0.0 {
        return Err(ExperimentError::InvalidParameter(
            "mde_abs must be positive for the pooled-null formula".to_string(),
        ));
    }

    let (z_alpha, z_beta) = critical_values(alpha, power, true)?;
    let p0 = baseline_rate;
    let p1 = p0 + mde_abs;
    let p_bar = (p0 + p1) / 2.0;

    let term_null = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt();
    let term_alt = z_beta * (p0 * (1.0 - p0) + p1 * (1.0 - p1)).max(0.0).sqrt();
    let n = (term_null + term_alt).powi(2) / mde_abs.powi(2);
    let n_per_group = (n.ceil() as u64).max(1);

    Ok(PowerResult {
        n_per_group,
        total_n: 2 * n_per_group,
        z_alpha,
        z_beta,
        assumptions: "Two-proportion z-test with pooled variance under H0; two-sided; \
                      independent samples; fixed horizon"
            .to_string(),
    })
}

/// Days needed to enrol `total_n` units at the given daily eligible traffic.
///
/// Returns `None` when traffic is not positive.
pub fn estimate_duration_days(total_n: u64, traffic_per_day: f64) -> Option<u64> {
    if !(traffic_per_day.is_finite() && traffic_per_day > 0.0) {
        return None;
    }
    Some((total_n as f64 / traffic_per_day).ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_binary_reference_value() {
        let res = calculate_sample_size(&PowerRequest::binary(0.05, 0.01)).unwrap();

        // (1.95996 + 0.84162)^2 * (0.0475 + 0.0564) / 0.0001 = 8154.99
        assert!((8154..=8156).contains(&res.n_per_group), "n = {}", res.n_per_group);
        assert_eq!(res.total_n, 2 * res.n_per_group);
        assert_relative_eq!(res.z_alpha, 1.959964, epsilon = 1e-5);
        assert_relative_eq!(res.z_beta, 0.841621, epsilon = 1e-5);
    }

    #[test]
    fn test_one_sided_needs_fewer_units() {
        let two = calculate_sample_size(&PowerRequest::binary(0.1, 0.02)).unwrap();
        let one = calculate_sample_size(&PowerRequest::binary(0.1, 0.02).one_sided()).unwrap();

        assert!(one.n_per_group < two.n_per_group);
        assert_relative_eq!(one.z_alpha, 1.644854, epsilon = 1e-5);
    }

    #[test]
    fn test_continuous_with_std_dev() {
        let req = PowerRequest::continuous(50.0, 2.0).with_std_dev(10.0);
        let res = calculate_sample_size(&req).unwrap();

        // 7.8489 * 200 / 4 = 392.4
        assert_eq!(res.n_per_group, 393);
    }

    #[test]
    fn test_continuous_without_std_dev_uses_mean() {
        let with_mean = calculate_sample_size(&PowerRequest::continuous(10.0, 1.0)).unwrap();
        let explicit =
            calculate_sample_size(&PowerRequest::continuous(10.0, 1.0).with_std_dev(10.0)).unwrap();

        assert_eq!(with_mean.n_per_group, explicit.n_per_group);
        assert!(with_mean.assumptions.contains("approximation"));
    }

    #[test]
    fn test_cuped_reduces_sample_size() {
        let base = calculate_sample_size(&PowerRequest::binary(0.1, 0.01)).unwrap();
        let cuped = calculate_sample_size(&PowerRequest::binary(0.1, 0.01).with_cuped(0.5)).unwrap();

        assert!(cuped.n_per_group < base.n_per_group);
        // variance factor 0.75
        let ratio = cuped.n_per_group as f64 / base.n_per_group as f64;
        assert_relative_eq!(ratio, 0.75, epsilon = 1e-3);
    }

    #[test]
    fn test_zero_mde_is_zero_sample() {
        let res = calculate_sample_size(&PowerRequest::binary(0.1, 0.0)).unwrap();
        assert_eq!(res.n_per_group, 0);
        assert_eq!(res.total_n, 0);
    }

    #[test]
    fn test_clamped_rate_near_one() {
        let res = calculate_sample_size(&PowerRequest::binary(0.95, 0.1)).unwrap();
        assert!(res.n_per_group >= 1);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(calculate_sample_size(&PowerRequest::binary(0.0, 0.01)).is_err());
        assert!(calculate_sample_size(&PowerRequest::binary(1.2, 0.01)).is_err());
        assert!(calculate_sample_size(&PowerRequest::binary(0.1, -0.01)).is_err());
        assert!(calculate_sample_size(&PowerRequest::binary(0.1, 0.01).with_alpha(1.0)).is_err());
        assert!(calculate_sample_size(&PowerRequest::binary(0.1, 0.01).with_power(0.0)).is_err());
        assert!(calculate_sample_size(&PowerRequest::binary(0.1, 0.01).with_cuped(1.0)).is_err());
        assert!(calculate_sample_size(&PowerRequest::continuous(0.0, 1.0)).is_err());
        assert!(
            calculate_sample_size(&PowerRequest::continuous(5.0, 1.0).with_std_dev(-1.0)).is_err()
        );
    }

    #[test]
    fn test_classic_formula_is_close_to_planning_formula() {
        let planning = calculate_sample_size(&PowerRequest::binary(0.05, 0.01)).unwrap();
        let classic = classic_two_proportion_sample_size(0.05, 0.01, 0.05, 0.8).unwrap();

        let rel = (classic.n_per_group as f64 - planning.n_per_group as f64).abs()
            / planning.n_per_group as f64;
        assert!(rel < 0.05, "relative difference {}", rel);
    }

    #[test]
    fn test_duration() {
        assert_eq!(estimate_duration_days(1000, 300.0), Some(4));
        assert_eq!(estimate_duration_days(900, 300.0), Some(3));
        assert_eq!(estimate_duration_days(1000, 0.0), None);
        assert_eq!(estimate_duration_days(1000, -5.0), None);
    }

    #[test]
    fn test_request_yaml_defaults() {
        let yaml = "metric_type: binary\nbaseline: 0.1\nmde_abs: 0.02\n";
        let req: PowerRequest = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(req, PowerRequest::binary(0.1, 0.02));
    }
}
