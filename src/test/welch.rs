//! Welch's unequal-variance two-sample t-test.

use crate::error::{ExperimentError, Result};
use crate::test::Summary;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Result of a Welch t-test of `treatment − control`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelchResult {
    /// Difference of means (treatment − control).
    pub mean_diff: f64,
    /// Unpooled standard error `sqrt(var_t/n_t + var_c/n_c)`.
    pub std_error: f64,
    /// t statistic.
    pub statistic: f64,
    /// Welch–Satterthwaite degrees of freedom.
    pub df: f64,
    /// P-value (two-sided).
    pub p_value: f64,
}

/// Perform Welch's t-test on two samples.
///
/// Tests H0: μ_t = μ_c against a two-sided alternative with the
/// Welch–Satterthwaite approximation for the degrees of freedom.
///
/// When both samples are constant the statistic is infinite if the means
/// differ (p = 0) and undefined otherwise, which is reported as an error.
///
/// # Arguments
/// * `treatment` - Observations of the treatment arm
/// * `control` - Observations of the control arm
pub fn welch_t_test(treatment: &[f64], control: &[f64]) -> Result<WelchResult> {
    let t = Summary::of(treatment);
    let c = Summary::of(control);
    welch_from_summaries(&t, &c)
}

/// Welch's t-test from precomputed summaries.
pub fn welch_from_summaries(t: &Summary, c: &Summary) -> Result<WelchResult> {
    if t.n < 2 || c.n < 2 {
        return Err(ExperimentError::EmptyData(format!(
            "Welch t-test needs at least 2 observations per arm (got {} and {})",
            t.n, c.n
        )));
    }

    let a = t.variance / t.n as f64;
    let b = c.variance / c.n as f64;
    let std_error = (a + b).sqrt();
    let mean_diff = t.mean - c.mean;

    if std_error == 0.0 {
        if mean_diff == 0.0 {
            return Err(ExperimentError::Numerical(
                "both samples are constant with equal means".to_string(),
            ));
        }
        return Ok(WelchResult {
            mean_diff,
            std_error,
            statistic: mean_diff.signum() * f64::INFINITY,
            df: (t.n + c.n - 2) as f64,
            p_value: 0.0,
        });
    }

    let statistic = mean_diff / std_error;
    let df = (a + b).powi(2)
        / (a.powi(2) / (t.n - 1) as f64 + b.powi(2) / (c.n - 1) as f64);

    let t_dist = StudentsT::new(0.0, 1.0, df).map_err(ExperimentError::distribution)?;
    let p_value = 2.0 * (1.0 - t_dist.cdf(statistic.abs()));

    Ok(WelchResult {
        mean_diff,
        std_error,
        statistic,
        df,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_welch_reference() {
        // R: t.test(c(27.5,21.0,19.0,23.6,17.0,17.9,16.9,20.1,21.9,22.6,23.1,19.6,19.0,21.7,21.4),
        //           c(27.1,22.0,20.8,23.4,23.4,23.5,25.8,22.0,24.8,20.2,21.9,22.1,22.9,20.5,24.4))
        let a = [
            27.5, 21.0, 19.0, 23.6, 17.0, 17.9, 16.9, 20.1, 21.9, 22.6, 23.1, 19.6, 19.0, 21.7, 21.4,
        ];
        let b = [
            27.1, 22.0, 20.8, 23.4, 23.4, 23.5, 25.8, 22.0, 24.8, 20.2, 21.9, 22.1, 22.9, 20.5, 24.4,
        ];
        let res = welch_t_test(&a, &b).unwrap();

        assert_relative_eq!(res.statistic, -2.46, epsilon = 0.01);
        assert_relative_eq!(res.df, 24.99, epsilon = 0.05);
        assert_relative_eq!(res.p_value, 0.021, epsilon = 0.002);
    }

    #[test]
    fn test_identical_distributions_not_significant() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [5.0, 4.0, 3.0, 2.0, 1.0];
        let res = welch_t_test(&a, &b).unwrap();

        assert_relative_eq!(res.statistic, 0.0);
        assert_relative_eq!(res.p_value, 1.0);
    }

    #[test]
    fn test_constant_samples_with_different_means() {
        let res = welch_t_test(&[0.6; 10], &[0.5; 10]).unwrap();

        assert_eq!(res.p_value, 0.0);
        assert!(res.statistic.is_infinite() && res.statistic > 0.0);
    }

    #[test]
    fn test_constant_equal_samples_is_error() {
        assert!(welch_t_test(&[1.0; 5], &[1.0; 5]).is_err());
    }

    #[test]
    fn test_too_few_observations() {
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_err());
    }
}
