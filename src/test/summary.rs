//! Descriptive statistics for one sample.

use serde::{Deserialize, Serialize};

/// Count, mean and sample standard deviation of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of observations.
    pub n: usize,
    /// Arithmetic mean (NaN when empty).
    pub mean: f64,
    /// Sample variance with n − 1 denominator (NaN when n < 2).
    pub variance: f64,
}

impl Summary {
    /// Summarize a sample.
    pub fn of(values: &[f64]) -> Self {
        let n = values.len();
        let mean = if n > 0 {
            values.iter().sum::<f64>() / n as f64
        } else {
            f64::NAN
        };
        let variance = if n > 1 {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            f64::NAN
        };
        Self { n, mean, variance }
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Sum of the observations.
    pub fn sum(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean * self.n as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_summary() {
        let s = Summary::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);

        assert_eq!(s.n, 8);
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.variance, 32.0 / 7.0);
        assert_relative_eq!(s.sum(), 40.0);
    }

    #[test]
    fn test_degenerate_samples() {
        assert!(Summary::of(&[]).mean.is_nan());
        assert!(Summary::of(&[3.0]).variance.is_nan());
        assert_eq!(Summary::of(&[]).sum(), 0.0);
    }
}
