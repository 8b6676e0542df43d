//! Sample ratio mismatch (SRM) detection.
//!
//! Chi-square goodness-of-fit of the observed per-variant counts against an
//! equal split.

use crate::data::Dataset;
use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// P-value below which the assignment ratio is flagged.
pub const SRM_THRESHOLD: f64 = 0.001;

/// Result of an SRM check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrmResult {
    /// Observed row counts per variant, in first-seen order.
    pub observed: Vec<(String, usize)>,
    /// Expected count per variant under an equal split.
    pub expected: f64,
    /// Chi-square statistic.
    pub statistic: f64,
    /// Degrees of freedom (variants − 1).
    pub df: usize,
    /// P-value of the goodness-of-fit test.
    pub p_value: f64,
}

impl SrmResult {
    /// Whether the mismatch is strong enough to warn about.
    pub fn is_mismatch(&self) -> bool {
        self.p_value < SRM_THRESHOLD
    }
}

/// Chi-square goodness-of-fit of `counts` against equal expected counts.
///
/// Returns `(statistic, p_value)`. With fewer than two categories there is
/// no ratio to test and the p-value is 1.
pub fn chi_square_equal_split(counts: &[usize]) -> Result<(f64, f64)> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return Err(ExperimentError::EmptyData(
            "no observations for chi-square test".to_string(),
        ));
    }
    if counts.len() < 2 {
        return Ok((0.0, 1.0));
    }

    let expected = total as f64 / counts.len() as f64;
    let statistic: f64 = counts
        .iter()
        .map(|&o| (o as f64 - expected).powi(2) / expected)
        .sum();

    let dist = ChiSquared::new((counts.len() - 1) as f64).map_err(ExperimentError::distribution)?;
    let p_value = (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0);
    Ok((statistic, p_value))
}

/// Check a dataset's variant column for sample ratio mismatch.
///
/// Rows with a missing variant are not counted.
pub fn check_srm(dataset: &Dataset, variant_col: &str) -> Result<SrmResult> {
    let labels = dataset.labels(variant_col)?;
    let variants = dataset.distinct(variant_col)?;

    let observed: Vec<(String, usize)> = variants
        .into_iter()
        .map(|v| {
            let n = labels.iter().filter(|l| l.as_deref() == Some(v.as_str())).count();
            (v, n)
        })
        .collect();
    let counts: Vec<usize> = observed.iter().map(|(_, n)| *n).collect();
    let (statistic, p_value) = chi_square_equal_split(&counts)?;

    let total: usize = counts.iter().sum();
    Ok(SrmResult {
        expected: total as f64 / counts.len() as f64,
        df: counts.len().saturating_sub(1),
        observed,
        statistic,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn split(n_a: usize, n_b: usize) -> Dataset {
        let mut labels = vec!["A"; n_a];
        labels.extend(vec!["B"; n_b]);
        Dataset::new().with_categorical("variant", labels).unwrap()
    }

    #[test]
    fn test_even_split_passes() {
        let res = check_srm(&split(100, 100), "variant").unwrap();

        assert_relative_eq!(res.statistic, 0.0);
        assert_relative_eq!(res.p_value, 1.0);
        assert!(!res.is_mismatch());
    }

    #[test]
    fn test_ninety_ten_split_flags() {
        let res = check_srm(&split(180, 20), "variant").unwrap();

        assert!(res.is_mismatch());
        assert_eq!(res.observed, vec![("A".to_string(), 180), ("B".to_string(), 20)]);
        assert_relative_eq!(res.statistic, 128.0);
    }

    #[test]
    fn test_reference_p_value() {
        // scipy.stats.chisquare([55, 45]) -> statistic 1.0, p 0.3173
        let (stat, p) = chi_square_equal_split(&[55, 45]).unwrap();
        assert_relative_eq!(stat, 1.0);
        assert_relative_eq!(p, 0.3173, epsilon = 1e-4);
    }

    #[test]
    fn test_single_variant() {
        let (stat, p) = chi_square_equal_split(&[10]).unwrap();
        assert_eq!(stat, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_missing_column() {
        assert!(check_srm(&split(1, 1), "arm").is_err());
    }
}
