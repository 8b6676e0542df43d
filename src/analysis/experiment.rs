//! Experiment analysis: SRM check, optional CUPED, per-variant statistics
//! and comparison of every variant to control.

use crate::analysis::result::{AnalysisResult, ExperimentAnalysis};
use crate::data::{Dataset, MetricType};
use crate::error::{ExperimentError, Result};
use crate::random::seeded_rng;
use crate::test::{
    chi_square_equal_split, prob_beat_control_binary, prob_beat_control_continuous,
    welch_from_summaries, Summary, DEFAULT_DRAWS, SRM_THRESHOLD,
};
use crate::variance::apply_cuped;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Significance level for the frequentist comparison.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Normal critical value used for the 95% interval of the mean difference.
const CI_Z: f64 = 1.96;

/// Inference framework for comparing variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// Welch t-test, p-value and confidence interval.
    #[default]
    Frequentist,
    /// Monte Carlo probability of beating control.
    Bayesian,
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisType::Frequentist => f.write_str("frequentist"),
            AnalysisType::Bayesian => f.write_str("bayesian"),
        }
    }
}

impl FromStr for AnalysisType {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frequentist" => Ok(AnalysisType::Frequentist),
            "bayesian" => Ok(AnalysisType::Bayesian),
            other => Err(ExperimentError::InvalidParameter(format!(
                "unknown analysis type '{}' (expected frequentist or bayesian)",
                other
            ))),
        }
    }
}

fn default_control() -> String {
    "Control".to_string()
}

fn default_metric_type() -> MetricType {
    MetricType::Continuous
}

fn default_draws() -> usize {
    DEFAULT_DRAWS
}

/// Configuration for [`analyze_experiment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Outcome column.
    pub metric_col: String,
    /// Column holding the variant label of each row.
    pub variant_col: String,
    /// Kind of outcome.
    #[serde(default = "default_metric_type")]
    pub metric_type: MetricType,
    /// Label of the control variant.
    #[serde(default = "default_control")]
    pub control_label: String,
    /// Optional pre-experiment covariate for CUPED.
    #[serde(default)]
    pub covariate_col: Option<String>,
    #[serde(default)]
    pub analysis_type: AnalysisType,
    /// Seed for the Bayesian draws.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Posterior draws per arm.
    #[serde(default = "default_draws")]
    pub draws: usize,
}

impl AnalysisConfig {
    /// Frequentist analysis of a continuous metric against `"Control"`.
    pub fn new(metric_col: &str, variant_col: &str) -> Self {
        Self {
            metric_col: metric_col.to_string(),
            variant_col: variant_col.to_string(),
            metric_type: default_metric_type(),
            control_label: default_control(),
            covariate_col: None,
            analysis_type: AnalysisType::default(),
            seed: None,
            draws: DEFAULT_DRAWS,
        }
    }

    pub fn with_metric_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = metric_type;
        self
    }

    pub fn with_control(mut self, label: &str) -> Self {
        self.control_label = label.to_string();
        self
    }

    pub fn with_covariate(mut self, column: &str) -> Self {
        self.covariate_col = Some(column.to_string());
        self
    }

    pub fn with_analysis_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }

    pub fn bayesian(self) -> Self {
        self.with_analysis_type(AnalysisType::Bayesian)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_draws(mut self, draws: usize) -> Self {
        self.draws = draws;
        self
    }
}

/// Analyze an A/B(/n) experiment.
///
/// Runs an SRM check, applies CUPED when a covariate is configured, resolves
/// the control variant and compares every other variant to it. Recoverable
/// problems (SRM, CUPED skipped, control substituted, a failed per-variant
/// test) are collected in `warnings`.
///
/// # Errors
/// Missing metric or variant column, a categorical metric column, or a
/// dataset with no variant labels.
///
/// # Example
/// ```
/// use abcausal::analysis::{analyze_experiment, AnalysisConfig};
/// use abcausal::data::{generate_ab_test, AbTestConfig, MetricType};
///
/// let data = generate_ab_test(&AbTestConfig::default()).unwrap();
/// let config = AnalysisConfig::new("converted", "group").with_metric_type(MetricType::Binary);
/// let analysis = analyze_experiment(&data, &config).unwrap();
/// assert_eq!(analysis.control_variant, "Control");
/// ```
pub fn analyze_experiment(dataset: &Dataset, config: &AnalysisConfig) -> Result<ExperimentAnalysis> {
    dataset.require_columns(&[config.metric_col.as_str(), config.variant_col.as_str()])?;

    let labels = dataset.labels(&config.variant_col)?;
    let variants = dataset.distinct(&config.variant_col)?;
    if variants.is_empty() {
        return Err(ExperimentError::EmptyData(format!(
            "no variant labels in column '{}'",
            config.variant_col
        )));
    }

    let mut warnings = Vec::new();

    // SRM over non-missing variant rows.
    let counts: Vec<usize> = variants
        .iter()
        .map(|v| labels.iter().filter(|l| l.as_deref() == Some(v.as_str())).count())
        .collect();
    let (_, srm_p_value) = chi_square_equal_split(&counts)?;
    let srm_warning = srm_p_value < SRM_THRESHOLD;
    if srm_warning {
        let msg = format!(
            "SRM detected (p={:.4}). Sample ratios differ significantly from an equal split.",
            srm_p_value
        );
        warn!("{}", msg);
        warnings.push(msg);
    }

    let raw = dataset.numeric(&config.metric_col)?;
    let (metric, cuped_theta) = match &config.covariate_col {
        Some(cov) => cuped_metric(dataset, raw, cov, &mut warnings),
        None => (raw, None),
    };

    let (control, control_substituted) = if variants.iter().any(|v| *v == config.control_label) {
        (config.control_label.clone(), false)
    } else {
        let fallback = variants[0].clone();
        let msg = format!(
            "Control label '{}' not found; using '{}' as control",
            config.control_label, fallback
        );
        warn!("{}", msg);
        warnings.push(msg);
        (fallback, true)
    };

    // Control first, then the other variants in first-seen order.
    let ordered: Vec<&String> = std::iter::once(&control)
        .chain(variants.iter().filter(|v| **v != control))
        .collect();

    let arm = |variant: &str| -> (usize, Summary) {
        let mut rows = 0;
        let mut values = Vec::new();
        for (label, value) in labels.iter().zip(&metric) {
            if label.as_deref() == Some(variant) {
                rows += 1;
                if let Some(v) = value {
                    values.push(*v);
                }
            }
        }
        (rows, Summary::of(&values))
    };

    let (control_rows, control_summary) = arm(&control);
    let mut rng = seeded_rng(config.seed);
    let mut results = Vec::with_capacity(ordered.len());
    results.push(describe(&control, control_rows, &control_summary));

    for variant in ordered.into_iter().skip(1) {
        let (rows, summary) = arm(variant);
        let mut res = describe(variant, rows, &summary);
        res.srm_p_value = Some(srm_p_value);
        res.lift = Some(relative_lift(summary.mean, control_summary.mean));

        let outcome = match config.analysis_type {
            AnalysisType::Frequentist => compare_frequentist(&mut res, &summary, &control_summary),
            AnalysisType::Bayesian => compare_bayesian(
                &mut res,
                &summary,
                &control_summary,
                config.metric_type,
                config.draws,
                &mut rng,
            ),
        };
        if let Err(e) = outcome {
            let msg = format!("Test failed for {}: {}", variant, e);
            warn!("{}", msg);
            warnings.push(msg);
        }
        results.push(res);
    }

    Ok(ExperimentAnalysis {
        control_variant: control,
        results,
        srm_warning,
        srm_p_value,
        control_substituted,
        cuped_theta,
        warnings,
    })
}

/// CUPED-adjusted metric, or the raw metric plus a warning.
fn cuped_metric(
    dataset: &Dataset,
    raw: Vec<Option<f64>>,
    covariate_col: &str,
    warnings: &mut Vec<String>,
) -> (Vec<Option<f64>>, Option<f64>) {
    if !dataset.has_column(covariate_col) {
        let msg = format!("CUPED skipped: covariate column '{}' not found", covariate_col);
        warn!("{}", msg);
        warnings.push(msg);
        return (raw, None);
    }

    let adjusted = dataset
        .numeric(covariate_col)
        .and_then(|x| apply_cuped(&raw, &x));
    match adjusted {
        Ok(adj) => {
            debug!(
                theta = adj.theta,
                variance_reduction = adj.variance_reduction(&raw),
                "CUPED applied"
            );
            let theta = adj.theta;
            (adj.values, Some(theta))
        }
        Err(e) => {
            let msg = format!("CUPED failed: {}", e);
            warn!("{}", msg);
            warnings.push(msg);
            (raw, None)
        }
    }
}

fn describe(variant: &str, rows: usize, summary: &Summary) -> AnalysisResult {
    let std_dev = if summary.n > 1 { Some(summary.std_dev()) } else { None };
    AnalysisResult::new(variant.to_string(), rows, summary.mean, std_dev)
}

/// `(mean − control) / |control|`, zero when the control mean is zero.
pub fn relative_lift(mean: f64, control_mean: f64) -> f64 {
    if control_mean != 0.0 {
        (mean - control_mean) / control_mean.abs()
    } else {
        0.0
    }
}

fn compare_frequentist(res: &mut AnalysisResult, treatment: &Summary, control: &Summary) -> Result<()> {
    let welch = welch_from_summaries(treatment, control)?;
    res.p_value = Some(welch.p_value);
    res.is_significant = welch.p_value < SIGNIFICANCE_LEVEL;
    res.ci_lower = Some(welch.mean_diff - CI_Z * welch.std_error);
    res.ci_upper = Some(welch.mean_diff + CI_Z * welch.std_error);
    Ok(())
}

fn compare_bayesian<R: Rng + ?Sized>(
    res: &mut AnalysisResult,
    treatment: &Summary,
    control: &Summary,
    metric_type: MetricType,
    draws: usize,
    rng: &mut R,
) -> Result<()> {
    let prob = match metric_type {
        MetricType::Binary => prob_beat_control_binary(treatment, control, draws, rng)?,
        MetricType::Continuous => prob_beat_control_continuous(treatment, control, draws, rng)?,
    };
    res.prob_beat_control = Some(prob);
    Ok(())
}
