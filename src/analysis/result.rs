//! Result types for experiment analysis.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Per-variant statistics and comparison to control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Variant label
    pub variant: String,
    /// Rows assigned to the variant
    pub sample_size: usize,
    /// Mean of the (possibly CUPED-adjusted) metric
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two values
    pub std_dev: Option<f64>,
    /// Relative lift over control
    pub lift: Option<f64>,
    /// Welch t-test p-value
    pub p_value: Option<f64>,
    /// Lower bound of the 95% CI for the mean difference
    pub ci_lower: Option<f64>,
    /// Upper bound of the 95% CI for the mean difference
    pub ci_upper: Option<f64>,
    /// Monte Carlo P(variant > control)
    pub prob_beat_control: Option<f64>,
    /// Whether p < 0.05
    pub is_significant: bool,
    /// SRM p-value (non-control rows only)
    pub srm_p_value: Option<f64>,
}

impl AnalysisResult {
    /// Descriptive statistics only; comparison fields left empty.
    pub fn new(variant: String, sample_size: usize, mean: f64, std_dev: Option<f64>) -> Self {
        Self {
            variant,
            sample_size,
            mean,
            std_dev,
            lift: None,
            p_value: None,
            ci_lower: None,
            ci_upper: None,
            prob_beat_control: None,
            is_significant: false,
            srm_p_value: None,
        }
    }
}

/// Full result of analyzing one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    /// Label actually used as control
    pub control_variant: String,
    /// One entry per variant, control first
    pub results: Vec<AnalysisResult>,
    /// Whether SRM was detected (p < 0.001)
    pub srm_warning: bool,
    /// SRM chi-square p-value
    pub srm_p_value: f64,
    /// Whether the requested control label was absent and replaced
    pub control_substituted: bool,
    /// CUPED slope, when the adjustment was applied
    pub cuped_theta: Option<f64>,
    /// Non-fatal issues encountered during the analysis
    pub warnings: Vec<String>,
}

impl ExperimentAnalysis {
    /// The control row.
    pub fn control(&self) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.variant == self.control_variant)
    }

    /// Non-control rows in result order.
    pub fn treatments(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results
            .iter()
            .filter(move |r| r.variant != self.control_variant)
    }

    /// Result for a variant label.
    pub fn variant(&self, label: &str) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.variant == label)
    }

    /// Non-control rows flagged significant.
    pub fn significant(&self) -> Vec<&AnalysisResult> {
        self.treatments().filter(|r| r.is_significant).collect()
    }

    /// Write per-variant results to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "variant\tsample_size\tmean\tstd_dev\tlift\tp_value\tci_lower\tci_upper\tprob_beat_control\tis_significant"
        )?;

        let opt = |v: Option<f64>| v.map(|x| format!("{:.6}", x)).unwrap_or_default();
        for r in &self.results {
            writeln!(
                writer,
                "{}\t{}\t{:.6}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.variant,
                r.sample_size,
                r.mean,
                opt(r.std_dev),
                opt(r.lift),
                r.p_value.map(|p| format!("{:.2e}", p)).unwrap_or_default(),
                opt(r.ci_lower),
                opt(r.ci_upper),
                opt(r.prob_beat_control),
                r.is_significant
            )?;
        }
        writer.flush()?;

        Ok(())
    }
}

impl std::fmt::Display for ExperimentAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Control: {}", self.control_variant)?;
        writeln!(
            f,
            "SRM p-value: {:.4}{}",
            self.srm_p_value,
            if self.srm_warning { " (MISMATCH)" } else { "" }
        )?;
        if let Some(theta) = self.cuped_theta {
            writeln!(f, "CUPED theta: {:.4}", theta)?;
        }
        for r in &self.results {
            write!(f, "  {:<12} n={:<7} mean={:.4}", r.variant, r.sample_size, r.mean)?;
            if let Some(lift) = r.lift {
                write!(f, "  lift={:+.2}%", lift * 100.0)?;
            }
            if let Some(p) = r.p_value {
                write!(f, "  p={:.4}", p)?;
            }
            if let Some(prob) = r.prob_beat_control {
                write!(f, "  P(beat)={:.3}", prob)?;
            }
            if r.is_significant {
                write!(f, "  *")?;
            }
            writeln!(f)?;
        }
        for w in &self.warnings {
            writeln!(f, "Warning: {}", w)?;
        }
        Ok(())
    }
}
