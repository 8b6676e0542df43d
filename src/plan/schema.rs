//! Typed experiment plan records.

use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Planning request for a two-arm conversion experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentInputs {
    /// Business goal (at least 5 characters).
    pub goal: String,
    pub baseline_rate: f64,
    pub mde_abs: f64,
    pub alpha: f64,
    pub target_power: f64,
    /// Eligible units per day; 0 when unknown.
    pub traffic_per_day: u64,
    pub allocation_treatment: f64,
    pub allocation_control: f64,
    pub randomization_unit: String,
    pub primary_metric: String,
    /// Attribution window of the primary metric, 1 to 60 days.
    pub metric_window_days: u32,
    #[serde(default)]
    pub guardrails: Vec<String>,
    #[serde(default)]
    pub segments: Vec<String>,
}

fn open_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ExperimentError::InvalidParameter(format!(
            "{} must be in (0, 1), got {}",
            name, value
        )))
    }
}

impl ExperimentInputs {
    /// Check field ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().chars().count() < 5 {
            return Err(ExperimentError::InvalidParameter(
                "goal must be at least 5 characters".to_string(),
            ));
        }
        open_unit("baseline_rate", self.baseline_rate)?;
        open_unit("mde_abs", self.mde_abs)?;
        open_unit("target_power", self.target_power)?;
        if !(self.alpha > 0.0 && self.alpha < 0.5) {
            return Err(ExperimentError::InvalidParameter(format!(
                "alpha must be in (0, 0.5), got {}",
                self.alpha
            )));
        }
        if self.baseline_rate + self.mde_abs >= 1.0 {
            return Err(ExperimentError::InvalidParameter(
                "baseline_rate + mde_abs must be below 1".to_string(),
            ));
        }
        open_unit("allocation_treatment", self.allocation_treatment)?;
        open_unit("allocation_control", self.allocation_control)?;
        if ((self.allocation_treatment + self.allocation_control) - 1.0).abs() > 1e-6 {
            return Err(ExperimentError::InvalidParameter(
                "allocation_treatment + allocation_control must be 1.0".to_string(),
            ));
        }
        if self.primary_metric.trim().is_empty() {
            return Err(ExperimentError::InvalidParameter(
                "primary_metric cannot be empty".to_string(),
            ));
        }
        if !(1..=60).contains(&self.metric_window_days) {
            return Err(ExperimentError::InvalidParameter(format!(
                "metric_window_days must be in 1..=60, got {}",
                self.metric_window_days
            )));
        }
        Ok(())
    }

    /// The smaller of the two allocations.
    pub fn min_allocation(&self) -> f64 {
        self.allocation_treatment.min(self.allocation_control)
    }

    /// First line of the goal, shortened to 75 characters.
    pub fn default_title(&self) -> String {
        let line = self.goal.trim().lines().next().unwrap_or_default();
        if line.chars().count() > 75 {
            let head: String = line.chars().take(72).collect();
            format!("{}...", head)
        } else {
            line.to_string()
        }
    }
}

/// Desired direction of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl FromStr for Direction {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "increase" => Ok(Direction::Increase),
            "decrease" => Ok(Direction::Decrease),
            other => Err(ExperimentError::InvalidParameter(format!(
                "direction must be increase or decrease, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub definition: String,
    pub direction: Direction,
    pub window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDesign {
    pub randomization_unit: String,
    pub population: String,
    #[serde(default)]
    pub exclusions: Vec<String>,
    /// How treatment is assigned and persisted.
    pub assignment: String,
    pub ramp_plan: String,
    /// Planned run length, 1 to 365 days.
    pub duration_days: u32,
}

/// Deterministic sizing that generated text may never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerPlan {
    pub test: String,
    pub alpha: f64,
    pub power: f64,
    pub baseline_rate: f64,
    pub mde_abs: f64,
    pub n_per_group: u64,
    pub total_n: u64,
    pub estimated_days: Option<u64>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    pub srm_check: String,
    pub primary_test: String,
    pub effect_reporting: String,
    pub multiple_testing_note: String,
    pub segment_policy: String,
    pub stopping_rule: String,
}

/// A complete experiment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub title: String,
    pub hypothesis: String,
    pub inputs: ExperimentInputs,
    pub primary_metric: MetricSpec,
    #[serde(default)]
    pub guardrail_metrics: Vec<MetricSpec>,
    pub design: ExperimentDesign,
    pub power: PowerPlan,
    pub analysis: AnalysisPlan,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}
