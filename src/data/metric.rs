//! Metric kinds shared by planning and analysis.

use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of outcome metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// 0/1 outcome such as conversion.
    Binary,
    /// Real-valued outcome such as revenue.
    Continuous,
}

impl MetricType {
    /// Get the descriptive name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Binary => "binary",
            MetricType::Continuous => "continuous",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(MetricType::Binary),
            "continuous" => Ok(MetricType::Continuous),
            other => Err(ExperimentError::InvalidParameter(format!(
                "unknown metric type '{}' (expected binary or continuous)",
                other
            ))),
        }
    }
}
