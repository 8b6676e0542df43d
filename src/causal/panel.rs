//! Time handling shared by the panel estimators.

use crate::data::{Dataset, Variable};
use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point on a panel's time axis: a number (year, period index) or a
/// label compared lexicographically (ISO dates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimePoint {
    Number(f64),
    Label(String),
}

impl TimePoint {
    /// Time point of a cell; `None` when missing.
    pub fn from_cell(cell: &Variable) -> Option<Self> {
        match cell {
            Variable::Continuous(v) => Some(TimePoint::Number(*v)),
            Variable::Categorical(s) => Some(TimePoint::Label(s.clone())),
            Variable::Missing => None,
        }
    }

    /// Parse a command-line value: numeric when it parses as a number.
    pub fn parse(s: &str) -> Self {
        match s.trim().parse::<f64>() {
            Ok(v) => TimePoint::Number(v),
            Err(_) => TimePoint::Label(s.trim().to_string()),
        }
    }

    /// Order two time points.
    ///
    /// A label is compared numerically against a number when it parses as
    /// one; otherwise the pair is incomparable.
    pub fn compare(&self, other: &TimePoint) -> Result<Ordering> {
        let ord = match (self, other) {
            (TimePoint::Number(a), TimePoint::Number(b)) => a.partial_cmp(b),
            (TimePoint::Label(a), TimePoint::Label(b)) => Some(a.cmp(b)),
            (TimePoint::Number(a), TimePoint::Label(b)) => b.parse::<f64>().ok().and_then(|b| a.partial_cmp(&b)),
            (TimePoint::Label(a), TimePoint::Number(b)) => a.parse::<f64>().ok().and_then(|a| a.partial_cmp(b)),
        };
        ord.ok_or_else(|| {
            ExperimentError::InvalidParameter(format!("cannot compare time points {} and {}", self, other))
        })
    }

    /// Whether `self >= start`.
    pub fn at_or_after(&self, start: &TimePoint) -> Result<bool> {
        Ok(self.compare(start)? != Ordering::Less)
    }

    /// JSON value for result details.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TimePoint::Number(v) => serde_json::json!(v),
            TimePoint::Label(s) => serde_json::json!(s),
        }
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePoint::Number(v) => write!(f, "{}", v),
            TimePoint::Label(s) => f.write_str(s),
        }
    }
}

impl From<f64> for TimePoint {
    fn from(v: f64) -> Self {
        TimePoint::Number(v)
    }
}

impl From<&str> for TimePoint {
    fn from(s: &str) -> Self {
        TimePoint::Label(s.to_string())
    }
}

/// Time points of a column, `None` for missing cells.
pub fn time_points(dataset: &Dataset, column: &str) -> Result<Vec<Option<TimePoint>>> {
    Ok(dataset.column(column)?.iter().map(TimePoint::from_cell).collect())
}

/// Sort and de-duplicate time points.
pub fn sorted_unique(points: &[TimePoint]) -> Result<Vec<TimePoint>> {
    let mut sorted = points.to_vec();
    let mut failure = None;
    sorted.sort_by(|a, b| {
        a.compare(b).unwrap_or_else(|e| {
            if failure.is_none() {
                failure = Some(e);
            }
            Ordering::Equal
        })
    });
    if let Some(e) = failure {
        return Err(e);
    }
    sorted.dedup();
    Ok(sorted)
}
