//! Segment drill-down: re-run the analysis inside each segment and report
//! significant effects.

use crate::analysis::experiment::{analyze_experiment, AnalysisConfig};
use crate::data::{Dataset, MetricType};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Segments with fewer rows than this are not analyzed.
pub const MIN_SEGMENT_ROWS: usize = 10;

/// A significant variant effect inside one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillDownInsight {
    pub segment_col: String,
    pub segment_value: String,
    pub variant: String,
    pub lift: f64,
    pub p_value: f64,
    pub message: String,
}

/// Scan segment columns for significant variant effects.
///
/// Every distinct value of every segment column with at least
/// [`MIN_SEGMENT_ROWS`] rows gets its own frequentist analysis. Unknown
/// segment columns, small segments and segments whose analysis fails are
/// skipped.
///
/// # Errors
/// Only when the metric or variant column is missing from the dataset.
pub fn auto_drill_down(
    dataset: &Dataset,
    metric_col: &str,
    variant_col: &str,
    control_label: &str,
    segment_cols: &[&str],
    metric_type: MetricType,
) -> Result<Vec<DrillDownInsight>> {
    dataset.require_columns(&[metric_col, variant_col])?;

    let config = AnalysisConfig::new(metric_col, variant_col)
        .with_control(control_label)
        .with_metric_type(metric_type);

    let mut insights = Vec::new();
    for &col in segment_cols {
        let Ok(values) = dataset.distinct(col) else {
            debug!(column = col, "segment column not found, skipping");
            continue;
        };

        for value in values {
            let segment = dataset.filter_eq(col, &value)?;
            if segment.n_rows() < MIN_SEGMENT_ROWS {
                debug!(column = col, value = %value, rows = segment.n_rows(), "segment too small");
                continue;
            }

            let analysis = match analyze_experiment(&segment, &config) {
                Ok(a) => a,
                Err(e) => {
                    debug!(column = col, value = %value, error = %e, "segment analysis failed");
                    continue;
                }
            };

            for r in analysis.significant() {
                let (Some(lift), Some(p_value)) = (r.lift, r.p_value) else {
                    continue;
                };
                insights.push(DrillDownInsight {
                    segment_col: col.to_string(),
                    segment_value: value.clone(),
                    variant: r.variant.clone(),
                    lift,
                    p_value,
                    message: format!(
                        "Significant effect found in {}={} (Lift: {:.2}%)",
                        col,
                        value,
                        lift * 100.0
                    ),
                });
            }
        }
    }

    Ok(insights)
}
