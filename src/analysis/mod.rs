//! Analysis of randomized experiments.

pub mod drill_down;
pub mod experiment;
mod result;

pub use drill_down::{auto_drill_down, DrillDownInsight, MIN_SEGMENT_ROWS};
pub use experiment::{analyze_experiment, relative_lift, AnalysisConfig, AnalysisType, SIGNIFICANCE_LEVEL};
pub use result::{AnalysisResult, ExperimentAnalysis};
