//! Experiment design, A/B test analysis and observational causal inference.
//!
//! The library is organized into composable modules:
//!
//! - **data**: Tabular datasets, CSV I/O and synthetic generators
//! - **power**: Sample size calculation and simulated power
//! - **test**: Welch t-test, sample ratio mismatch and Bayesian comparisons
//! - **variance**: CUPED variance reduction
//! - **analysis**: Per-variant experiment analysis and segment drill-down
//! - **model**: Linear (OLS / ridge / lasso) and tree-ensemble regressors
//! - **causal**: Difference-in-differences, synthetic control and T-learner HTE
//! - **plan**: Experiment plans with deterministic sizing
//! - **pipeline**: YAML job files
//!
//! # Example
//!
//! ```no_run
//! use abcausal::prelude::*;
//!
//! let data = Dataset::from_csv("experiment.csv").unwrap();
//! let config = AnalysisConfig::new("revenue", "variant").with_covariate("revenue_pre");
//! let analysis = analyze_experiment(&data, &config).unwrap();
//! println!("{}", analysis);
//!
//! let plan = calculate_sample_size(&PowerRequest::binary(0.05, 0.01)).unwrap();
//! println!("{} users per group", plan.n_per_group);
//! ```

pub mod analysis;
pub mod causal;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod power;
pub mod random;
pub mod test;
pub mod variance;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::analysis::{
        analyze_experiment, auto_drill_down, AnalysisConfig, AnalysisResult, AnalysisType,
        DrillDownInsight, ExperimentAnalysis,
    };
    pub use crate::causal::{
        analyze_observational, find_sensitive_segments, CausalResult, DifferenceInDifferences,
        HteLearner, MethodKind, ObservationalMethod, ScmMethod, SegmentInsight, SyntheticControl,
        TimePoint,
    };
    pub use crate::data::{
        generate_ab_test, generate_did_panel, generate_scm_panel, AbTestConfig, Dataset,
        DidPanelConfig, MetricType, ScmPanelConfig, Variable, VariableType,
    };
    pub use crate::error::{ExperimentError, Result};
    pub use crate::model::{LinearRegressor, Penalty, RandomForestRegressor, Regressor};
    pub use crate::pipeline::{Job, JobConfig, JobOutput};
    pub use crate::plan::{
        CriticService, ExperimentInputs, ExperimentSpec, PlanService, TextGenerator,
    };
    pub use crate::power::{
        calculate_sample_size, estimate_duration_days, simulate_power_two_proportion,
        PowerRequest, PowerResult, SimulationConfig,
    };
    pub use crate::test::{check_srm, welch_t_test, SrmResult, WelchResult};
    pub use crate::variance::{apply_cuped, CupedAdjustment};
}
