//! Experiment planning: deterministic sizing plus optional generated wording.

pub mod critic;
pub mod generator;
pub mod planner;
pub mod schema;

pub use critic::CriticService;
pub use generator::{JsonFileGenerator, TextGenerator};
pub use planner::{fallback_spec, power_plan, PlanOutcome, PlanService, PlanSource, MIN_DURATION_DAYS};
pub use schema::{
    AnalysisPlan, Direction, ExperimentDesign, ExperimentInputs, ExperimentSpec, MetricSpec,
    PowerPlan,
};
