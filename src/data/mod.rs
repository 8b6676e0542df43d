//! Tabular data structures and synthetic data generation.

mod dataset;
mod metric;
pub mod synthetic;

pub use dataset::{Dataset, Variable, VariableType};
pub use metric::MetricType;
pub use synthetic::{
    generate_ab_test, generate_did_panel, generate_scm_panel, AbTestConfig, DidPanelConfig,
    ScmPanelConfig,
};
