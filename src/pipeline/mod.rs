//! YAML-driven batch execution of planning and analysis jobs.

mod runner;

pub use runner::{render_outputs, Job, JobConfig, JobOutput};
