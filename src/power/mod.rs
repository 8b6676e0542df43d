//! Sample size and power computation for experiment planning.

pub mod sample_size;
pub mod simulate;

pub use sample_size::{
    calculate_sample_size, classic_two_proportion_sample_size, estimate_duration_days,
    PowerRequest, PowerResult,
};
pub use simulate::{simulate_power_two_proportion, SimulationConfig};
