//! Variance reduction for experiment metrics.

pub mod cuped;

pub use cuped::{apply_cuped, CupedAdjustment};
