//! Statistical hypothesis testing for experiment comparisons.

pub mod bayes;
pub mod srm;
mod summary;
pub mod welch;

pub use bayes::{prob_beat_control_binary, prob_beat_control_continuous, DEFAULT_DRAWS};
pub use srm::{check_srm, chi_square_equal_split, SrmResult, SRM_THRESHOLD};
pub use summary::Summary;
pub use welch::{welch_from_summaries, welch_t_test, WelchResult};
