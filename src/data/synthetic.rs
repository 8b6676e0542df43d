//! Synthetic dataset generation for demos and testing.
//!
//! Generates A/B test, difference-in-differences and synthetic-control
//! datasets with a known injected effect.

use crate::data::Dataset;
use crate::error::{ExperimentError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Configuration for a randomized A/B test with a binary outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestConfig {
    /// Number of users.
    pub n_users: usize,
    /// Conversion rate in the control group.
    pub base_rate: f64,
    /// Absolute conversion lift in the treatment group.
    pub lift: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for AbTestConfig {
    fn default() -> Self {
        Self {
            n_users: 100,
            base_rate: 0.1,
            lift: 0.02,
            seed: 42,
        }
    }
}

impl AbTestConfig {
    /// Set the number of users.
    pub fn with_users(mut self, n_users: usize) -> Self {
        self.n_users = n_users;
        self
    }

    /// Set base rate and lift.
    pub fn with_rates(mut self, base_rate: f64, lift: f64) -> Self {
        self.base_rate = base_rate;
        self.lift = lift;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Configuration for a unit × time panel with a treated × post interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidPanelConfig {
    /// Number of sampled (unit, time) rows.
    pub n_rows: usize,
    /// Number of units; units above half are treated.
    pub n_units: u32,
    /// First and last period (inclusive).
    pub periods: (i64, i64),
    /// First post-intervention period.
    pub post_start: i64,
    /// Injected treated × post effect.
    pub att: f64,
    /// Standard deviation of the outcome noise.
    pub noise_sd: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for DidPanelConfig {
    fn default() -> Self {
        Self {
            n_rows: 100,
            n_units: 20,
            periods: (2020, 2025),
            post_start: 2023,
            att: 30.0,
            noise_sd: 5.0,
            seed: 42,
        }
    }
}

/// Configuration for a synthetic-control panel of cities observed yearly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmPanelConfig {
    /// Unit names; the first one is treated.
    pub units: Vec<String>,
    /// First and last year (inclusive).
    pub years: (i64, i64),
    /// Intervention year.
    pub intervention: i64,
    /// Lift added to the treated unit from the intervention on.
    pub lift: f64,
    /// Standard deviation of the outcome noise.
    pub noise_sd: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for ScmPanelConfig {
    fn default() -> Self {
        Self {
            units: ["City_A", "City_B", "City_C", "City_D", "City_E"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            years: (2015, 2025),
            intervention: 2023,
            lift: 25.0,
            noise_sd: 2.0,
            seed: 42,
        }
    }
}

impl ScmPanelConfig {
    /// Name of the treated unit.
    pub fn treated_unit(&self) -> Option<&str> {
        self.units.first().map(String::as_str)
    }
}

fn noise(sd: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, sd).map_err(ExperimentError::distribution)
}

/// Generate a binary-outcome A/B test with columns `group` and `converted`.
pub fn generate_ab_test(config: &AbTestConfig) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut groups = Vec::with_capacity(config.n_users);
    let mut converted = Vec::with_capacity(config.n_users);

    for _ in 0..config.n_users {
        let is_treatment = rng.gen::<f64>() > 0.5;
        let rate = config.base_rate + if is_treatment { config.lift } else { 0.0 };
        groups.push(if is_treatment { "Treatment" } else { "Control" });
        converted.push(if rng.gen::<f64>() < rate { 1.0 } else { 0.0 });
    }

    Dataset::new()
        .with_categorical("group", groups)?
        .with_continuous("converted", converted)
}

/// Generate a DiD panel with columns `unit`, `time`, `treat` and `y`.
///
/// `y = 100 + 2·unit + 5·(time − t0) + 10·treat + 5·post + att·treat·post + ε`
pub fn generate_did_panel(config: &DidPanelConfig) -> Result<Dataset> {
    if config.n_units < 2 || config.periods.1 < config.periods.0 {
        return Err(ExperimentError::InvalidParameter(
            "DiD panel needs at least two units and a non-empty period range".to_string(),
        ));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let eps = noise(config.noise_sd)?;
    let half = config.n_units / 2;

    let mut units = Vec::with_capacity(config.n_rows);
    let mut times = Vec::with_capacity(config.n_rows);
    let mut treats = Vec::with_capacity(config.n_rows);
    let mut ys = Vec::with_capacity(config.n_rows);

    for _ in 0..config.n_rows {
        let unit = rng.gen_range(1..=config.n_units);
        let time = rng.gen_range(config.periods.0..=config.periods.1);
        let treat = if unit > half { 1.0 } else { 0.0 };
        let post = if time >= config.post_start { 1.0 } else { 0.0 };
        let y = 100.0
            + unit as f64 * 2.0
            + (time - config.periods.0) as f64 * 5.0
            + treat * 10.0
            + post * 5.0
            + treat * post * config.att
            + eps.sample(&mut rng);

        units.push(unit as f64);
        times.push(time as f64);
        treats.push(treat);
        ys.push((y * 100.0).round() / 100.0);
    }

    Dataset::new()
        .with_continuous("unit", units)?
        .with_continuous("time", times)?
        .with_continuous("treat", treats)?
        .with_continuous("y", ys)
}

/// Generate an SCM panel with columns `unit`, `time` and `y`.
///
/// Every unit gets a random level in 10..=50 on top of a shared linear trend.
pub fn generate_scm_panel(config: &ScmPanelConfig) -> Result<Dataset> {
    let treated = config.treated_unit().ok_or_else(|| {
        ExperimentError::InvalidParameter("SCM panel needs at least one unit".to_string())
    })?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let eps = noise(config.noise_sd)?;

    let mut units = Vec::new();
    let mut times = Vec::new();
    let mut ys = Vec::new();

    for unit in &config.units {
        let unit_effect = rng.gen_range(10..=50) as f64;
        for year in config.years.0..=config.years.1 {
            let trend = (year - config.years.0) as f64 * 2.0;
            let mut y = 100.0 + unit_effect + trend + eps.sample(&mut rng);
            if unit == treated && year >= config.intervention {
                y += config.lift;
            }
            units.push(unit.clone());
            times.push(year as f64);
            ys.push((y * 100.0).round() / 100.0);
        }
    }

    Dataset::new()
        .with_categorical("unit", units)?
        .with_continuous("time", times)?
        .with_continuous("y", ys)
}
