//! Monte Carlo Bayesian comparison of two arms.
//!
//! Binary metrics use Beta(1, 1) priors updated with observed successes and
//! failures. Continuous metrics approximate each arm's sampling distribution
//! with a Student-t centred at the sample mean with scale `std/√n` and
//! `n − 1` degrees of freedom. Both return P(treatment draw > control draw).

use crate::error::{ExperimentError, Result};
use crate::test::Summary;
use rand::Rng;
use rand_distr::{Beta, Distribution, StudentT};

/// Default number of posterior draws per arm.
pub const DEFAULT_DRAWS: usize = 10_000;

fn fraction_greater(treatment: &[f64], control: &[f64]) -> f64 {
    let wins = treatment
        .iter()
        .zip(control)
        .filter(|(t, c)| t > c)
        .count();
    wins as f64 / treatment.len().max(1) as f64
}

/// P(p_t > p_c) under Beta-Bernoulli posteriors.
///
/// # Arguments
/// * `treatment` - Summary of the treatment arm's 0/1 outcomes
/// * `control` - Summary of the control arm's 0/1 outcomes
/// * `draws` - Posterior draws per arm
/// * `rng` - Random source
pub fn prob_beat_control_binary<R: Rng + ?Sized>(
    treatment: &Summary,
    control: &Summary,
    draws: usize,
    rng: &mut R,
) -> Result<f64> {
    let posterior = |s: &Summary| -> Result<Beta<f64>> {
        let successes = s.sum();
        let alpha = 1.0 + successes;
        let beta = 1.0 + s.n as f64 - successes;
        if !(alpha > 0.0 && beta > 0.0) {
            return Err(ExperimentError::Numerical(format!(
                "invalid Beta posterior ({}, {}); binary metric must hold 0/1 values",
                alpha, beta
            )));
        }
        Beta::new(alpha, beta).map_err(ExperimentError::distribution)
    };

    let post_c = posterior(control)?;
    let post_t = posterior(treatment)?;

    let sim_c: Vec<f64> = (0..draws).map(|_| post_c.sample(rng)).collect();
    let sim_t: Vec<f64> = (0..draws).map(|_| post_t.sample(rng)).collect();
    Ok(fraction_greater(&sim_t, &sim_c))
}

/// P(μ_t > μ_c) under Student-t approximations of each arm's mean.
///
/// Returns 0.5 without drawing when either arm has zero or undefined spread.
pub fn prob_beat_control_continuous<R: Rng + ?Sized>(
    treatment: &Summary,
    control: &Summary,
    draws: usize,
    rng: &mut R,
) -> Result<f64> {
    let informative = |s: &Summary| s.n > 1 && s.std_dev().is_finite() && s.std_dev() > 0.0;
    if !informative(treatment) || !informative(control) {
        return Ok(0.5);
    }

    let sample_arm = |s: &Summary, rng: &mut R| -> Result<Vec<f64>> {
        let t = StudentT::new((s.n - 1) as f64).map_err(ExperimentError::distribution)?;
        let scale = s.std_dev() / (s.n as f64).sqrt();
        Ok((0..draws).map(|_| s.mean + scale * t.sample(rng)).collect())
    };

    let sim_c = sample_arm(control, &mut *rng)?;
    let sim_t = sample_arm(treatment, &mut *rng)?;
    Ok(fraction_greater(&sim_t, &sim_c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded_rng;

    fn bernoulli(successes: usize, n: usize) -> Summary {
        let mut v = vec![1.0; successes];
        v.extend(vec![0.0; n - successes]);
        Summary::of(&v)
    }

    #[test]
    fn test_binary_clear_winner() {
        let mut rng = seeded_rng(Some(1));
        let p = prob_beat_control_binary(&bernoulli(150, 1000), &bernoulli(100, 1000), DEFAULT_DRAWS, &mut rng)
            .unwrap();
        assert!(p > 0.99, "p = {}", p);
    }

    #[test]
    fn test_binary_equal_arms_near_half() {
        let mut rng = seeded_rng(Some(2));
        let p = prob_beat_control_binary(&bernoulli(100, 1000), &bernoulli(100, 1000), DEFAULT_DRAWS, &mut rng)
            .unwrap();
        assert!((0.45..=0.55).contains(&p), "p = {}", p);
    }

    #[test]
    fn test_binary_rejects_non_binary_values() {
        let mut rng = seeded_rng(Some(3));
        let weird = Summary::of(&[5.0, 7.0]);
        assert!(prob_beat_control_binary(&weird, &bernoulli(1, 2), 10, &mut rng).is_err());
    }

    #[test]
    fn test_continuous_loser() {
        let mut rng = seeded_rng(Some(4));
        let t = Summary::of(&[9.0, 10.0, 11.0, 9.5, 10.5]);
        let c = Summary::of(&[14.0, 15.0, 16.0, 14.5, 15.5]);
        let p = prob_beat_control_continuous(&t, &c, DEFAULT_DRAWS, &mut rng).unwrap();
        assert!(p < 0.01, "p = {}", p);
    }

    #[test]
    fn test_continuous_zero_variance_is_uninformative() {
        let mut rng = seeded_rng(Some(5));
        let t = Summary::of(&[1.0, 1.0, 1.0]);
        let c = Summary::of(&[0.0, 1.0, 2.0]);
        assert_eq!(prob_beat_control_continuous(&t, &c, DEFAULT_DRAWS, &mut rng).unwrap(), 0.5);
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let t = Summary::of(&[1.0, 2.0, 3.0, 4.0]);
        let c = Summary::of(&[1.5, 2.0, 2.5, 3.0]);
        let a = prob_beat_control_continuous(&t, &c, 1000, &mut seeded_rng(Some(9))).unwrap();
        let b = prob_beat_control_continuous(&t, &c, 1000, &mut seeded_rng(Some(9))).unwrap();
        assert_eq!(a, b);
    }
}
