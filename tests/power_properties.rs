//! Property tests for sample size monotonicity and CUPED invariants.

use abcausal::power::{calculate_sample_size, estimate_duration_days, PowerRequest};
use abcausal::variance::apply_cuped;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_larger_mde_needs_fewer_users(
        baseline in 0.02f64..0.5,
        mde in 0.005f64..0.05,
        factor in 1.1f64..3.0,
    ) {
        let small = calculate_sample_size(&PowerRequest::binary(baseline, mde)).unwrap();
        let large = calculate_sample_size(&PowerRequest::binary(baseline, mde * factor)).unwrap();
        prop_assert!(large.n_per_group <= small.n_per_group);
        prop_assert!(large.n_per_group >= 1);
        prop_assert_eq!(small.total_n, 2 * small.n_per_group);
    }

    #[test]
    fn prop_higher_power_needs_more_users(
        baseline in 0.05f64..0.4,
        mde in 0.01f64..0.05,
        power in 0.5f64..0.9,
    ) {
        let low = calculate_sample_size(&PowerRequest::binary(baseline, mde).with_power(power)).unwrap();
        let high = calculate_sample_size(&PowerRequest::binary(baseline, mde).with_power(power + 0.05)).unwrap();
        prop_assert!(high.n_per_group >= low.n_per_group);
    }

    #[test]
    fn prop_cuped_never_increases_sample_size(
        mean in 10.0f64..100.0,
        sd in 1.0f64..20.0,
        mde in 0.5f64..5.0,
        rho in 0.3f64..0.95,
    ) {
        let plain = PowerRequest::continuous(mean, mde).with_std_dev(sd);
        let base = calculate_sample_size(&plain).unwrap();
        let reduced = calculate_sample_size(&plain.clone().with_cuped(rho)).unwrap();
        prop_assert!(reduced.n_per_group <= base.n_per_group);
    }

    #[test]
    fn prop_duration_covers_sample(total in 1u64..1_000_000, traffic in 1.0f64..50_000.0) {
        let days = estimate_duration_days(total, traffic).unwrap();
        prop_assert!(days as f64 * traffic >= total as f64 - 1e-6);
        prop_assert!(((days - 1) as f64) * traffic < total as f64);
    }

    #[test]
    fn prop_cuped_preserves_mean(
        pairs in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 3..60),
    ) {
        let covariate: Vec<Option<f64>> = pairs.iter().map(|p| Some(p.0)).collect();
        let metric: Vec<Option<f64>> = pairs.iter().map(|p| Some(p.0 * 0.8 + p.1)).collect();
        prop_assume!(pairs.iter().any(|p| (p.0 - pairs[0].0).abs() > 1e-3));

        let adj = apply_cuped(&metric, &covariate).unwrap();
        let raw_mean: f64 = metric.iter().flatten().sum::<f64>() / pairs.len() as f64;
        let adj_mean: f64 = adj.values.iter().flatten().sum::<f64>() / pairs.len() as f64;
        prop_assert!((raw_mean - adj_mean).abs() < 1e-6 * (1.0 + raw_mean.abs()));
        prop_assert_eq!(adj.n_valid, pairs.len());
    }

    #[test]
    fn prop_cuped_strictly_reduces_correlated_variance(
        xs in prop::collection::vec(-50.0f64..50.0, 5..60),
        noise_seed in 0usize..1000,
        slope in 0.5f64..3.0,
        negative in any::<bool>(),
    ) {
        prop_assume!(sample_variance(&xs) > 25.0);
        let slope = if negative { -slope } else { slope };
        let metric: Vec<Option<f64>> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| Some(slope * x + (((i + noise_seed) * 7919) % 101) as f64 / 20.0))
            .collect();
        let covariate: Vec<Option<f64>> = xs.iter().copied().map(Some).collect();

        let adj = apply_cuped(&metric, &covariate).unwrap();
        let before: Vec<f64> = metric.iter().flatten().copied().collect();
        let after: Vec<f64> = adj.values.iter().flatten().copied().collect();
        prop_assert!(sample_variance(&after) < sample_variance(&before));
        prop_assert!(adj.variance_reduction(&metric) > 0.0);
    }
}

fn sample_variance(v: &[f64]) -> f64 {
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (v.len() - 1) as f64
}
