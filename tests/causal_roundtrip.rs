//! Integration tests recovering injected effects with the causal estimators.

use abcausal::prelude::*;
use tempfile::NamedTempFile;

fn jitter(i: usize) -> f64 {
    ((i * 7919) % 101) as f64 / 1000.0 - 0.05
}

/// 20 units over 2018..=2025; units 10.. are treated and gain 2.0 from 2022.
fn did_panel() -> Dataset {
    let (mut unit, mut time, mut treat, mut y) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let mut k = 0;
    for u in 0..20 {
        for t in 2018..=2025 {
            let d = if u >= 10 { 1.0 } else { 0.0 };
            let post = if t >= 2022 { 1.0 } else { 0.0 };
            unit.push(u as f64);
            time.push(t as f64);
            treat.push(d);
            y.push(5.0 + 0.5 * u as f64 + (t - 2018) as f64 + 3.0 * d + 2.0 * d * post + jitter(k));
            k += 1;
        }
    }
    Dataset::new()
        .with_continuous("unit", unit)
        .unwrap()
        .with_continuous("time", time)
        .unwrap()
        .with_continuous("treat", treat)
        .unwrap()
        .with_continuous("y", y)
        .unwrap()
}

#[test]
fn test_did_recovers_interaction() {
    let method: ObservationalMethod = serde_yaml::from_str(
        "method: did\nunit_col: unit\ntime_col: time\ntreatment_col: treat\noutcome_col: y\npost_period_start: 2022\n",
    )
    .unwrap();
    let result = analyze_observational(&did_panel(), &method).unwrap();

    assert!((result.effect - 2.0).abs() < 0.2, "effect {}", result.effect);
    assert!(result.p_value.unwrap() < 0.001);
    assert!(result.ci_lower.unwrap() < result.effect && result.effect < result.ci_upper.unwrap());
}

#[test]
fn test_did_two_by_two_panel() {
    // Control 10 -> 11, treated 12 -> 15: (15 - 12) - (11 - 10) = 2.
    let data = Dataset::new()
        .with_categorical("unit", vec!["c", "c", "t", "t"])
        .unwrap()
        .with_continuous("time", vec![0.0, 1.0, 0.0, 1.0])
        .unwrap()
        .with_continuous("treat", vec![0.0, 0.0, 1.0, 1.0])
        .unwrap()
        .with_continuous("y", vec![10.0, 11.0, 12.0, 15.0])
        .unwrap();
    let did = DifferenceInDifferences::new("unit", "time", "treat", "y", 1.0);
    let result = did.fit(&data).unwrap();

    assert!((result.effect - 2.0).abs() < 1e-9, "effect {}", result.effect);
    assert!(result.p_value.is_none());
    assert!(result.ci_lower.is_none() && result.ci_upper.is_none());
    assert_eq!(result.details["n_obs"], 4);
}

#[test]
fn test_did_on_generated_panel() {
    let config = DidPanelConfig {
        n_rows: 2000,
        ..DidPanelConfig::default()
    };
    let data = generate_did_panel(&config).unwrap();
    let did = DifferenceInDifferences::new("unit", "time", "treat", "y", 2023.0);
    let result = did.fit(&data).unwrap();
    assert!((result.effect - config.att).abs() < 5.0, "effect {}", result.effect);
}

/// Treated unit is an exact mix of three controls plus 3.0 after 2015.
fn scm_panel() -> Dataset {
    let (mut unit, mut time, mut y) = (Vec::new(), Vec::new(), Vec::new());
    for t in 2000..2020i64 {
        let s = (t - 2000) as f64;
        let b = 50.0 + s;
        let c = 80.0 + 0.5 * s + ((t * 7) % 5) as f64;
        let d = 30.0 + 2.0 * ((t * 3) % 7) as f64;
        let a = 0.5 * b + 0.3 * c + 0.2 * d + 10.0 + if t >= 2015 { 3.0 } else { 0.0 };
        for (name, value) in [("A", a), ("B", b), ("C", c), ("D", d)] {
            unit.push(name);
            time.push(t as f64);
            y.push(value);
        }
    }
    Dataset::new()
        .with_categorical("unit", unit)
        .unwrap()
        .with_continuous("time", time)
        .unwrap()
        .with_continuous("y", y)
        .unwrap()
}

#[test]
fn test_scm_recovers_lift() {
    let scm = SyntheticControl::new("unit", "time", "y", "A", 2015.0).with_method(ScmMethod::Ols);
    let result = analyze_observational(&scm_panel(), &ObservationalMethod::Scm(scm)).unwrap();

    assert!((result.effect - 3.0).abs() < 0.5, "effect {}", result.effect);
    assert_eq!(result.method, "Synthetic Control Method");
    assert!(result.details.contains_key("weights"));
}

#[test]
fn test_scm_unknown_treated_unit() {
    let scm = SyntheticControl::new("unit", "time", "y", "Z", 2015.0);
    assert!(scm.fit(&scm_panel()).is_err());
}

#[test]
fn test_hte_separates_segments_after_csv_round_trip() {
    let (mut x, mut seg, mut treat, mut y) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for i in 0..200 {
        let xi = (i % 50) as f64 / 50.0;
        let d = if i % 2 == 0 { 0.0 } else { 1.0 };
        let high = xi > 0.5;
        x.push(xi);
        seg.push(if high { "high" } else { "low" });
        treat.push(d);
        y.push(xi + d * if high { 4.0 } else { 0.0 } + jitter(i));
    }
    let data = Dataset::new()
        .with_continuous("x", x)
        .unwrap()
        .with_categorical("segment", seg)
        .unwrap()
        .with_continuous("treat", treat)
        .unwrap()
        .with_continuous("y", y)
        .unwrap();

    let file = NamedTempFile::new().unwrap();
    data.to_csv(file.path()).unwrap();
    let loaded = Dataset::from_csv(file.path()).unwrap();

    let learner = HteLearner::new(RandomForestRegressor::new().with_n_estimators(30).with_seed(3));
    let scored = learner.fit_predict(&loaded, &["x"], "treat", "y").unwrap();
    let insights = find_sensitive_segments(&scored, "cate").unwrap();

    let segment = insights.iter().find(|s| s.feature == "segment").unwrap();
    assert_eq!(segment.best_group, "high");
    assert_eq!(segment.worst_group, "low");
    assert!(segment.best_effect > segment.worst_effect + 2.0);
}
