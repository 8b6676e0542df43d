//! Causal effect estimators for observational data.

pub mod did;
pub mod hte;
pub mod panel;
pub mod scm;

use crate::data::Dataset;
use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use did::{DifferenceInDifferences, DID_METHOD};
pub use hte::{find_sensitive_segments, HteLearner, SegmentInsight, CATE_COL};
pub use panel::TimePoint;
pub use scm::{ScmMethod, SyntheticControl, SCM_METHOD};

/// Point estimate of a causal effect with optional inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalResult {
    pub effect: f64,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub p_value: Option<f64>,
    /// Human-readable estimator name.
    pub method: String,
    /// Coefficients, weights and diagnostic series.
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl CausalResult {
    pub fn new(effect: f64, method: &str) -> Self {
        Self {
            effect,
            ci_lower: None,
            ci_upper: None,
            p_value: None,
            method: method.to_string(),
            details: serde_json::Map::new(),
        }
    }
}

impl fmt::Display for CausalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Method: {}", self.method)?;
        writeln!(f, "Effect: {:.4}", self.effect)?;
        if let (Some(lo), Some(hi)) = (self.ci_lower, self.ci_upper) {
            writeln!(f, "95% CI: [{:.4}, {:.4}]", lo, hi)?;
        }
        if let Some(p) = self.p_value {
            writeln!(f, "p-value: {:.4e}", p)?;
        }
        Ok(())
    }
}

/// Observational estimator selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Did,
    Scm,
}

impl FromStr for MethodKind {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "did" => Ok(MethodKind::Did),
            "scm" => Ok(MethodKind::Scm),
            other => Err(ExperimentError::InvalidParameter(format!("Unknown method: {}", other))),
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MethodKind::Did => "did",
            MethodKind::Scm => "scm",
        })
    }
}

/// An observational estimator together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ObservationalMethod {
    Did(DifferenceInDifferences),
    Scm(SyntheticControl),
}

impl ObservationalMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            ObservationalMethod::Did(_) => MethodKind::Did,
            ObservationalMethod::Scm(_) => MethodKind::Scm,
        }
    }
}

/// Run the selected observational estimator on `dataset`.
pub fn analyze_observational(dataset: &Dataset, method: &ObservationalMethod) -> Result<CausalResult> {
    match method {
        ObservationalMethod::Did(did) => did.fit(dataset),
        ObservationalMethod::Scm(scm) => scm.fit(dataset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{generate_did_panel, DidPanelConfig};

    #[test]
    fn test_method_kind_parse() {
        assert_eq!("DiD".parse::<MethodKind>().unwrap(), MethodKind::Did);
        assert_eq!("scm".parse::<MethodKind>().unwrap(), MethodKind::Scm);
        let err = "rdd".parse::<MethodKind>().unwrap_err();
        assert!(err.to_string().contains("Unknown method: rdd"));
    }

    #[test]
    fn test_method_from_yaml() {
        let yaml = "method: scm\nunit_col: unit\ntime_col: time\noutcome_col: y\ntreated_unit: City_A\nintervention_time: 2023\n";
        let method: ObservationalMethod = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(method.kind(), MethodKind::Scm);
        match method {
            ObservationalMethod::Scm(scm) => {
                assert_eq!(scm.method, ScmMethod::Ridge);
                assert_eq!(scm.intervention_time, TimePoint::Number(2023.0));
            }
            other => panic!("unexpected {:?}", other),
        }

        let bad = "method: rdd\nunit_col: unit\n";
        assert!(serde_yaml::from_str::<ObservationalMethod>(bad).is_err());
    }

    #[test]
    fn test_dispatch_did() {
        let data = generate_did_panel(&DidPanelConfig::default()).unwrap();
        let method = ObservationalMethod::Did(DifferenceInDifferences::new("unit", "time", "treat", "y", 2023.0));
        let res = analyze_observational(&data, &method).unwrap();
        assert_eq!(res.method, DID_METHOD);
        assert!(res.to_string().contains("Effect:"));
    }
}
