//! Job runner for batches of planning and analysis tasks.

use crate::analysis::{analyze_experiment, auto_drill_down, AnalysisConfig};
use crate::causal::{
    find_sensitive_segments, DifferenceInDifferences, HteLearner, SyntheticControl, CATE_COL,
};
use crate::data::{Dataset, MetricType};
use crate::error::{ExperimentError, Result};
use crate::model::RandomForestRegressor;
use crate::plan::{CriticService, ExperimentInputs, JsonFileGenerator, PlanService};
use crate::power::{
    calculate_sample_size, estimate_duration_days, simulate_power_two_proportion, PowerRequest,
    SimulationConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

fn default_alpha() -> f64 {
    0.05
}

fn default_iterations() -> usize {
    1000
}

fn default_trees() -> usize {
    100
}

/// One unit of work. Dataset paths are resolved against the directory of
/// the job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Sample size for a planned test.
    Power {
        request: PowerRequest,
        /// Total daily traffic across all arms, for a duration estimate.
        #[serde(default)]
        traffic_per_day: Option<f64>,
    },
    /// Monte Carlo power of a two-proportion z-test.
    Simulate {
        n_per_group: u64,
        baseline_rate: f64,
        mde_abs: f64,
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default = "default_iterations")]
        iterations: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Per-variant analysis of an experiment.
    Analyze { dataset: PathBuf, config: AnalysisConfig },
    /// Segment scan for significant effects.
    DrillDown {
        dataset: PathBuf,
        metric_col: String,
        variant_col: String,
        #[serde(default = "default_control")]
        control_label: String,
        segments: Vec<String>,
        #[serde(default = "default_metric_type")]
        metric_type: MetricType,
    },
    /// Difference-in-differences on a panel.
    Did { dataset: PathBuf, estimator: DifferenceInDifferences },
    /// Synthetic control on a panel.
    Scm { dataset: PathBuf, estimator: SyntheticControl },
    /// T-learner CATE estimation with a random forest.
    Hte {
        dataset: PathBuf,
        features: Vec<String>,
        treatment_col: String,
        outcome_col: String,
        #[serde(default = "default_trees")]
        n_estimators: usize,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default)]
        seed: Option<u64>,
        /// CSV path for the dataset with its `cate` column.
        #[serde(default)]
        output: Option<PathBuf>,
    },
    /// Experiment plan, optionally embellished from recorded JSON replies.
    Plan {
        inputs: ExperimentInputs,
        #[serde(default)]
        generated: Option<PathBuf>,
        #[serde(default)]
        critique: Option<PathBuf>,
    },
}

fn default_control() -> String {
    "Control".to_string()
}

fn default_metric_type() -> MetricType {
    MetricType::Continuous
}

impl Job {
    /// Serialized tag of the job.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Power { .. } => "power",
            Job::Simulate { .. } => "simulate",
            Job::Analyze { .. } => "analyze",
            Job::DrillDown { .. } => "drill_down",
            Job::Did { .. } => "did",
            Job::Scm { .. } => "scm",
            Job::Hte { .. } => "hte",
            Job::Plan { .. } => "plan",
        }
    }

    fn execute(&self, base_dir: &Path) -> Result<Value> {
        let load = |p: &PathBuf| Dataset::from_csv(base_dir.join(p));
        let value = match self {
            Job::Power { request, traffic_per_day } => {
                let result = calculate_sample_size(request)?;
                let days = traffic_per_day.and_then(|t| estimate_duration_days(result.total_n, t));
                let mut out = serde_json::to_value(&result)?;
                out["estimated_days"] = json!(days);
                out
            }
            Job::Simulate {
                n_per_group,
                baseline_rate,
                mde_abs,
                alpha,
                iterations,
                seed,
            } => {
                let mut config = SimulationConfig::default().with_iterations(*iterations);
                if let Some(s) = seed {
                    config = config.with_seed(*s);
                }
                let power =
                    simulate_power_two_proportion(*n_per_group, *baseline_rate, *mde_abs, *alpha, &config)?;
                json!({ "n_per_group": n_per_group, "power": power })
            }
            Job::Analyze { dataset, config } => {
                serde_json::to_value(analyze_experiment(&load(dataset)?, config)?)?
            }
            Job::DrillDown {
                dataset,
                metric_col,
                variant_col,
                control_label,
                segments,
                metric_type,
            } => {
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                let insights = auto_drill_down(
                    &load(dataset)?,
                    metric_col,
                    variant_col,
                    control_label,
                    &segments,
                    *metric_type,
                )?;
                serde_json::to_value(insights)?
            }
            Job::Did { dataset, estimator } => serde_json::to_value(estimator.fit(&load(dataset)?)?)?,
            Job::Scm { dataset, estimator } => serde_json::to_value(estimator.fit(&load(dataset)?)?)?,
            Job::Hte {
                dataset,
                features,
                treatment_col,
                outcome_col,
                n_estimators,
                max_depth,
                seed,
                output,
            } => {
                let mut forest = RandomForestRegressor::new().with_n_estimators(*n_estimators);
                if let Some(d) = max_depth {
                    forest = forest.with_max_depth(*d);
                }
                if let Some(s) = seed {
                    forest = forest.with_seed(*s);
                }
                let features: Vec<&str> = features.iter().map(String::as_str).collect();
                let scored = HteLearner::new(forest).fit_predict(
                    &load(dataset)?,
                    &features,
                    treatment_col,
                    outcome_col,
                )?;
                if let Some(path) = output {
                    scored.to_csv(base_dir.join(path))?;
                }
                let cate: Vec<f64> = scored.numeric(CATE_COL)?.into_iter().flatten().collect();
                let mean = cate.iter().sum::<f64>() / cate.len().max(1) as f64;
                let segments = find_sensitive_segments(&scored, CATE_COL)?;
                json!({
                    "mean_cate": mean,
                    "n_rows": scored.n_rows(),
                    "segments": segments,
                })
            }
            Job::Plan {
                inputs,
                generated,
                critique,
            } => {
                let planner = match generated {
                    Some(p) => PlanService::with_generator(Box::new(JsonFileGenerator::new(base_dir.join(p)))),
                    None => PlanService::new(),
                };
                let mut outcome = planner.build(inputs)?;
                if let Some(p) = critique {
                    let critic = CriticService::with_generator(Box::new(JsonFileGenerator::new(base_dir.join(p))));
                    outcome.spec = critic.review(inputs, &outcome.spec);
                }
                serde_json::to_value(outcome)?
            }
        };
        Ok(value)
    }
}

/// Result of one executed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub index: usize,
    pub kind: String,
    pub output: Value,
}

/// A named batch of jobs, stored as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub jobs: Vec<Job>,
}

impl JobConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            jobs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn add(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ExperimentError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ExperimentError::from)
    }

    /// Load a job file; see [`JobConfig::run`] for how paths resolve.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Run every job in order, stopping at the first failure.
    ///
    /// Relative paths inside jobs are resolved against `base_dir`.
    pub fn run(&self, base_dir: &Path) -> Result<Vec<JobOutput>> {
        info!(name = %self.name, jobs = self.jobs.len(), "running job file");
        self.jobs
            .iter()
            .enumerate()
            .map(|(i, job)| {
                let output = job.execute(base_dir).map_err(|e| {
                    ExperimentError::Job(format!("Job {} ({}) failed: {}", i + 1, job.kind(), e))
                })?;
                Ok(JobOutput {
                    index: i + 1,
                    kind: job.kind().to_string(),
                    output,
                })
            })
            .collect()
    }

    /// A small configuration exercising sizing, simulation and analysis.
    pub fn example() -> Self {
        JobConfig::new("example-experiment")
            .with_description("Size a conversion test, check it by simulation, then analyze the data")
            .add(Job::Power {
                request: PowerRequest::binary(0.1, 0.02),
                traffic_per_day: Some(5000.0),
            })
            .add(Job::Simulate {
                n_per_group: 4000,
                baseline_rate: 0.1,
                mde_abs: 0.02,
                alpha: 0.05,
                iterations: 1000,
                seed: Some(42),
            })
            .add(Job::Analyze {
                dataset: PathBuf::from("ab_test.csv"),
                config: AnalysisConfig::new("converted", "group").with_metric_type(MetricType::Binary),
            })
            .add(Job::Did {
                dataset: PathBuf::from("did_panel.csv"),
                estimator: DifferenceInDifferences::new("unit", "time", "treat", "y", 2023.0),
            })
    }
}

/// Serialize job outputs as `json` or `yaml`.
pub fn render_outputs(outputs: &[JobOutput], format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(outputs)?),
        "yaml" => Ok(serde_yaml::to_string(outputs)?),
        other => Err(ExperimentError::InvalidParameter(format!(
            "unknown output format '{}' (expected json or yaml)",
            other
        ))),
    }
}
