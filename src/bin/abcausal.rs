//! abcausal - experiment design and causal analysis CLI

use abcausal::analysis::{analyze_experiment, auto_drill_down, AnalysisConfig, AnalysisType};
use abcausal::causal::{
    find_sensitive_segments, DifferenceInDifferences, HteLearner, ScmMethod, SyntheticControl,
    TimePoint, CATE_COL,
};
use abcausal::data::{
    generate_ab_test, generate_did_panel, generate_scm_panel, AbTestConfig, Dataset,
    DidPanelConfig, MetricType, ScmPanelConfig,
};
use abcausal::error::{ExperimentError, Result};
use abcausal::model::RandomForestRegressor;
use abcausal::pipeline::{render_outputs, JobConfig};
use abcausal::plan::{CriticService, ExperimentInputs, JsonFileGenerator, PlanService};
use abcausal::power::{
    calculate_sample_size, estimate_duration_days, simulate_power_two_proportion, PowerRequest,
    SimulationConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMetric {
    Binary,
    Continuous,
}

impl From<CliMetric> for MetricType {
    fn from(m: CliMetric) -> Self {
        match m {
            CliMetric::Binary => MetricType::Binary,
            CliMetric::Continuous => MetricType::Continuous,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliScmMethod {
    Ols,
    Ridge,
    Lasso,
}

impl From<CliScmMethod> for ScmMethod {
    fn from(m: CliScmMethod) -> Self {
        match m {
            CliScmMethod::Ols => ScmMethod::Ols,
            CliScmMethod::Ridge => ScmMethod::Ridge,
            CliScmMethod::Lasso => ScmMethod::Lasso,
        }
    }
}

/// Synthetic dataset kinds
#[derive(Debug, Clone, Copy, ValueEnum)]
enum DatasetKind {
    /// Randomized conversion test
    Ab,
    /// Unit x time panel for difference-in-differences
    Did,
    /// City panel for synthetic control
    Scm,
}

/// Output format for structured results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Yaml,
}

/// Experiment design, A/B analysis and causal inference
#[derive(Parser)]
#[command(name = "abcausal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Required sample size for a two-group test
    Power {
        /// Baseline rate (binary) or mean (continuous)
        #[arg(short, long)]
        baseline: f64,

        /// Absolute minimum detectable effect
        #[arg(short, long)]
        mde: f64,

        #[arg(long, value_enum, default_value = "binary")]
        metric: CliMetric,

        /// Standard deviation of a continuous metric
        #[arg(long)]
        std_dev: Option<f64>,

        #[arg(long, default_value = "0.05")]
        alpha: f64,

        #[arg(long, default_value = "0.8")]
        power: f64,

        /// Use a one-sided test
        #[arg(long)]
        one_sided: bool,

        /// Expected pre-period correlation for CUPED
        #[arg(long)]
        cuped_correlation: Option<f64>,

        /// Total daily traffic across all arms, for a duration estimate
        #[arg(long)]
        traffic: Option<f64>,
    },

    /// Simulated power of a two-proportion z-test
    Simulate {
        #[arg(short, long)]
        n_per_group: u64,

        #[arg(short, long)]
        baseline: f64,

        #[arg(short, long)]
        mde: f64,

        #[arg(long, default_value = "0.05")]
        alpha: f64,

        #[arg(long, default_value = "1000")]
        iterations: usize,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Analyze an experiment CSV
    Analyze {
        #[arg(short, long)]
        input: PathBuf,

        /// Outcome column
        #[arg(long)]
        metric: String,

        /// Variant label column
        #[arg(long)]
        variant: String,

        #[arg(long, default_value = "Control")]
        control: String,

        #[arg(long, value_enum, default_value = "continuous")]
        metric_type: CliMetric,

        /// Pre-experiment covariate for CUPED
        #[arg(long)]
        covariate: Option<String>,

        /// Bayesian probability-to-beat-control instead of p-values
        #[arg(long)]
        bayesian: bool,

        #[arg(long)]
        seed: Option<u64>,

        /// Write per-variant results as TSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Scan segments for significant variant effects
    DrillDown {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        metric: String,

        #[arg(long)]
        variant: String,

        #[arg(long, default_value = "Control")]
        control: String,

        /// Segment columns (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        segments: Vec<String>,

        #[arg(long, value_enum, default_value = "continuous")]
        metric_type: CliMetric,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Difference-in-differences on a panel CSV
    Did {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "unit")]
        unit: String,

        #[arg(long, default_value = "time")]
        time: String,

        #[arg(long, default_value = "treat")]
        treatment: String,

        #[arg(long, default_value = "y")]
        outcome: String,

        /// First post-period time point
        #[arg(long)]
        post_start: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Synthetic control on a panel CSV
    Scm {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "unit")]
        unit: String,

        #[arg(long, default_value = "time")]
        time: String,

        #[arg(long, default_value = "y")]
        outcome: String,

        /// Treated unit label
        #[arg(long)]
        treated: String,

        /// First post-intervention time point
        #[arg(long)]
        intervention: String,

        #[arg(long, value_enum, default_value = "ridge")]
        method: CliScmMethod,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Conditional treatment effects with a T-learner
    Hte {
        #[arg(short, long)]
        input: PathBuf,

        /// Feature columns (comma-separated)
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,

        #[arg(long)]
        treatment: String,

        #[arg(long)]
        outcome: String,

        #[arg(long, default_value = "100")]
        trees: usize,

        #[arg(long)]
        max_depth: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Write the dataset with its cate column
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a synthetic dataset
    Generate {
        #[arg(value_enum)]
        kind: DatasetKind,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Rows (ab: users, did: sampled rows)
        #[arg(short, long)]
        n: Option<usize>,
    },

    /// Build an experiment plan from a YAML inputs file
    Plan {
        #[arg(short, long)]
        inputs: PathBuf,

        /// Recorded JSON reply used to embellish the plan
        #[arg(long)]
        generated: Option<PathBuf>,

        /// Recorded JSON reply from a reviewer
        #[arg(long)]
        critique: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "yaml")]
        format: Format,
    },

    /// Run a YAML job file
    Run {
        #[arg(short, long)]
        config: PathBuf,

        /// Write outputs here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "yaml")]
        format: Format,
    },

    /// Write an example job file
    Example {
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Power {
            baseline,
            mde,
            metric,
            std_dev,
            alpha,
            power,
            one_sided,
            cuped_correlation,
            traffic,
        } => {
            let mut request = match metric {
                CliMetric::Binary => PowerRequest::binary(baseline, mde),
                CliMetric::Continuous => PowerRequest::continuous(baseline, mde),
            }
            .with_alpha(alpha)
            .with_power(power);
            if let Some(sd) = std_dev {
                request = request.with_std_dev(sd);
            }
            if let Some(rho) = cuped_correlation {
                request = request.with_cuped(rho);
            }
            if one_sided {
                request = request.one_sided();
            }
            cmd_power(&request, traffic)
        }

        Commands::Simulate {
            n_per_group,
            baseline,
            mde,
            alpha,
            iterations,
            seed,
        } => cmd_simulate(n_per_group, baseline, mde, alpha, iterations, seed),

        Commands::Analyze {
            input,
            metric,
            variant,
            control,
            metric_type,
            covariate,
            bayesian,
            seed,
            output,
            format,
        } => {
            let mut config = AnalysisConfig::new(&metric, &variant)
                .with_control(&control)
                .with_metric_type(metric_type.into());
            if let Some(c) = covariate {
                config = config.with_covariate(&c);
            }
            if bayesian {
                config = config.with_analysis_type(AnalysisType::Bayesian);
            }
            if let Some(s) = seed {
                config = config.with_seed(s);
            }
            cmd_analyze(&input, &config, output.as_deref(), format)
        }

        Commands::DrillDown {
            input,
            metric,
            variant,
            control,
            segments,
            metric_type,
            format,
        } => cmd_drill_down(&input, &metric, &variant, &control, &segments, metric_type.into(), format),

        Commands::Did {
            input,
            unit,
            time,
            treatment,
            outcome,
            post_start,
            format,
        } => {
            let did = DifferenceInDifferences::new(&unit, &time, &treatment, &outcome, TimePoint::parse(&post_start));
            Dataset::from_csv(&input).and_then(|data| did.fit(&data)).and_then(|r| emit(&r, format))
        }

        Commands::Scm {
            input,
            unit,
            time,
            outcome,
            treated,
            intervention,
            method,
            format,
        } => {
            let scm = SyntheticControl::new(&unit, &time, &outcome, &treated, TimePoint::parse(&intervention))
                .with_method(method.into());
            Dataset::from_csv(&input).and_then(|data| scm.fit(&data)).and_then(|r| emit(&r, format))
        }

        Commands::Hte {
            input,
            features,
            treatment,
            outcome,
            trees,
            max_depth,
            seed,
            output,
        } => cmd_hte(&input, &features, &treatment, &outcome, trees, max_depth, seed, output.as_deref()),

        Commands::Generate { kind, output, seed, n } => cmd_generate(kind, &output, seed, n),

        Commands::Plan {
            inputs,
            generated,
            critique,
            format,
        } => cmd_plan(&inputs, generated, critique, format),

        Commands::Run { config, output, format } => cmd_run(&config, output.as_deref(), format),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print a result as text (its Display form), JSON or YAML.
fn emit<T: Serialize + std::fmt::Display>(value: &T, format: Format) -> Result<()> {
    match format {
        Format::Text => print!("{}", value),
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn emit_structured<T: Serialize>(value: &T, format: Format) -> Result<()> {
    match format {
        Format::Json | Format::Text => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn cmd_power(request: &PowerRequest, traffic: Option<f64>) -> Result<()> {
    let result = calculate_sample_size(request)?;

    println!("Sample size per group: {}", result.n_per_group);
    println!("Total sample size:     {}", result.total_n);
    println!("z_alpha = {:.4}, z_beta = {:.4}", result.z_alpha, result.z_beta);
    println!("Assumptions: {}", result.assumptions);
    if let Some(t) = traffic {
        match estimate_duration_days(result.total_n, t) {
            Some(days) => println!("Estimated duration: {} days at {} units/day", days, t),
            None => eprintln!("Traffic must be positive to estimate duration"),
        }
    }
    Ok(())
}

fn cmd_simulate(
    n_per_group: u64,
    baseline: f64,
    mde: f64,
    alpha: f64,
    iterations: usize,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = SimulationConfig::default().with_iterations(iterations);
    if let Some(s) = seed {
        config = config.with_seed(s);
    }
    eprintln!("Simulating {} experiments with {} units per group...", iterations, n_per_group);
    let power = simulate_power_two_proportion(n_per_group, baseline, mde, alpha, &config)?;
    println!("Simulated power: {:.3}", power);
    Ok(())
}

fn cmd_analyze(input: &Path, config: &AnalysisConfig, output: Option<&Path>, format: Format) -> Result<()> {
    eprintln!("Loading {:?}...", input);
    let data = Dataset::from_csv(input)?;
    eprintln!("Loaded {} rows x {} columns", data.n_rows(), data.n_columns());

    let analysis = analyze_experiment(&data, config)?;
    if let Some(path) = output {
        analysis.to_tsv(path)?;
        eprintln!("Wrote results to {:?}", path);
    }
    emit(&analysis, format)
}

fn cmd_drill_down(
    input: &Path,
    metric: &str,
    variant: &str,
    control: &str,
    segments: &[String],
    metric_type: MetricType,
    format: Format,
) -> Result<()> {
    let data = Dataset::from_csv(input)?;
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let insights = auto_drill_down(&data, metric, variant, control, &segments, metric_type)?;

    if let Format::Text = format {
        if insights.is_empty() {
            println!("No significant segment effects found");
        }
        for insight in &insights {
            println!("{} (p = {:.4})", insight.message, insight.p_value);
        }
        return Ok(());
    }
    emit_structured(&insights, format)
}

#[allow(clippy::too_many_arguments)]
fn cmd_hte(
    input: &Path,
    features: &[String],
    treatment: &str,
    outcome: &str,
    trees: usize,
    max_depth: Option<usize>,
    seed: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let data = Dataset::from_csv(input)?;
    let mut forest = RandomForestRegressor::new().with_n_estimators(trees);
    if let Some(d) = max_depth {
        forest = forest.with_max_depth(d);
    }
    if let Some(s) = seed {
        forest = forest.with_seed(s);
    }

    eprintln!("Fitting T-learner with {} trees per arm...", trees);
    let features: Vec<&str> = features.iter().map(String::as_str).collect();
    let scored = HteLearner::new(forest).fit_predict(&data, &features, treatment, outcome)?;
    if let Some(path) = output {
        scored.to_csv(path)?;
        eprintln!("Wrote CATE estimates to {:?}", path);
    }

    let cate: Vec<f64> = scored.numeric(CATE_COL)?.into_iter().flatten().collect();
    if cate.is_empty() {
        return Err(ExperimentError::EmptyData("no CATE estimates".to_string()));
    }
    println!("Mean CATE: {:.4}", cate.iter().sum::<f64>() / cate.len() as f64);
    for s in find_sensitive_segments(&scored, CATE_COL)? {
        println!(
            "{}: best {} ({:.4}), worst {} ({:.4})",
            s.feature, s.best_group, s.best_effect, s.worst_group, s.worst_effect
        );
    }
    Ok(())
}

fn cmd_generate(kind: DatasetKind, output: &Path, seed: u64, n: Option<usize>) -> Result<()> {
    let data = match kind {
        DatasetKind::Ab => {
            let mut config = AbTestConfig::default().with_seed(seed);
            if let Some(n) = n {
                config = config.with_users(n);
            }
            generate_ab_test(&config)?
        }
        DatasetKind::Did => {
            let mut config = DidPanelConfig {
                seed,
                ..DidPanelConfig::default()
            };
            if let Some(n) = n {
                config.n_rows = n;
            }
            generate_did_panel(&config)?
        }
        DatasetKind::Scm => generate_scm_panel(&ScmPanelConfig {
            seed,
            ..ScmPanelConfig::default()
        })?,
    };
    data.to_csv(output)?;
    eprintln!("Wrote {} rows to {:?}", data.n_rows(), output);
    Ok(())
}

fn cmd_plan(inputs_path: &Path, generated: Option<PathBuf>, critique: Option<PathBuf>, format: Format) -> Result<()> {
    let inputs: ExperimentInputs = serde_yaml::from_str(&std::fs::read_to_string(inputs_path)?)?;

    let planner = match generated {
        Some(p) => PlanService::with_generator(Box::new(JsonFileGenerator::new(p))),
        None => PlanService::new(),
    };
    let mut outcome = planner.build(&inputs)?;
    if let Some(p) = critique {
        outcome.spec = CriticService::with_generator(Box::new(JsonFileGenerator::new(p))).review(&inputs, &outcome.spec);
    }
    eprintln!(
        "Plan source: {:?} ({} fields applied, {} discarded)",
        outcome.source,
        outcome.applied.len(),
        outcome.discarded.len()
    );
    emit_structured(&outcome.spec, format)
}

fn cmd_run(config_path: &Path, output: Option<&Path>, format: Format) -> Result<()> {
    eprintln!("Loading job file {:?}...", config_path);
    let config = JobConfig::from_file(config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    eprintln!("Running '{}' ({} jobs)...", config.name, config.jobs.len());
    let outputs = config.run(base_dir)?;
    let rendered = match format {
        Format::Json => render_outputs(&outputs, "json")?,
        Format::Yaml | Format::Text => render_outputs(&outputs, "yaml")?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!("Wrote {} job outputs to {:?}", outputs.len(), path);
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_example(output_path: &Path) -> Result<()> {
    let yaml = JobConfig::example().to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example job file to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
