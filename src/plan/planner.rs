//! Experiment plan construction.
//!
//! The power plan is always computed here. An optional [`TextGenerator`]
//! may rewrite the wording of the plan; its output is merged field by field
//! against an allow-list and can never touch the power numbers.

use crate::error::Result;
use crate::plan::generator::TextGenerator;
use crate::plan::schema::{
    AnalysisPlan, Direction, ExperimentDesign, ExperimentInputs, ExperimentSpec, MetricSpec,
    PowerPlan,
};
use crate::power::{calculate_sample_size, estimate_duration_days, PowerRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

const PLAN_SYSTEM: &str = "You are an experiment design copilot.
Return ONLY valid JSON.
No markdown. No extra keys.
Be concrete, actionable, and consistent with inputs.";

/// Shortest run recommended regardless of traffic, covering weekly cycles.
pub const MIN_DURATION_DAYS: u32 = 14;
const MAX_DURATION_DAYS: u64 = 365;

/// Where a plan's wording came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    /// Deterministic template only.
    Fallback,
    /// Template with generated fields merged in.
    Generated,
}

/// A plan and an account of how generated output was merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub spec: ExperimentSpec,
    pub source: PlanSource,
    /// Generated fields accepted into the plan.
    pub applied: Vec<String>,
    /// Generated fields dropped (unknown key or wrong type).
    pub discarded: Vec<String>,
}

/// Builds experiment plans.
#[derive(Default)]
pub struct PlanService {
    generator: Option<Box<dyn TextGenerator>>,
}

impl PlanService {
    /// Deterministic planner with no generator.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(generator: Box<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Build a plan; see [`PlanService::build`].
    pub fn build_spec(&self, inputs: &ExperimentInputs) -> Result<ExperimentSpec> {
        Ok(self.build(inputs)?.spec)
    }

    /// Validate the inputs, size the experiment and assemble a plan.
    ///
    /// # Errors
    /// Only invalid inputs. A failing or malformed generator response yields
    /// the deterministic plan.
    pub fn build(&self, inputs: &ExperimentInputs) -> Result<PlanOutcome> {
        inputs.validate()?;
        let power = power_plan(inputs)?;
        let base = fallback_spec(inputs, power);

        let Some(generator) = &self.generator else {
            return Ok(PlanOutcome {
                spec: base,
                source: PlanSource::Fallback,
                applied: Vec::new(),
                discarded: Vec::new(),
            });
        };

        let prompt = plan_prompt(inputs, &base.power)?;
        let generated = match generator.generate_json(PLAN_SYSTEM, &prompt) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(kind = json_kind(&other), "generator returned a non-object; using fallback plan");
                return Ok(PlanOutcome {
                    spec: base,
                    source: PlanSource::Fallback,
                    applied: Vec::new(),
                    discarded: Vec::new(),
                });
            }
            Err(e) => {
                warn!(error = %e, "plan generation failed; using fallback plan");
                return Ok(PlanOutcome {
                    spec: base,
                    source: PlanSource::Fallback,
                    applied: Vec::new(),
                    discarded: Vec::new(),
                });
            }
        };

        Ok(merge_generated(base, &generated))
    }
}

/// Size a two-proportion test for the inputs.
pub fn power_plan(inputs: &ExperimentInputs) -> Result<PowerPlan> {
    let request = PowerRequest::binary(inputs.baseline_rate, inputs.mde_abs)
        .with_alpha(inputs.alpha)
        .with_power(inputs.target_power);
    let result = calculate_sample_size(&request)?;
    let per_arm_traffic = inputs.traffic_per_day as f64 * inputs.min_allocation();
    let estimated_days = estimate_duration_days(result.n_per_group, per_arm_traffic);

    Ok(PowerPlan {
        test: "two_proportion_z_test".to_string(),
        alpha: inputs.alpha,
        power: inputs.target_power,
        baseline_rate: inputs.baseline_rate,
        mde_abs: inputs.mde_abs,
        n_per_group: result.n_per_group,
        total_n: result.total_n,
        estimated_days,
        notes: "Two-proportion z-test sizing, normal approximation; duration assumes the smaller arm's share of daily traffic.".to_string(),
    })
}

fn design_duration(power: &PowerPlan) -> u32 {
    let days = power.estimated_days.unwrap_or(MIN_DURATION_DAYS as u64);
    days.clamp(MIN_DURATION_DAYS as u64, MAX_DURATION_DAYS) as u32
}

/// Deterministic plan used without a generator and as the merge base.
pub fn fallback_spec(inputs: &ExperimentInputs, power: PowerPlan) -> ExperimentSpec {
    let window = inputs.metric_window_days;
    let unit = &inputs.randomization_unit;

    ExperimentSpec {
        title: inputs.default_title(),
        hypothesis: format!(
            "Treatment will increase {} within {} days.",
            inputs.primary_metric, window
        ),
        primary_metric: MetricSpec {
            name: inputs.primary_metric.clone(),
            definition: format!("Share of {} units converting within {} days.", unit, window),
            direction: Direction::Increase,
            window_days: window,
        },
        guardrail_metrics: inputs
            .guardrails
            .iter()
            .map(|g| MetricSpec {
                name: g.clone(),
                definition: format!("Watch {} for regressions during the run.", g),
                direction: Direction::Decrease,
                window_days: window,
            })
            .collect(),
        design: ExperimentDesign {
            randomization_unit: unit.clone(),
            population: "Eligible units entering the target funnel.".to_string(),
            exclusions: vec![
                "Internal traffic".to_string(),
                "Bots and fraud".to_string(),
                "Units that already converted, if applicable".to_string(),
            ],
            assignment: format!("Persistent bucketing by a hash of the {} id.", unit),
            ramp_plan: "Ramp 10% -> 25% -> 50%, checking guardrails at each step.".to_string(),
            duration_days: design_duration(&power),
        },
        analysis: AnalysisPlan {
            srm_check: "Chi-square SRM test on assignment counts daily and at the end.".to_string(),
            primary_test: "Two-sided two-proportion z-test on conversion rates.".to_string(),
            effect_reporting: "Absolute lift, relative lift and 95% CI.".to_string(),
            multiple_testing_note: "Segment reads are exploratory unless pre-registered; control FDR across many segments.".to_string(),
            segment_policy: "Report the overall effect first; read segments only with adequate samples.".to_string(),
            stopping_rule: "Analyze at the planned end; no early peeking without a pre-defined sequential rule.".to_string(),
        },
        power,
        inputs: inputs.clone(),
        risks: vec![
            "Novelty effect".to_string(),
            "Instrumentation changes mid-run".to_string(),
            "Interference between units if the randomization unit is unstable".to_string(),
        ],
        open_questions: vec![
            "Known seasonality or calendar events during the run?".to_string(),
            "Ramp constraints from infrastructure?".to_string(),
        ],
    }
}

fn plan_prompt(inputs: &ExperimentInputs, power: &PowerPlan) -> Result<String> {
    let schema = json!({
        "title": "string",
        "hypothesis": "string",
        "population": "string",
        "exclusions": ["string"],
        "assignment": "string",
        "ramp_plan": "string",
        "duration_days": "int",
        "primary_metric_definition": "string",
        "primary_metric_direction": "increase|decrease",
        "guardrail_metric_definitions": [{"name": "string", "definition": "string", "direction": "increase|decrease"}],
        "analysis": {
            "srm_check": "string",
            "primary_test": "string",
            "effect_reporting": "string",
            "multiple_testing_note": "string",
            "segment_policy": "string",
            "stopping_rule": "string",
        },
        "risks": ["string"],
        "open_questions": ["string"],
    });

    Ok(format!(
        "Create a practical A/B test plan as JSON.\n\n\
         Goal:\n{goal}\n\n\
         Constraints:\n\
         - Randomization unit: {unit}\n\
         - Primary metric: {metric}, window_days: {window}\n\
         - Guardrails: {guardrails:?}\n\
         - Segments: {segments:?}\n\n\
         Power plan is fixed (do not modify numbers):\n{power}\n\n\
         Return JSON with exactly these fields:\n{schema}\n",
        goal = inputs.goal,
        unit = inputs.randomization_unit,
        metric = inputs.primary_metric,
        window = inputs.metric_window_days,
        guardrails = inputs.guardrails,
        segments = inputs.segments,
        power = serde_json::to_string_pretty(power)?,
        schema = serde_json::to_string_pretty(&schema)?,
    ))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Non-empty trimmed string.
pub(crate) fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Array whose every element is a string; blank entries dropped.
pub(crate) fn text_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(|s| s.trim().to_string()))
        .collect::<Option<Vec<_>>>()
        .map(|v| v.into_iter().filter(|s| !s.is_empty()).collect())
}

fn guardrail_list(value: &Value, window: u32) -> Option<Vec<MetricSpec>> {
    value
        .as_array()?
        .iter()
        .map(|g| {
            let obj = g.as_object()?;
            Some(MetricSpec {
                name: text(obj.get("name")?)?,
                definition: text(obj.get("definition")?)?,
                direction: obj.get("direction").and_then(Value::as_str).map_or(Some(Direction::Decrease), |d| d.parse().ok())?,
                window_days: window,
            })
        })
        .collect()
}

/// Merge allow-listed generated fields into `spec`.
fn merge_generated(mut spec: ExperimentSpec, generated: &Map<String, Value>) -> PlanOutcome {
    let mut applied = Vec::new();
    let mut discarded = Vec::new();
    let window = spec.inputs.metric_window_days;

    for (key, value) in generated {
        let accepted = match key.as_str() {
            "title" => text(value).map(|v| spec.title = v).is_some(),
            "hypothesis" => text(value).map(|v| spec.hypothesis = v).is_some(),
            "population" => text(value).map(|v| spec.design.population = v).is_some(),
            "assignment" => text(value).map(|v| spec.design.assignment = v).is_some(),
            "ramp_plan" => text(value).map(|v| spec.design.ramp_plan = v).is_some(),
            "exclusions" => text_list(value).map(|v| spec.design.exclusions = v).is_some(),
            "duration_days" => value
                .as_u64()
                .filter(|d| (1..=MAX_DURATION_DAYS).contains(d))
                .map(|d| spec.design.duration_days = d as u32)
                .is_some(),
            "primary_metric_definition" => text(value).map(|v| spec.primary_metric.definition = v).is_some(),
            "primary_metric_direction" => value
                .as_str()
                .and_then(|d| d.parse::<Direction>().ok())
                .map(|d| spec.primary_metric.direction = d)
                .is_some(),
            "guardrail_metric_definitions" => guardrail_list(value, window)
                .map(|v| spec.guardrail_metrics = v)
                .is_some(),
            "risks" => text_list(value).map(|v| spec.risks = v).is_some(),
            "open_questions" => text_list(value).map(|v| spec.open_questions = v).is_some(),
            "analysis" => {
                merge_analysis(&mut spec.analysis, value, &mut applied, &mut discarded);
                continue;
            }
            _ => {
                warn!(key = %key, "discarding unknown generated field");
                discarded.push(key.clone());
                continue;
            }
        };

        if accepted {
            applied.push(key.clone());
        } else {
            warn!(key = %key, kind = json_kind(value), "discarding generated field with invalid value");
            discarded.push(key.clone());
        }
    }
    debug!(applied = applied.len(), discarded = discarded.len(), "generated plan merged");

    PlanOutcome {
        spec,
        source: PlanSource::Generated,
        applied,
        discarded,
    }
}

fn merge_analysis(
    analysis: &mut AnalysisPlan,
    value: &Value,
    applied: &mut Vec<String>,
    discarded: &mut Vec<String>,
) {
    let Some(fields) = value.as_object() else {
        warn!(kind = json_kind(value), "discarding generated analysis section");
        discarded.push("analysis".to_string());
        return;
    };

    for (key, value) in fields {
        let slot = match key.as_str() {
            "srm_check" => &mut analysis.srm_check,
            "primary_test" => &mut analysis.primary_test,
            "effect_reporting" => &mut analysis.effect_reporting,
            "multiple_testing_note" => &mut analysis.multiple_testing_note,
            "segment_policy" => &mut analysis.segment_policy,
            "stopping_rule" => &mut analysis.stopping_rule,
            _ => {
                warn!(key = %key, "discarding unknown generated analysis field");
                discarded.push(format!("analysis.{}", key));
                continue;
            }
        };
        match text(value) {
            Some(v) => {
                *slot = v;
                applied.push(format!("analysis.{}", key));
            }
            None => discarded.push(format!("analysis.{}", key)),
        }
    }
}
