//! Review pass over a finished plan.

use crate::plan::generator::TextGenerator;
use crate::plan::planner::{text, text_list};
use crate::plan::schema::{ExperimentInputs, ExperimentSpec};
use serde_json::{json, Value};
use tracing::{debug, warn};

const CRITIC_SYSTEM: &str = "You are a strict reviewer of experiment plans.
Return ONLY valid JSON with keys: edits (list), risks_add (list), questions_add (list), improved_fields (object).
No markdown. No extra keys.";

/// Asks a [`TextGenerator`] to critique a plan and applies the safe edits.
#[derive(Default)]
pub struct CriticService {
    generator: Option<Box<dyn TextGenerator>>,
}

impl CriticService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(generator: Box<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Return an improved copy of `spec`.
    ///
    /// Only wording fields may change; risks and open questions are
    /// extended, trimmed and de-duplicated in first-seen order. Without a
    /// generator, or when it fails, the plan comes back unchanged.
    pub fn review(&self, inputs: &ExperimentInputs, spec: &ExperimentSpec) -> ExperimentSpec {
        let Some(generator) = &self.generator else {
            return spec.clone();
        };

        let prompt = match review_prompt(inputs, spec) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not serialize plan for review");
                return spec.clone();
            }
        };
        let reply = match generator.generate_json(CRITIC_SYSTEM, &prompt) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("critic returned a non-object; keeping plan");
                return spec.clone();
            }
            Err(e) => {
                warn!(error = %e, "critic failed; keeping plan");
                return spec.clone();
            }
        };

        let mut improved = spec.clone();
        if let Some(fields) = reply.get("improved_fields").and_then(Value::as_object) {
            for (path, value) in fields {
                let slot = match path.as_str() {
                    "hypothesis" => &mut improved.hypothesis,
                    "design.ramp_plan" => &mut improved.design.ramp_plan,
                    "analysis.srm_check" => &mut improved.analysis.srm_check,
                    "analysis.segment_policy" => &mut improved.analysis.segment_policy,
                    "analysis.stopping_rule" => &mut improved.analysis.stopping_rule,
                    _ => {
                        warn!(field = %path, "ignoring critic edit outside allowed fields");
                        continue;
                    }
                };
                if let Some(v) = text(value) {
                    *slot = v;
                }
            }
        }

        if let Some(extra) = reply.get("risks_add").and_then(text_list) {
            improved.risks.extend(extra);
        }
        if let Some(extra) = reply.get("questions_add").and_then(text_list) {
            improved.open_questions.extend(extra);
        }
        improved.risks = dedup_trimmed(&improved.risks);
        improved.open_questions = dedup_trimmed(&improved.open_questions);

        if let Some(edits) = reply.get("edits").and_then(text_list) {
            debug!(edits = ?edits, "critic edits");
        }
        improved
    }
}

fn review_prompt(inputs: &ExperimentInputs, spec: &ExperimentSpec) -> serde_json::Result<String> {
    let shape = json!({
        "edits": ["short bullets describing what you changed"],
        "risks_add": ["risk strings to add"],
        "questions_add": ["open questions to add"],
        "improved_fields": {
            "hypothesis": "optional string",
            "design.ramp_plan": "optional string",
            "analysis.srm_check": "optional string",
            "analysis.segment_policy": "optional string",
            "analysis.stopping_rule": "optional string",
        },
    });
    Ok(format!(
        "Review this experiment spec for issues and propose minimal edits.\n\n\
         Goal:\n{}\n\nSpec JSON:\n{}\n\nReturn JSON:\n{}\n",
        inputs.goal,
        serde_json::to_string_pretty(spec)?,
        serde_json::to_string_pretty(&shape)?,
    ))
}

fn dedup_trimmed(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}
