// THEORY:
// The aggregator turns the raw outcomes of one image into a single `Verdict`. It is a
// pure function of `(outcomes, threshold)`: no I/O, no retries, no hidden state, so the
// same input always yields an identical verdict.
//
// Decision policy:
// 1.  **One-vs-Rest**: each model speaks for one feature. Its positive observation (any
//     label other than its rest label) flags the image when it meets the threshold.
// 2.  **Multi-Class**: labels are read in descending confidence. The first one that is
//     not the model's safe label and meets the threshold is the model's single flag.
// 3.  **Collect All Evidence**: the image is unsafe if any model flagged it, and every
//     flag is kept, in registry order, so a report can show each objection.
// 4.  **Supporting Evidence**: a safe verdict also records the strongest safe-label
//     observation from the multi-class models. It is informational only.
//
// Comparisons are inclusive: a confidence exactly at the threshold flags the image.

use crate::core_modules::observation::{DecisionMode, FlaggingDetection, ModelOutcome, Observation};
use serde::Serialize;

/// The per-image decision plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// True exactly when `flagging_detections` is empty.
    pub is_safe: bool,
    pub flagging_detections: Vec<FlaggingDetection>,
    pub all_outcomes: Vec<ModelOutcome>,
    /// Strongest multi-class safe-label observation. Only set for safe verdicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_evidence: Option<Observation>,
}

impl Verdict {
    /// Outcomes of models that failed on this image.
    pub fn failed_outcomes(&self) -> impl Iterator<Item = &ModelOutcome> {
        self.all_outcomes.iter().filter(|outcome| outcome.is_failed())
    }
}

/// Applies the decision policy to the outcomes of one image.
pub fn aggregate(outcomes: &[ModelOutcome], threshold: f32) -> Verdict {
    let flagging_detections: Vec<FlaggingDetection> = outcomes
        .iter()
        .filter_map(|outcome| flagging_detection(outcome, threshold))
        .collect();

    let is_safe = flagging_detections.is_empty();
    let safe_evidence = if is_safe { strongest_safe_observation(outcomes) } else { None };

    Verdict {
        is_safe,
        flagging_detections,
        all_outcomes: outcomes.to_vec(),
        safe_evidence,
    }
}

/// At most one detection per model.
fn flagging_detection(outcome: &ModelOutcome, threshold: f32) -> Option<FlaggingDetection> {
    let flagged = match &outcome.mode {
        DecisionMode::OneVsRest { rest_label } => outcome
            .ranked_observations()
            .into_iter()
            .find(|observation| observation.label != *rest_label)
            .filter(|positive| positive.confidence >= threshold),
        DecisionMode::MultiClass { safe_label } => outcome
            .ranked_observations()
            .into_iter()
            .find(|observation| observation.label != *safe_label && observation.confidence >= threshold),
    }?;

    Some(FlaggingDetection {
        model_name: outcome.model_name.clone(),
        label: flagged.label.clone(),
        confidence: flagged.confidence,
    })
}

fn strongest_safe_observation(outcomes: &[ModelOutcome]) -> Option<Observation> {
    let mut best: Option<&Observation> = None;
    for outcome in outcomes {
        let DecisionMode::MultiClass { safe_label } = &outcome.mode else {
            continue;
        };
        for observation in outcome.observations.iter().filter(|o| o.label == *safe_label) {
            if best.is_none_or(|current| observation.confidence > current.confidence) {
                best = Some(observation);
            }
        }
    }
    best.cloned()
}
