// THEORY:
// The `observation` module holds the "dumb" data containers that flow between the
// orchestrator and the aggregator. Nothing here knows about thresholds or verdicts.
//
// Key architectural principles:
// 1.  **Observation**: a single `(label, confidence)` pair exactly as a model emitted
//     it, after the confidence has been forced into `[0, 1]`.
// 2.  **DecisionMode**: how a model's observations must be read. It is a tagged enum
//     resolved once when the model is loaded, and it carries the model's own sentinel
//     label, so no string literal like "Rest" or "safe" is hardcoded anywhere.
// 3.  **ModelOutcome**: everything one model said about one image, or the reason it
//     could not say anything. A failed outcome is still an outcome: it keeps its slot.

use crate::error::ScreeningError;
use serde::{Deserialize, Serialize};

/// One `(label, confidence)` pair produced by a single inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub label: String,
    /// Always within `[0, 1]` once it has passed through the orchestrator.
    pub confidence: f32,
}

impl Observation {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Brings a raw engine value into the `[0, 1]` range.
    /// Returns `None` for NaN or infinite confidences, which carry no evidence.
    pub fn sanitized(self) -> Option<Self> {
        if !self.confidence.is_finite() {
            return None;
        }
        Some(Self {
            // `+ 0.0` folds -0.0 into 0.0 so reports never print "-0.0%".
            confidence: self.confidence.clamp(0.0, 1.0) + 0.0,
            ..self
        })
    }
}

/// How a model's output is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionMode {
    /// One model, many labels. `safe_label` marks the "nothing objectionable" class.
    MultiClass { safe_label: String },
    /// One model per feature. Any label other than `rest_label` is the positive class.
    OneVsRest { rest_label: String },
}

impl DecisionMode {
    pub fn multi_class(safe_label: impl Into<String>) -> Self {
        DecisionMode::MultiClass {
            safe_label: safe_label.into(),
        }
    }

    pub fn one_vs_rest(rest_label: impl Into<String>) -> Self {
        DecisionMode::OneVsRest {
            rest_label: rest_label.into(),
        }
    }

    /// The label that means "not flagged" for this model.
    pub fn sentinel(&self) -> &str {
        match self {
            DecisionMode::MultiClass { safe_label } => safe_label,
            DecisionMode::OneVsRest { rest_label } => rest_label,
        }
    }

    pub fn is_sentinel(&self, label: &str) -> bool {
        self.sentinel() == label
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecisionMode::MultiClass { .. } => "multi-class",
            DecisionMode::OneVsRest { .. } => "one-vs-rest",
        }
    }
}

/// One model's complete answer for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelOutcome {
    pub model_name: String,
    pub mode: DecisionMode,
    /// Observations in the order the engine returned them.
    pub observations: Vec<Observation>,
    /// The cause when the model failed on this image. Failed outcomes have no observations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ModelOutcome {
    pub fn completed(model_name: impl Into<String>, mode: DecisionMode, observations: Vec<Observation>) -> Self {
        Self {
            model_name: model_name.into(),
            mode,
            observations,
            failure: None,
        }
    }

    pub fn failed(model_name: impl Into<String>, mode: DecisionMode, cause: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            mode,
            observations: Vec::new(),
            failure: Some(cause.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// The isolated per-model error, if this outcome records one.
    pub fn error(&self) -> Option<ScreeningError> {
        self.failure.as_ref().map(|cause| ScreeningError::ModelInferenceFailed {
            model: self.model_name.clone(),
            cause: cause.clone(),
        })
    }

    /// Observations sorted by descending confidence. Equal confidences keep engine order.
    pub fn ranked_observations(&self) -> Vec<&Observation> {
        let mut ranked: Vec<&Observation> = self.observations.iter().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked
    }
}

/// A non-sentinel observation that met the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggingDetection {
    pub model_name: String,
    pub label: String,
    pub confidence: f32,
}
