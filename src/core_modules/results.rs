// THEORY:
// The `results` module binds verdicts back to the inputs they came from. A batch of N
// images always produces exactly N `ScreeningResult`s, and result `i` always describes
// input `i`, whatever order the models happened to finish in.
//
// An image either went through the models (`Screening::Screened`) or never reached them
// because it could not be decoded (`Screening::Skipped`). Skipped images are unsafe by
// policy: without model evidence nothing certifies them. Keeping the two cases apart
// lets `Verdict` keep its invariant (`is_safe` iff no detections) while a skipped
// result is unsafe with no detections at all.

use crate::core_modules::aggregator::Verdict;
use crate::core_modules::observation::FlaggingDetection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Screening {
    Screened(Verdict),
    /// Inference never ran.
    Skipped { reason: String },
}

/// The outcome for the image at `index` in the input sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningResult {
    pub index: usize,
    pub is_safe: bool,
    pub screening: Screening,
}

impl ScreeningResult {
    pub fn screened(index: usize, verdict: Verdict) -> Self {
        Self {
            index,
            is_safe: verdict.is_safe,
            screening: Screening::Screened(verdict),
        }
    }

    /// Fail-closed result for an image that could not be decoded.
    pub fn skipped(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            is_safe: false,
            screening: Screening::Skipped { reason: reason.into() },
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.screening {
            Screening::Screened(verdict) => Some(verdict),
            Screening::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.screening, Screening::Skipped { .. })
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.screening {
            Screening::Skipped { reason } => Some(reason),
            Screening::Screened(_) => None,
        }
    }

    /// Empty for safe and for skipped images.
    pub fn flagging_detections(&self) -> &[FlaggingDetection] {
        self.verdict().map(|v| v.flagging_detections.as_slice()).unwrap_or(&[])
    }
}

/// One image flagged for a given label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelHit {
    pub index: usize,
    pub model_name: String,
    pub confidence: f32,
}

/// Batch-level counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub safe: usize,
    /// Unsafe images, skipped ones included.
    pub flagged: usize,
    pub skipped: usize,
    /// Per-model inference failures across the whole batch.
    pub failed_model_calls: usize,
    /// Distinct labels that flagged at least one image.
    pub flagged_features: BTreeSet<String>,
}

/// Order-preserving results for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreeningResults {
    results: Vec<ScreeningResult>,
}

impl ScreeningResults {
    pub fn new(results: Vec<ScreeningResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ScreeningResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ScreeningResult> {
        self.results
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScreeningResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn safe_indices(&self) -> Vec<usize> {
        self.results.iter().filter(|r| r.is_safe).map(|r| r.index).collect()
    }

    /// The inputs judged safe, in their original order.
    pub fn safe_items<'a, T>(&self, inputs: &'a [T]) -> Vec<&'a T> {
        self.results
            .iter()
            .filter(|r| r.is_safe)
            .filter_map(|r| inputs.get(r.index))
            .collect()
    }

    /// Every flagging detection in the batch grouped by label.
    pub fn flagged_by_label(&self) -> BTreeMap<String, Vec<LabelHit>> {
        let mut grouped: BTreeMap<String, Vec<LabelHit>> = BTreeMap::new();
        for result in &self.results {
            for detection in result.flagging_detections() {
                grouped.entry(detection.label.clone()).or_default().push(LabelHit {
                    index: result.index,
                    model_name: detection.model_name.clone(),
                    confidence: detection.confidence,
                });
            }
        }
        grouped
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.results.len(),
            ..BatchSummary::default()
        };
        for result in &self.results {
            if result.is_safe {
                summary.safe += 1;
            } else {
                summary.flagged += 1;
            }
            match &result.screening {
                Screening::Skipped { .. } => summary.skipped += 1,
                Screening::Screened(verdict) => {
                    summary.failed_model_calls += verdict.failed_outcomes().count();
                    summary
                        .flagged_features
                        .extend(verdict.flagging_detections.iter().map(|d| d.label.clone()));
                }
            }
        }
        summary
    }
}

impl<'a> IntoIterator for &'a ScreeningResults {
    type Item = &'a ScreeningResult;
    type IntoIter = std::slice::Iter<'a, ScreeningResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::aggregator::aggregate;
    use crate::core_modules::observation::{DecisionMode, ModelOutcome, Observation};

    fn batch() -> ScreeningResults {
        let unsafe_outcomes = vec![
            ModelOutcome::completed("A", DecisionMode::one_vs_rest("Rest"), vec![Observation::new("fangs", 0.9)]),
            ModelOutcome::failed("B", DecisionMode::one_vs_rest("Rest"), "boom"),
        ];
        let safe_outcomes = vec![ModelOutcome::completed(
            "A",
            DecisionMode::one_vs_rest("Rest"),
            vec![Observation::new("fangs", 0.1)],
        )];
        ScreeningResults::new(vec![
            ScreeningResult::screened(0, aggregate(&safe_outcomes, 0.65)),
            ScreeningResult::screened(1, aggregate(&unsafe_outcomes, 0.65)),
            ScreeningResult::skipped(2, "image undecodable: truncated"),
            ScreeningResult::screened(3, aggregate(&safe_outcomes, 0.65)),
        ])
    }

    #[test]
    fn skipped_result_is_unsafe_without_detections() {
        let result = ScreeningResult::skipped(4, "bad bytes");
        assert!(!result.is_safe);
        assert!(result.is_skipped());
        assert!(result.flagging_detections().is_empty());
        assert_eq!(result.verdict(), None);
        assert_eq!(result.skip_reason(), Some("bad bytes"));
    }

    #[test]
    fn safe_items_keep_input_order() {
        let inputs = ["first", "second", "third", "fourth"];
        let results = batch();
        assert_eq!(results.safe_indices(), vec![0, 3]);
        assert_eq!(results.safe_items(&inputs), vec![&"first", &"fourth"]);
    }

    #[test]
    fn flagged_by_label_groups_hits() {
        let grouped = batch().flagged_by_label();
        assert_eq!(grouped.len(), 1);
        assert_eq!(
            grouped["fangs"],
            vec![LabelHit {
                index: 1,
                model_name: "A".to_string(),
                confidence: 0.9,
            }]
        );
    }

    #[test]
    fn summary_counts() {
        let summary = batch().summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.safe, 2);
        assert_eq!(summary.flagged, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed_model_calls, 1);
        assert_eq!(summary.flagged_features.into_iter().collect::<Vec<_>>(), vec!["fangs".to_string()]);
    }
}
