// THEORY:
// The `report` module renders screening results into diagnostic text. Every function
// here is pure: it takes a result and returns a `String`. Where the text goes (stdout,
// a log line, a file) is the caller's decision.
//
// Key principles:
// 1.  **Traceability**: flagging detections are printed in aggregation order, never
//     re-sorted by confidence, so a reader can follow which model objected first.
// 2.  **Reproducibility**: confidences are always percentages with fixed precision
//     (`{:.1}%` in summaries, `{:.3}%` in detailed model dumps), which keeps golden
//     output tests stable.
// 3.  **Layering**: `render` is the short form. `render_detailed` adds every model's
//     raw observations and failures. `render_summary` and `render_json` cover a batch.

use crate::core_modules::aggregator::Verdict;
use crate::core_modules::results::{Screening, ScreeningResult, ScreeningResults};
use std::fmt::Write;

const RULE: &str = "==============================";

fn percent(confidence: f32) -> String {
    format!("{:.1}%", confidence * 100.0)
}

fn precise_percent(confidence: f32) -> String {
    format!("{:.3}%", confidence * 100.0)
}

/// Renders the short report for one result.
pub fn render(result: &ScreeningResult) -> String {
    render_with(result, false)
}

/// Renders the report with every model's observations listed.
pub fn render_detailed(result: &ScreeningResult) -> String {
    render_with(result, true)
}

fn render_with(result: &ScreeningResult, detailed: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- [image {}] screening report ---", result.index + 1);

    match &result.screening {
        Screening::Skipped { reason } => {
            let _ = writeln!(out, "[result] Image judged unsafe: inference skipped.");
            let _ = writeln!(out, "  reason: {reason}");
        }
        Screening::Screened(verdict) => {
            if detailed {
                write_model_outputs(&mut out, verdict);
            }
            write_verdict(&mut out, verdict);
            if !detailed {
                let failed: Vec<&str> = verdict.failed_outcomes().map(|o| o.model_name.as_str()).collect();
                if !failed.is_empty() {
                    let _ = writeln!(out, "  note: {} model(s) failed: {}", failed.len(), failed.join(", "));
                }
            }
        }
    }

    let _ = writeln!(out, "{RULE}");
    out
}

fn write_model_outputs(out: &mut String, verdict: &Verdict) {
    let _ = writeln!(out, "  detailed model output:");
    for outcome in &verdict.all_outcomes {
        let _ = writeln!(out, "    model: {} ({})", outcome.model_name, outcome.mode.name());
        if let Some(cause) = &outcome.failure {
            let _ = writeln!(out, "      failed: {cause}");
            continue;
        }
        if outcome.observations.is_empty() {
            let _ = writeln!(out, "      no observations");
        }
        for observation in outcome.ranked_observations() {
            let _ = writeln!(
                out,
                "      class: {}, confidence: {}",
                observation.label,
                precise_percent(observation.confidence)
            );
        }
    }
    if verdict.is_safe {
        match &verdict.safe_evidence {
            Some(evidence) => {
                let _ = writeln!(
                    out,
                    "  strongest safe-label confidence: {} (class: '{}')",
                    precise_percent(evidence.confidence),
                    evidence.label
                );
            }
            None => {
                let _ = writeln!(out, "  no safe-label classification available");
            }
        }
    }
    let _ = writeln!(out, "  -----------------------------");
}

fn write_verdict(out: &mut String, verdict: &Verdict) {
    if verdict.is_safe {
        match &verdict.safe_evidence {
            Some(evidence) => {
                let _ = writeln!(out, "[result] Image judged safe (class: {}).", evidence.label);
                let _ = writeln!(out, "  confidence: {}", percent(evidence.confidence));
            }
            None => {
                let _ = writeln!(
                    out,
                    "[result] Image judged safe. No supporting evidence available (no safe-label observation from a multi-class model)."
                );
            }
        }
    } else {
        let _ = writeln!(out, "[result] Image judged unsafe by the following detections:");
        for (position, detection) in verdict.flagging_detections.iter().enumerate() {
            let _ = writeln!(out, "  {}. model: {}", position + 1, detection.model_name);
            let _ = writeln!(out, "     class: {}", detection.label);
            let _ = writeln!(out, "     confidence: {}", percent(detection.confidence));
        }
    }
}

/// Renders the batch summary block.
pub fn render_summary(results: &ScreeningResults) -> String {
    let summary = results.summary();
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "SCREENING SUMMARY");
    let _ = writeln!(out, "{RULE}");
    for result in results {
        let status = if result.is_skipped() {
            "skipped (unsafe)".to_string()
        } else if result.is_safe {
            "safe".to_string()
        } else {
            let labels: Vec<String> = result
                .flagging_detections()
                .iter()
                .map(|d| format!("{} {}", d.label, percent(d.confidence)))
                .collect();
            format!("unsafe ({})", labels.join(", "))
        };
        let _ = writeln!(out, "  image {}: {status}", result.index + 1);
    }
    let _ = writeln!(out, "  total images:       {}", summary.total);
    let _ = writeln!(out, "  safe:               {}", summary.safe);
    let _ = writeln!(out, "  unsafe:             {}", summary.flagged);
    let _ = writeln!(out, "  skipped:            {}", summary.skipped);
    let _ = writeln!(out, "  failed model calls: {}", summary.failed_model_calls);
    let _ = writeln!(out, "  flagged features:   {}", summary.flagged_features.len());
    let _ = writeln!(out, "{RULE}");
    out
}

/// Serialises results and summary as pretty JSON.
pub fn render_json(results: &ScreeningResults) -> String {
    let output = serde_json::json!({
        "results": results,
        "summary": results.summary(),
    });
    serde_json::to_string_pretty(&output).unwrap_or_default()
}
