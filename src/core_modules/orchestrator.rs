// THEORY:
// The orchestrator is the fan-out stage for a single, already decoded image. Every
// registered model gets its own inference call, and all calls are in flight at once.
// The orchestrator then waits for every one of them before handing the collected
// outcomes to the aggregator.
//
// Key architectural principles:
// 1.  **Blocking Pool Fan-Out**: On-device inference is CPU/accelerator bound, not I/O
//     bound. Each call runs through `tokio::task::spawn_blocking`, and the join is a
//     `futures::future::join_all` over the handles.
// 2.  **Failure Isolation**: A model that returns an error, or panics, becomes a failed
//     `ModelOutcome` with no observations. Its siblings keep running and their votes
//     still count.
// 3.  **Slot-Per-Model Collection**: Handles are joined in registry order, so each
//     outcome lands in its own slot no matter which model finishes first. No locks are
//     taken during the fan-out.
// 4.  **Boundary Sanitation**: Confidences leave this module inside `[0, 1]`. Values
//     outside the range are clamped and non-finite values are dropped.

use crate::core_modules::inference::InferenceEngine;
use crate::core_modules::model_registry::ModelRegistry;
use crate::core_modules::observation::{ModelOutcome, Observation};
use futures::future::join_all;
use image::RgbaImage;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

/// Runs every registered model against `raster` concurrently and returns one outcome
/// per model, in registry order.
pub async fn screen_image<E: InferenceEngine>(raster: RgbaImage, registry: &ModelRegistry<E>) -> Vec<ModelOutcome> {
    let raster = Arc::new(raster);
    let started = Instant::now();

    let handles: Vec<_> = registry
        .models()
        .iter()
        .map(|model| {
            let engine = Arc::clone(registry.engine());
            let model = Arc::clone(model);
            let raster = Arc::clone(&raster);
            tokio::task::spawn_blocking(move || engine.classify(&model.handle, &raster))
        })
        .collect();

    let joined = join_all(handles).await;

    let outcomes: Vec<ModelOutcome> = registry
        .models()
        .iter()
        .zip(joined)
        .map(|(model, result)| match result {
            Ok(Ok(observations)) => {
                let observations = sanitize(&model.name, observations);
                log::debug!("Model '{}' returned {} observation(s)", model.name, observations.len());
                ModelOutcome::completed(model.name.clone(), model.mode.clone(), observations)
            }
            Ok(Err(cause)) => {
                let outcome = ModelOutcome::failed(model.name.clone(), model.mode.clone(), cause.to_string());
                if let Some(error) = outcome.error() {
                    log::warn!("{error}");
                }
                outcome
            }
            Err(join_error) => {
                let cause = if join_error.is_panic() {
                    format!("inference panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    format!("inference task aborted: {join_error}")
                };
                let outcome = ModelOutcome::failed(model.name.clone(), model.mode.clone(), cause);
                if let Some(error) = outcome.error() {
                    log::warn!("{error}");
                }
                outcome
            }
        })
        .collect();

    log::debug!(
        "Screened image with {} model(s) in {:.2}ms",
        outcomes.len(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    outcomes
}

fn sanitize(model_name: &str, observations: Vec<Observation>) -> Vec<Observation> {
    observations
        .into_iter()
        .filter_map(|observation| {
            let raw = observation.confidence;
            let label = observation.label.clone();
            let sanitized = observation.sanitized();
            match &sanitized {
                None => log::warn!("Model '{model_name}' returned non-finite confidence for '{label}'; dropped"),
                Some(clean) if clean.confidence != raw => {
                    log::warn!("Model '{model_name}' returned out-of-range confidence {raw} for '{label}'; clamped")
                }
                Some(_) => {}
            }
            sanitized
        })
        .collect()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
