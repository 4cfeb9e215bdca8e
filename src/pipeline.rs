// THEORY:
// The `pipeline` module is the top-level API of the screening engine. It wraps the
// whole stack (decode, fan-out, aggregation, reporting) behind one struct that takes
// an ordered list of images and hands back one result per image, in the same order.
//
// Key architectural principles:
// 1.  **Sequential Across Images**: images are screened one after another. Peak
//     inference load is therefore one image's worth of model calls, which matches
//     on-device CPU/accelerator contention.
// 2.  **Index Before Inference**: each result's index is its input position, fixed
//     before any model runs. Reordering cannot happen.
// 3.  **Fail Closed, Keep Going**: an undecodable image becomes an unsafe, skipped
//     result and the batch moves on. Only a registry without models is fatal, and then
//     the caller gets an error instead of any results.
// 4.  **Shared, Immutable Registry**: the pipeline holds its registry behind an `Arc`,
//     so several pipelines (with different thresholds, say) can screen concurrently
//     against the same loaded models.

use crate::core_modules::aggregator::aggregate;
use crate::core_modules::inference::{ImageDecoder, InferenceEngine, StandardDecoder};
use crate::core_modules::model_registry::ModelRegistry;
use crate::core_modules::orchestrator::screen_image;
use crate::core_modules::report::{render, render_detailed};
use crate::error::{Result, ScreeningError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Re-export key data structures for the public API.
pub use crate::core_modules::aggregator::Verdict;
pub use crate::core_modules::inference::ImageInput;
pub use crate::core_modules::observation::{DecisionMode, FlaggingDetection, ModelOutcome, Observation};
pub use crate::core_modules::results::{BatchSummary, LabelHit, Screening, ScreeningResult, ScreeningResults};

/// Default confidence threshold at which a detection flags an image.
pub const DEFAULT_PROBABILITY_THRESHOLD: f32 = 0.65;

/// Configuration for the ScreeningPipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// A non-sentinel observation at or above this confidence flags the image.
    pub probability_threshold: f32,
    /// Log the detailed report of every image at `info`, safe ones included.
    /// When off, only unsafe images are reported at `info`.
    pub log_reports: bool,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
            log_reports: false,
        }
    }
}

impl ScreeningConfig {
    pub fn with_threshold(probability_threshold: f32) -> Self {
        Self {
            probability_threshold,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.probability_threshold) {
            return Err(ScreeningError::InvalidConfig(format!(
                "probability_threshold must be in [0, 1], got {}",
                self.probability_threshold
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScreeningError::InvalidConfig(format!("JSON parse error: {e}")))
    }
}

/// The main, top-level struct for the screening engine.
pub struct ScreeningPipeline<E: InferenceEngine> {
    registry: Arc<ModelRegistry<E>>,
    decoder: Box<dyn ImageDecoder>,
    config: ScreeningConfig,
}

impl<E: InferenceEngine> ScreeningPipeline<E> {
    /// Creates a pipeline that decodes inputs with the `image` crate.
    pub fn new(registry: Arc<ModelRegistry<E>>, config: ScreeningConfig) -> Result<Self> {
        Self::with_decoder(registry, StandardDecoder, config)
    }

    pub fn with_decoder(
        registry: Arc<ModelRegistry<E>>,
        decoder: impl ImageDecoder + 'static,
        config: ScreeningConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            decoder: Box::new(decoder),
            config,
        })
    }

    pub fn registry(&self) -> &Arc<ModelRegistry<E>> {
        &self.registry
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    /// Screens `images` in order. Returns exactly one result per input, or a single
    /// error if no models are available.
    pub async fn screen_batch(&self, images: &[ImageInput]) -> Result<ScreeningResults> {
        self.ensure_models()?;

        let mut results = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            results.push(self.screen_at(index, image).await);
        }

        let results = ScreeningResults::new(results);
        let summary = results.summary();
        log::info!(
            "Screened {} image(s): {} safe, {} unsafe ({} skipped)",
            summary.total,
            summary.safe,
            summary.flagged,
            summary.skipped
        );
        Ok(results)
    }

    /// Screens a single image. The result carries index 0.
    pub async fn screen_image(&self, image: &ImageInput) -> Result<ScreeningResult> {
        self.ensure_models()?;
        Ok(self.screen_at(0, image).await)
    }

    fn ensure_models(&self) -> Result<()> {
        if self.registry.is_empty() {
            return Err(ScreeningError::NoModelsFound {
                location: self.registry.location().to_string(),
            });
        }
        Ok(())
    }

    async fn screen_at(&self, index: usize, image: &ImageInput) -> ScreeningResult {
        let result = match self.decoder.decode(image) {
            Ok(raster) => {
                let outcomes = screen_image(raster, &*self.registry).await;
                ScreeningResult::screened(index, aggregate(&outcomes, self.config.probability_threshold))
            }
            Err(error) => {
                log::warn!("Image {} skipped: {error}", index + 1);
                ScreeningResult::skipped(index, error.to_string())
            }
        };
        self.log_report(&result);
        result
    }

    fn log_report(&self, result: &ScreeningResult) {
        if self.config.log_reports {
            log::info!("\n{}", render_detailed(result));
        } else if !result.is_safe {
            log::info!("\n{}", render(result));
        } else {
            log::debug!("\n{}", render(result));
        }
    }
}
