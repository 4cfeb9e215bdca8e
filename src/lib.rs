// THEORY:
// This file is the main entry point for the `screening_kit` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (an app screening fetched images,
// a moderation service, a test harness).
//
// The primary goal is to export the `ScreeningPipeline`, the `ModelRegistry` it screens
// against, and the two boundary traits an embedding application implements
// (`InferenceEngine` and, optionally, `ImageDecoder`). The decision machinery in
// `core_modules` stays available for callers who need to drive a single stage, such as
// re-aggregating stored outcomes at a different threshold.

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use core_modules::inference::{ImageDecoder, ImageInput, InferenceEngine, StandardDecoder};
pub use core_modules::model_registry::{ClassifierModel, ModeRule, ModelRegistry, RegistryConfig};
pub use error::{BoxError, Result, ScreeningError};
pub use pipeline::{ScreeningConfig, ScreeningPipeline};
