// THEORY:
// The `error` module is the single error vocabulary of the screening engine.
// Errors fall into two classes with very different propagation rules:
//
// 1.  **Construction errors** (`SourceNotFound`, `NoModelsFound`, `ModelLoadFailed`,
//     `InvalidConfig`) are fatal. They surface to the caller immediately and no
//     screening ever starts. Recovery means constructing again.
// 2.  **Screening errors** (`ImageUndecodable`, `ModelInferenceFailed`) are local to
//     one image or one model. They are absorbed into result data (a skipped result,
//     a failed outcome) and never cross the batch boundary as an `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// The error type external inference engines and decoders hand back to the core.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Root error type for all screening failures.
#[derive(Error, Debug)]
pub enum ScreeningError {
    /// The configured model source does not exist or is not a directory.
    #[error("model source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Discovery finished without a single model artifact.
    #[error("no models found in {location}")]
    NoModelsFound { location: String },

    /// One model artifact could not be loaded. Loading is all-or-nothing.
    #[error("failed to load model '{model}': {cause}")]
    ModelLoadFailed {
        model: String,
        #[source]
        cause: BoxError,
    },

    /// The input could not be turned into a raster at all.
    #[error("image undecodable: {0}")]
    ImageUndecodable(String),

    /// A single model failed while classifying a single image.
    #[error("inference failed for model '{model}': {cause}")]
    ModelInferenceFailed { model: String, cause: String },

    /// Configuration values are out of range or could not be parsed.
    #[error("config error: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = ScreeningError> = std::result::Result<T, E>;
