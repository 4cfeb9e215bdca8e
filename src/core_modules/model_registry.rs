// THEORY:
// The `ModelRegistry` owns every classifier the screener will consult. It is built
// exactly once, either by scanning a model directory or from models the caller has
// already loaded, and is read-only from then on. Sharing it across concurrent batches
// is a matter of cloning an `Arc`.
//
// Key architectural principles:
// 1.  **All-or-Nothing Loading**: Screening with fewer safety models than were shipped
//     is a silent correctness regression. A missing directory, an empty directory, or
//     a single broken artifact fails the whole construction.
// 2.  **Mode Resolution at Load Time**: Each artifact's `DecisionMode` (and with it the
//     model's sentinel label) is decided from its name via `RegistryConfig::mode_rules`.
//     Nothing downstream ever inspects result types at runtime.
// 3.  **Deterministic Order**: Artifacts are loaded in path order. Registry order is
//     the order of outcomes, of detections, and of report lines.

use crate::core_modules::inference::InferenceEngine;
use crate::core_modules::observation::DecisionMode;
use crate::error::{Result, ScreeningError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

/// Maps artifacts whose name starts with `name_prefix` to a decision mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRule {
    pub name_prefix: String,
    pub mode: DecisionMode,
}

/// Configuration for model discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Extension of a compiled model artifact, without the leading dot. Artifacts may
    /// be plain files or directory bundles.
    pub artifact_extension: String,
    /// Checked in order; the first matching prefix wins.
    pub mode_rules: Vec<ModeRule>,
    /// Mode for artifacts no rule matches.
    pub default_mode: DecisionMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            artifact_extension: "mlmodelc".to_string(),
            mode_rules: vec![ModeRule {
                name_prefix: "ScaryCatScreeningML_MultiClass".to_string(),
                mode: DecisionMode::multi_class("safe"),
            }],
            default_mode: DecisionMode::one_vs_rest("Rest"),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.artifact_extension.trim_start_matches('.').is_empty() {
            return Err(ScreeningError::InvalidConfig(
                "artifact_extension must not be empty".to_string(),
            ));
        }
        let modes = self
            .mode_rules
            .iter()
            .map(|rule| &rule.mode)
            .chain(std::iter::once(&self.default_mode));
        for mode in modes {
            if mode.sentinel().is_empty() {
                return Err(ScreeningError::InvalidConfig(format!(
                    "{} mode requires a non-empty sentinel label",
                    mode.name()
                )));
            }
        }
        if let Some(rule) = self.mode_rules.iter().find(|rule| rule.name_prefix.is_empty()) {
            return Err(ScreeningError::InvalidConfig(format!(
                "mode rule for {} has an empty name_prefix",
                rule.mode.name()
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScreeningError::InvalidConfig(format!("JSON parse error: {e}")))
    }

    /// The decision mode for an artifact with the given model name.
    pub fn mode_for(&self, model_name: &str) -> DecisionMode {
        self.mode_rules
            .iter()
            .find(|rule| model_name.starts_with(&rule.name_prefix))
            .map(|rule| rule.mode.clone())
            .unwrap_or_else(|| self.default_mode.clone())
    }

    fn extension(&self) -> &str {
        self.artifact_extension.trim_start_matches('.')
    }
}

/// A loaded classifier plus the metadata the screener needs about it.
#[derive(Debug)]
pub struct ClassifierModel<M> {
    pub name: String,
    pub mode: DecisionMode,
    pub handle: M,
}

impl<M> ClassifierModel<M> {
    pub fn new(name: impl Into<String>, mode: DecisionMode, handle: M) -> Self {
        Self {
            name: name.into(),
            mode,
            handle,
        }
    }
}

/// The immutable set of models every image is screened against.
pub struct ModelRegistry<E: InferenceEngine> {
    engine: Arc<E>,
    models: Vec<Arc<ClassifierModel<E::Model>>>,
    location: String,
}

impl<E: InferenceEngine> ModelRegistry<E> {
    /// Discovers every artifact under `source` and loads it through `engine`.
    pub fn load(source: impl AsRef<Path>, engine: E, config: &RegistryConfig) -> Result<Self> {
        config.validate()?;
        let source = source.as_ref();
        if !source.is_dir() {
            return Err(ScreeningError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let artifacts = discover_artifacts(source, config.extension())?;
        if artifacts.is_empty() {
            return Err(ScreeningError::NoModelsFound {
                location: source.display().to_string(),
            });
        }

        let mut models = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let name = model_name(&artifact);
            let mode = config.mode_for(&name);
            log::debug!("Loading {} model '{}' from {}", mode.name(), name, artifact.display());

            let handle = engine
                .load_model(&artifact)
                .map_err(|cause| ScreeningError::ModelLoadFailed {
                    model: name.clone(),
                    cause,
                })?;
            models.push(ClassifierModel::new(name, mode, handle));
        }

        Self::build(Arc::new(engine), models, source.display().to_string())
    }

    /// Builds a registry from models the caller has already loaded.
    pub fn from_models(engine: E, models: Vec<ClassifierModel<E::Model>>) -> Result<Self> {
        Self::build(Arc::new(engine), models, "<in-memory>".to_string())
    }

    fn build(engine: Arc<E>, models: Vec<ClassifierModel<E::Model>>, location: String) -> Result<Self> {
        if models.is_empty() {
            return Err(ScreeningError::NoModelsFound { location });
        }

        let mut seen = HashSet::with_capacity(models.len());
        for model in &models {
            if !seen.insert(model.name.as_str()) {
                return Err(ScreeningError::ModelLoadFailed {
                    model: model.name.clone(),
                    cause: format!("duplicate model name in {location}").into(),
                });
            }
            if model.mode.sentinel().is_empty() {
                return Err(ScreeningError::ModelLoadFailed {
                    model: model.name.clone(),
                    cause: "decision mode has an empty sentinel label".into(),
                });
            }
        }

        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        log::info!("Loaded {} screening model(s) from {}: {}", models.len(), location, names.join(", "));

        Ok(Self {
            engine,
            models: models.into_iter().map(Arc::new).collect(),
            location,
        })
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn models(&self) -> &[Arc<ClassifierModel<E::Model>>] {
        &self.models
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    /// Where the models came from, for diagnostics.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

fn model_name(artifact: &Path) -> String {
    artifact
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.display().to_string())
}

/// Collects artifact paths in sorted order. Hidden entries are skipped and matched
/// bundle directories are not descended into.
fn discover_artifacts(source: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut artifacts = Vec::new();
    let mut walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| ScreeningError::ModelLoadFailed {
            model: e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| source.display().to_string()),
            cause: Box::new(e),
        })?;

        if has_extension(entry.path(), extension) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            artifacts.push(entry.into_path());
        }
    }

    artifacts.sort();
    Ok(artifacts)
}
