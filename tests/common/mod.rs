#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use screening_kit::core_modules::observation::Observation;
use screening_kit::{BoxError, ImageInput, InferenceEngine};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// A scripted model. On disk it is a JSON artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum FakeModel {
    /// Always emits the same observations.
    Fixed {
        observations: Vec<(String, f32)>,
        #[serde(default)]
        delay_ms: u64,
    },
    /// Emits `label` at red/255 and `sentinel` at the remainder. Sleeps for a delay
    /// derived from the green channel, so completion order varies per image.
    RedChannel {
        label: String,
        sentinel: String,
        #[serde(default)]
        jitter_ms: u64,
    },
    /// Errors on every call.
    Failing,
}

#[derive(Default)]
pub struct FakeEngine {
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeEngine {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The largest number of `classify` calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn run(&self, model: &FakeModel, raster: &RgbaImage) -> Result<Vec<Observation>, BoxError> {
        match model {
            FakeModel::Fixed { observations, delay_ms } => {
                std::thread::sleep(Duration::from_millis(*delay_ms));
                Ok(observations
                    .iter()
                    .map(|(label, confidence)| Observation::new(label.clone(), *confidence))
                    .collect())
            }
            FakeModel::RedChannel {
                label,
                sentinel,
                jitter_ms,
            } => {
                let pixel = raster.get_pixel(0, 0);
                if *jitter_ms > 0 {
                    std::thread::sleep(Duration::from_millis(pixel[1] as u64 % jitter_ms));
                }
                let confidence = pixel[0] as f32 / 255.0;
                Ok(vec![
                    Observation::new(sentinel.clone(), 1.0 - confidence),
                    Observation::new(label.clone(), confidence),
                ])
            }
            FakeModel::Failing => Err("simulated accelerator fault".into()),
        }
    }
}

impl InferenceEngine for FakeEngine {
    type Model = FakeModel;

    fn load_model(&self, artifact: &Path) -> Result<FakeModel, BoxError> {
        let text = fs::read_to_string(artifact)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn classify(&self, model: &FakeModel, raster: &RgbaImage) -> Result<Vec<Observation>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.run(model, raster);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn fixed(observations: &[(&str, f32)], delay_ms: u64) -> FakeModel {
    FakeModel::Fixed {
        observations: observations.iter().map(|(l, c)| (l.to_string(), *c)).collect(),
        delay_ms,
    }
}

pub fn red_channel(label: &str, sentinel: &str, jitter_ms: u64) -> FakeModel {
    FakeModel::RedChannel {
        label: label.to_string(),
        sentinel: sentinel.to_string(),
        jitter_ms,
    }
}

/// A 2x2 raster whose red channel sets `RedChannel` confidences.
pub fn raster(red: u8, green: u8) -> ImageInput {
    RgbaImage::from_pixel(2, 2, Rgba([red, green, 0, 255])).into()
}

/// Bytes no decoder can read.
pub fn garbage() -> ImageInput {
    ImageInput::Encoded(vec![0xde, 0xad, 0xbe, 0xef])
}

/// A temporary model directory filled with JSON artifacts.
pub struct ModelDir {
    _tmp: TempDir,
    pub path: PathBuf,
}

impl ModelDir {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("Resources");
        fs::create_dir_all(&path).expect("create model dir");
        Self { _tmp: tmp, path }
    }

    pub fn write_raw(&self, file_name: &str, contents: &str) -> &Self {
        fs::write(self.path.join(file_name), contents).expect("write artifact");
        self
    }

    pub fn write_model(&self, file_name: &str, model: serde_json::Value) -> &Self {
        self.write_raw(file_name, &model.to_string())
    }
}
