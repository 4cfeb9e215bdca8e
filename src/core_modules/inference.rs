// THEORY:
// The `inference` module is the boundary between the screening core and the outside
// world. The core never classifies pixels and never parses model files itself; it
// talks to two narrow traits instead:
//
// 1.  **InferenceEngine**: loads a model artifact into an engine-specific handle and
//     runs one handle against one raster. The handle type is an associated type, so
//     the engine's model representation stays opaque and fully typed at once.
// 2.  **ImageDecoder**: turns an `ImageInput` into an RGBA raster. A decode failure is
//     the only trigger for the fail-closed "skipped" path in the batch screener.
//
// `StandardDecoder` is the default decoder, built on the `image` crate.

use crate::core_modules::observation::Observation;
use crate::error::{BoxError, Result, ScreeningError};
use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};

/// The external classifier backend.
///
/// Both methods run on tokio's blocking pool, so implementations may do heavy,
/// synchronous work.
pub trait InferenceEngine: Send + Sync + 'static {
    /// A loaded model, shared read-only across concurrent calls.
    type Model: Send + Sync + 'static;

    /// Loads a single model artifact.
    fn load_model(&self, artifact: &Path) -> std::result::Result<Self::Model, BoxError>;

    /// Classifies one raster with one model. Zero observations is a valid answer.
    fn classify(&self, model: &Self::Model, raster: &RgbaImage) -> std::result::Result<Vec<Observation>, BoxError>;
}

/// An image as handed to the screener, before decoding.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Encoded bytes in any format the decoder understands (PNG, JPEG, ...).
    Encoded(Vec<u8>),
    /// A file on disk.
    Path(PathBuf),
    /// An image that is already decoded.
    Raster(DynamicImage),
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Encoded(bytes)
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        ImageInput::Raster(image)
    }
}

impl From<RgbaImage> for ImageInput {
    fn from(image: RgbaImage) -> Self {
        ImageInput::Raster(DynamicImage::ImageRgba8(image))
    }
}

/// Turns inputs into rasters. Must fail with `ScreeningError::ImageUndecodable`.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, input: &ImageInput) -> Result<RgbaImage>;
}

/// Decodes with the `image` crate. Zero-sized rasters are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDecoder;

impl ImageDecoder for StandardDecoder {
    fn decode(&self, input: &ImageInput) -> Result<RgbaImage> {
        let raster = match input {
            ImageInput::Encoded(bytes) => image::load_from_memory(bytes)
                .map_err(|e| ScreeningError::ImageUndecodable(e.to_string()))?
                .to_rgba8(),
            ImageInput::Path(path) => image::open(path)
                .map_err(|e| ScreeningError::ImageUndecodable(format!("{}: {e}", path.display())))?
                .to_rgba8(),
            ImageInput::Raster(image) => image.to_rgba8(),
        };

        if raster.width() == 0 || raster.height() == 0 {
            return Err(ScreeningError::ImageUndecodable(format!(
                "empty raster ({}x{})",
                raster.width(),
                raster.height()
            )));
        }
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let raster = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(raster)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn decodes_encoded_png() {
        let raster = StandardDecoder.decode(&ImageInput::Encoded(png_bytes(4, 3))).unwrap();
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.get_pixel(0, 0), &Rgba([200, 10, 10, 255]));
    }

    #[test]
    fn garbage_bytes_are_undecodable() {
        let err = StandardDecoder.decode(&ImageInput::Encoded(vec![1, 2, 3, 4])).unwrap_err();
        assert!(matches!(err, ScreeningError::ImageUndecodable(_)));
    }

    #[test]
    fn empty_raster_is_undecodable() {
        let err = StandardDecoder.decode(&RgbaImage::new(0, 0).into()).unwrap_err();
        assert!(matches!(err, ScreeningError::ImageUndecodable(_)));
    }

    #[test]
    fn missing_file_is_undecodable() {
        let input = ImageInput::Path(PathBuf::from("/definitely/not/here.png"));
        assert!(matches!(StandardDecoder.decode(&input), Err(ScreeningError::ImageUndecodable(_))));
    }

    #[test]
    fn decodes_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, png_bytes(2, 2)).unwrap();
        let raster = StandardDecoder.decode(&ImageInput::Path(path)).unwrap();
        assert_eq!(raster.dimensions(), (2, 2));
    }
}
