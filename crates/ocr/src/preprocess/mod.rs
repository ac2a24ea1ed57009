//! Image conditioning: an ordered chain of grayscale transforms that leaves
//! dark, upright, continuous strokes on a clean white page.

pub mod artifacts;
pub mod denoise;
pub mod deskew;
pub mod geometry;
pub mod morphology;
pub mod stroke;

use image::{DynamicImage, GrayImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::recognizer::{OcrBackend, OcrError};

pub use artifacts::ArtifactRemover;
pub use denoise::Denoiser;
pub use deskew::Deskewer;
pub use stroke::{StrokeGrow, StrokeShrink};

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
    #[error("Word box detection failed: {0}")]
    Ocr(#[from] OcrError),
}

/// One configured transform. Stages keep no state between calls.
pub trait ImageStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, image: GrayImage) -> Result<GrayImage, PreprocessError>;
}

/// Runs stages in order, handing each one the previous stage's output.
pub struct Conditioner {
    stages: Vec<Box<dyn ImageStage>>,
}

impl Conditioner {
    pub fn new(stages: Vec<Box<dyn ImageStage>>) -> Self {
        Self { stages }
    }

    /// denoise → remove artifacts → deskew → grow → shrink → grow.
    pub fn standard(config: &PipelineConfig, ocr: Arc<dyn OcrBackend>) -> Self {
        Self::new(vec![
            Box::new(Denoiser::new(config.denoise.clone())),
            Box::new(ArtifactRemover::new(ocr, config.artifacts.clone())),
            Box::new(Deskewer::new(config.deskew.clone())),
            Box::new(StrokeGrow::new(config.stroke.clone())),
            Box::new(StrokeShrink::new(config.stroke.clone())),
            Box::new(StrokeGrow::new(config.stroke.clone())),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, image: GrayImage) -> Result<GrayImage, PreprocessError> {
        self.stages.iter().try_fold(image, |img, stage| {
            tracing::debug!(stage = stage.name(), width = img.width(), height = img.height(), "Applying stage");
            stage.apply(img)
        })
    }
}

/// Load any supported raster as single-channel grayscale.
pub fn load_grayscale(path: &Path) -> Result<GrayImage, PreprocessError> {
    Ok(image::open(path)?.to_luma8())
}

pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}
