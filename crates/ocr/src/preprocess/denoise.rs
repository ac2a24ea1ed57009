use image::{GrayImage, Luma};
use imageproc::filter::median_filter;

use super::{ImageStage, PreprocessError};
use crate::config::DenoiseConfig;

/// Global binarization followed by a median filter, which clears isolated
/// specks from a binary image without blurring stroke edges.
#[derive(Debug, Clone)]
pub struct Denoiser {
    config: DenoiseConfig,
}

impl Denoiser {
    pub fn new(config: DenoiseConfig) -> Self {
        Self { config }
    }
}

impl ImageStage for Denoiser {
    fn name(&self) -> &'static str {
        "denoise"
    }

    fn apply(&self, image: GrayImage) -> Result<GrayImage, PreprocessError> {
        let binary = binarize(&image, self.config.threshold);
        let radius = self.config.median_radius;
        if radius == 0 {
            return Ok(binary);
        }
        Ok(median_filter(&binary, radius, radius))
    }
}

/// Pixels brighter than `threshold` become white, the rest black.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y)[0] > threshold { 255 } else { 0 }])
    })
}
