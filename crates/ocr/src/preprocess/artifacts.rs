use image::{GrayImage, Luma};
use std::sync::Arc;

use super::{encode_png, ImageStage, PreprocessError};
use crate::config::ArtifactConfig;
use crate::recognizer::{OcrBackend, WordBox};

/// Flattens everything outside plausible word boxes to white.
///
/// Boxes come from the OCR engine's layout analysis. A box is kept only when
/// its area, as a fraction of the image area, lies strictly between the
/// configured bounds: tiny boxes are specks, a huge one is usually the page.
pub struct ArtifactRemover {
    ocr: Arc<dyn OcrBackend>,
    config: ArtifactConfig,
}

impl ArtifactRemover {
    pub fn new(ocr: Arc<dyn OcrBackend>, config: ArtifactConfig) -> Self {
        Self { ocr, config }
    }
}

impl ImageStage for ArtifactRemover {
    fn name(&self) -> &'static str {
        "remove-artifacts"
    }

    fn apply(&self, image: GrayImage) -> Result<GrayImage, PreprocessError> {
        let boxes = self.ocr.word_boxes(&encode_png(&image)?)?;
        tracing::debug!(boxes = boxes.len(), "Word boxes located");
        Ok(keep_text_boxes(&image, &boxes, &self.config))
    }
}

/// Keep pixels inside accepted boxes; everything else becomes background.
pub fn keep_text_boxes(image: &GrayImage, boxes: &[WordBox], config: &ArtifactConfig) -> GrayImage {
    let (width, height) = image.dimensions();
    let image_area = f64::from(width) * f64::from(height);
    if image_area == 0.0 {
        return image.clone();
    }

    let mut mask = vec![false; (width as usize) * (height as usize)];
    let kept = boxes.iter().filter(|b| {
        let frac = b.area() as f64 / image_area;
        frac > config.area_frac_lo && frac < config.area_frac_hi
    });
    for b in kept {
        let x_end = b.left.saturating_add(b.width).min(width);
        let y_end = b.top.saturating_add(b.height).min(height);
        for y in b.top.min(height)..y_end {
            let row = y as usize * width as usize;
            for x in b.left.min(width)..x_end {
                mask[row + x as usize] = true;
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        if mask[y as usize * width as usize + x as usize] {
            *image.get_pixel(x, y)
        } else {
            Luma([255])
        }
    })
}
