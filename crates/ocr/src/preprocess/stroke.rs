use image::GrayImage;

use super::morphology::{dilate_rect, erode_rect};
use super::{ImageStage, PreprocessError};
use crate::config::StrokeConfig;

// Text is dark on a light page, so eroding the page thickens the strokes
// and dilating the page thins them.

/// Thickens dark strokes.
#[derive(Debug, Clone)]
pub struct StrokeGrow {
    config: StrokeConfig,
}

impl StrokeGrow {
    pub fn new(config: StrokeConfig) -> Self {
        Self { config }
    }
}

impl ImageStage for StrokeGrow {
    fn name(&self) -> &'static str {
        "grow-strokes"
    }

    fn apply(&self, image: GrayImage) -> Result<GrayImage, PreprocessError> {
        Ok(erode_rect(&image, self.config.kernel, self.config.iterations))
    }
}

/// Thins dark strokes.
#[derive(Debug, Clone)]
pub struct StrokeShrink {
    config: StrokeConfig,
}

impl StrokeShrink {
    pub fn new(config: StrokeConfig) -> Self {
        Self { config }
    }
}

impl ImageStage for StrokeShrink {
    fn name(&self) -> &'static str {
        "shrink-strokes"
    }

    fn apply(&self, image: GrayImage) -> Result<GrayImage, PreprocessError> {
        Ok(dilate_rect(&image, self.config.kernel, self.config.iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn bar() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            Luma([if (8..12).contains(&x) && (4..16).contains(&y) { 0 } else { 255 }])
        })
    }

    fn dark_count(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p[0] == 0).count()
    }

    #[test]
    fn grow_thickens_dark_strokes() {
        let out = StrokeGrow::new(StrokeConfig::default()).apply(bar()).unwrap();
        assert!(dark_count(&out) > dark_count(&bar()));
        assert_eq!(out.get_pixel(13, 10)[0], 0);
    }

    #[test]
    fn shrink_thins_dark_strokes() {
        let out = StrokeShrink::new(StrokeConfig::default()).apply(bar()).unwrap();
        assert!(dark_count(&out) < dark_count(&bar()));
        assert_eq!(out.get_pixel(8, 10)[0], 255);
    }

    #[test]
    fn grow_shrink_grow_keeps_a_closed_gap_closed() {
        // Two strokes separated by a one-pixel gap.
        let img = GrayImage::from_fn(20, 10, |x, _| {
            Luma([if (4..9).contains(&x) || (10..15).contains(&x) { 0 } else { 255 }])
        });
        let cfg = StrokeConfig::default();
        let out = StrokeGrow::new(cfg.clone()).apply(img).unwrap();
        let out = StrokeShrink::new(cfg.clone()).apply(out).unwrap();
        let out = StrokeGrow::new(cfg).apply(out).unwrap();
        assert!((9..15).all(|x| out.get_pixel(x, 5)[0] == 0));
    }
}
