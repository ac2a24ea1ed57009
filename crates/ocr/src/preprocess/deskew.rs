use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{rotate, Interpolation};

use super::geometry::{min_area_rect, Point};
use super::morphology::dilate_rect;
use super::{ImageStage, PreprocessError};
use crate::config::DeskewConfig;

/// Smaller measured skews leave the page untouched instead of resampling it.
const NEGLIGIBLE_SKEW_DEGREES: f64 = 1e-6;

/// Straightens rotated text.
///
/// Characters on a line are smeared together with a wide, short dilation so
/// each line becomes one elongated blob. The skew is read from the rotated
/// bounding rectangles of the blobs that are large enough to trust.
#[derive(Debug, Clone)]
pub struct Deskewer {
    config: DeskewConfig,
}

impl Deskewer {
    pub fn new(config: DeskewConfig) -> Self {
        Self { config }
    }

    /// Skew in degrees, positive when text rises to the right.
    ///
    /// Among all blobs whose rotated rectangle covers at least
    /// `min_area_frac` of the image, the angle with the largest magnitude wins.
    pub fn measure_skew(&self, image: &GrayImage) -> f64 {
        let (width, height) = image.dimensions();
        let min_area = self.config.min_area_frac * f64::from(width) * f64::from(height);

        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(image, self.config.blur_sigma)
        } else {
            image.clone()
        };
        // Text becomes the white foreground.
        let level = otsu_level(&blurred);
        let binary = GrayImage::from_fn(width, height, |x, y| {
            Luma([if blurred.get_pixel(x, y)[0] > level { 0 } else { 255 }])
        });
        let blobs = dilate_rect(&binary, self.config.dilate_kernel, self.config.dilate_iterations);

        let mut skew = 0.0f64;
        for contour in find_contours::<i32>(&blobs) {
            let points: Vec<Point> = contour
                .points
                .iter()
                .map(|p| (f64::from(p.x), f64::from(p.y)))
                .collect();
            let Some(rect) = min_area_rect(&points) else {
                continue;
            };
            if rect.area() < min_area {
                continue;
            }
            let angle = normalize_rect_angle(rect.angle);
            if angle.abs() > skew.abs() {
                skew = angle;
            }
        }
        skew
    }
}

impl ImageStage for Deskewer {
    fn name(&self) -> &'static str {
        "deskew"
    }

    fn apply(&self, image: GrayImage) -> Result<GrayImage, PreprocessError> {
        let skew = self.measure_skew(&image);
        tracing::debug!(skew_degrees = skew, "Measured text skew");
        if skew.abs() < NEGLIGIBLE_SKEW_DEGREES {
            return Ok(image);
        }
        let center = intensity_centroid(&image);
        // `rotate` turns clockwise for positive angles, undoing a rise to the right.
        Ok(rotate(
            &image,
            center,
            skew.to_radians() as f32,
            Interpolation::Bicubic,
            Luma([255u8]),
        ))
    }
}

/// Converts a rectangle angle in `[-90, 0)` into the signed deviation from
/// horizontal: angles below -45 refer to the short side and are shifted by
/// 90 degrees, then the sign is flipped.
pub fn normalize_rect_angle(raw: f64) -> f64 {
    let angle = if raw < -45.0 { raw + 90.0 } else { raw };
    -angle
}

/// First-order image moments, truncated to whole pixels.
/// Falls back to the geometric centre for a black image.
pub fn intensity_centroid(image: &GrayImage) -> (f32, f32) {
    let (mut m00, mut m10, mut m01) = (0u64, 0u64, 0u64);
    for (x, y, p) in image.enumerate_pixels() {
        let v = u64::from(p[0]);
        m00 += v;
        m10 += v * u64::from(x);
        m01 += v * u64::from(y);
    }
    if m00 == 0 {
        return (image.width() as f32 / 2.0, image.height() as f32 / 2.0);
    }
    ((m10 / m00) as f32, (m01 / m00) as f32)
}
