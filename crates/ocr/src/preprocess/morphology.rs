//! Rectangular grayscale morphology.
//!
//! The window for a `w x h` kernel is anchored at `(w / 2, h / 2)`, so even
//! kernels reach one pixel further back than forward (a 2x2 kernel covers
//! `x-1..=x`). Pixels beyond the border are ignored rather than padded.

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};

/// Longest kernel side an imageproc mask accepts.
const MAX_KERNEL_SIDE: u32 = 511;

/// Minimum filter, `iterations` times.
pub fn erode_rect(image: &GrayImage, kernel: [u32; 2], iterations: u32) -> GrayImage {
    let (row, column) = line_masks(kernel);
    (0..iterations).fold(image.clone(), |img, _| grayscale_erode(&grayscale_erode(&img, &row), &column))
}

/// Maximum filter, `iterations` times.
pub fn dilate_rect(image: &GrayImage, kernel: [u32; 2], iterations: u32) -> GrayImage {
    let (row, column) = line_masks(kernel);
    (0..iterations).fold(image.clone(), |img, _| grayscale_dilate(&grayscale_dilate(&img, &row), &column))
}

/// A rectangle is separable: one row pass, then one column pass.
fn line_masks(kernel: [u32; 2]) -> (Mask, Mask) {
    (line_mask(kernel[0], 1), line_mask(1, kernel[1]))
}

fn line_mask(width: u32, height: u32) -> Mask {
    let (w, h) = (width.clamp(1, MAX_KERNEL_SIDE), height.clamp(1, MAX_KERNEL_SIDE));
    let footprint = GrayImage::from_pixel(w, h, Luma([255]));
    // w / 2 and h / 2 are at most 255.
    Mask::from_image(&footprint, (w / 2) as u8, (h / 2) as u8)
}
