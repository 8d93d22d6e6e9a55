//! Pixel-space helpers shared by extraction, brushes and fills.
//!
//! None of these functions fail: degenerate masks (empty, zero-sized or
//! fully opaque) produce trivial outputs such as an identity copy or the
//! unit bounding box.

use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use crate::{
    traits::MaskFilter,
    types::{Mask, NormalizedBox, PixelRect},
};

/// Inclusive pixel bounds of every mask cell with intensity above zero
pub fn mask_pixel_bounds(mask: &Mask) -> Option<PixelRect> {
    let mut bounds: Option<PixelRect> = None;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => PixelRect { min_x: x, min_y: y, max_x: x, max_y: y },
            Some(rect) => PixelRect {
                min_x: rect.min_x.min(x),
                min_y: rect.min_y.min(y),
                max_x: rect.max_x.max(x),
                max_y: rect.max_y.max(y),
            },
        });
    }

    bounds
}

/// Normalized bounding box of the selected region.
///
/// An empty mask yields [`NormalizedBox::UNIT`]; callers must read that as
/// "bounds unknown", not as a detection covering the whole image.
pub fn bounding_box(mask: &Mask) -> NormalizedBox {
    match mask_pixel_bounds(mask) {
        Some(rect) => rect.normalized(mask.width(), mask.height()),
        None => NormalizedBox::UNIT,
    }
}

/// Nearest-neighbour mapping of an image pixel onto a mask of another resolution:
/// `(floor(x / image_w * mask_w), floor(y / image_h * mask_h))`.
pub fn remap_to_mask(
    x: u32,
    y: u32,
    (image_width, image_height): (u32, u32),
    (mask_width, mask_height): (u32, u32),
) -> (u32, u32) {
    let mx = (x as u64 * mask_width as u64 / image_width.max(1) as u64) as u32;
    let my = (y as u64 * mask_height as u64 / image_height.max(1) as u64) as u32;
    (
        mx.min(mask_width.saturating_sub(1)),
        my.min(mask_height.saturating_sub(1)),
    )
}

/// Mask intensity governing image pixel `(x, y)`; zero-sized masks read as 0
pub fn sample_mask(mask: &Mask, x: u32, y: u32, image_width: u32, image_height: u32) -> u8 {
    if mask.width() == 0 || mask.height() == 0 {
        return 0;
    }
    let (mx, my) = remap_to_mask(x, y, (image_width, image_height), mask.dimensions());
    mask.get_pixel(mx, my)[0]
}

/// Resample a whole mask to a new resolution with the same nearest-neighbour rule
pub fn resize_mask_nearest(mask: &Mask, width: u32, height: u32) -> Mask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    GrayImage::from_fn(width, height, |x, y| Luma([sample_mask(mask, x, y, width, height)]))
}

/// Grow the selection: each pass takes the 3x3 neighbourhood maximum,
/// clamping at the image border.
pub fn dilate(mask: &Mask, iterations: u32) -> Mask {
    let (width, height) = mask.dimensions();
    let mut current = mask.clone();
    if width == 0 || height == 0 {
        return current;
    }

    for _ in 0..iterations {
        let source = current.clone();
        for y in 0..height {
            let y0 = y.saturating_sub(1);
            let y1 = (y + 1).min(height - 1);
            for x in 0..width {
                let x0 = x.saturating_sub(1);
                let x1 = (x + 1).min(width - 1);
                let mut max = 0u8;
                for ny in y0..=y1 {
                    for nx in x0..=x1 {
                        max = max.max(source.get_pixel(nx, ny)[0]);
                    }
                }
                current.put_pixel(x, y, Luma([max]));
            }
        }
    }

    current
}

/// Normalized 1-D Gaussian kernel of half-width `radius`, sigma = radius / 3
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    if radius == 0 {
        return vec![1.0];
    }
    let sigma = radius as f32 / 3.0;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let r = radius as i32;

    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / two_sigma_sq).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Separable Gaussian feathering: horizontal pass, then vertical pass.
///
/// Filtering runs over f32 intensities so the only rounding happens once,
/// when the result is packed back into a mask.
pub fn gaussian_blur(mask: &Mask, radius: u32) -> Mask {
    let (width, height) = mask.dimensions();
    if radius == 0 || width == 0 || height == 0 {
        return mask.clone();
    }

    let intensities: ImageBuffer<Luma<f32>, Vec<f32>> =
        imageproc::map::map_colors(mask, |pixel: Luma<u8>| Luma([pixel[0] as f32]));
    let blurred = imageproc::filter::separable_filter_equal(&intensities, &gaussian_kernel(radius));
    imageproc::map::map_colors(&blurred, |pixel: Luma<f32>| {
        Luma([pixel[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// Outline of the white region: a pixel above `threshold` with at least one
/// 4-connected in-bounds neighbour strictly below it. Edge pixels are 255.
pub fn detect_edges(mask: &Mask, threshold: u8) -> Mask {
    let (width, height) = mask.dimensions();
    let is_white = |x: u32, y: u32| mask.get_pixel(x, y)[0] > threshold;
    let is_below = |x: u32, y: u32| mask.get_pixel(x, y)[0] < threshold;

    GrayImage::from_fn(width, height, |x, y| {
        if !is_white(x, y) {
            return Luma([0]);
        }
        let neighbours = [
            (x.checked_sub(1), Some(y)),
            ((x + 1 < width).then_some(x + 1), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), (y + 1 < height).then_some(y + 1)),
        ];
        let on_edge = neighbours.iter().any(|n| match n {
            (Some(nx), Some(ny)) => is_below(*nx, *ny),
            _ => false,
        });
        Luma([if on_edge { 255 } else { 0 }])
    })
}

/// Hover-preview image: highlight colour on the outline, transparent elsewhere
pub fn edge_overlay(mask: &Mask, threshold: u8, highlight: [u8; 4]) -> RgbaImage {
    let edges = detect_edges(mask, threshold);
    imageproc::map::map_colors(&edges, |pixel: Luma<u8>| {
        if pixel[0] > 0 {
            Rgba(highlight)
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Binarize: 255 above `threshold`, 0 otherwise
pub fn threshold_mask(mask: &Mask, threshold: u8) -> Mask {
    imageproc::contrast::threshold(mask, threshold)
}

pub fn invert_mask(mask: &Mask) -> Mask {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([255 - mask.get_pixel(x, y)[0]])
    })
}

/// Dilation as a pipeline step
#[derive(Debug, Clone, Default)]
pub struct DilateFilter {
    pub iterations: u32,
}

impl MaskFilter for DilateFilter {
    fn apply(&self, mask: &Mask) -> Mask {
        dilate(mask, self.iterations)
    }
}

/// Gaussian feathering as a pipeline step
#[derive(Debug, Clone, Default)]
pub struct FeatherFilter {
    pub radius: u32,
}

impl MaskFilter for FeatherFilter {
    fn apply(&self, mask: &Mask) -> Mask {
        gaussian_blur(mask, self.radius)
    }
}

/// Binary threshold as a pipeline step
#[derive(Debug, Clone)]
pub struct ThresholdFilter {
    pub threshold: u8,
}

impl Default for ThresholdFilter {
    fn default() -> Self {
        Self { threshold: 128 }
    }
}

impl MaskFilter for ThresholdFilter {
    fn apply(&self, mask: &Mask) -> Mask {
        threshold_mask(mask, self.threshold)
    }
}
