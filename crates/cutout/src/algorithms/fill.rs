use image::{
    GrayImage, Luma, Rgb, RgbImage, RgbaImage,
    imageops::{self, FilterType},
};
use crate::{
    config::{EngineConfig, INPAINT_SIZES},
    error::{CutoutError, Result},
    pipeline::MaskPipeline,
    traits::HoleFiller,
    types::Mask,
};

/// 255 wherever the image alpha is below `threshold`
pub fn transparency_map(image: &RgbaImage, threshold: u8) -> Mask {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y)[3] < threshold { 255 } else { 0 }])
    })
}

/// Coarse, deterministic hole fill with one global average colour.
///
/// Every hole pixel (alpha below the threshold) collects opaque samples on
/// rings around itself, stopping once it has enough; all samples from all
/// hole pixels are averaged into a single colour that is written into every
/// hole at full opacity. With no opaque sample anywhere the fill is white.
#[derive(Debug, Clone)]
pub struct LocalAverageFill {
    pub hole_threshold: u8,
    pub ring_radius_min: u32,
    pub ring_radius_max: u32,
    pub samples_per_ring: u32,
    pub max_samples_per_pixel: usize,
}

impl Default for LocalAverageFill {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl LocalAverageFill {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            hole_threshold: config.hole_alpha_threshold,
            ring_radius_min: config.ring_radius_min,
            ring_radius_max: config.ring_radius_max,
            samples_per_ring: config.samples_per_ring,
            max_samples_per_pixel: config.max_samples_per_pixel,
        }
    }

    fn ring_offsets(&self) -> Vec<Vec<(i64, i64)>> {
        let directions = self.samples_per_ring.max(1);
        (self.ring_radius_min..=self.ring_radius_max)
            .map(|radius| {
                (0..directions)
                    .map(|k| {
                        let angle = k as f64 * std::f64::consts::TAU / directions as f64;
                        (
                            (radius as f64 * angle.cos()).round() as i64,
                            (radius as f64 * angle.sin()).round() as i64,
                        )
                    })
                    .collect()
            })
            .collect()
    }

    /// The single colour written into every hole
    pub fn average_colour(&self, image: &RgbaImage) -> [u8; 3] {
        let (width, height) = image.dimensions();
        let rings = self.ring_offsets();
        let mut sums = [0u64; 3];
        let mut total = 0u64;

        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel[3] >= self.hole_threshold {
                continue;
            }
            let mut collected = 0usize;
            'rings: for ring in &rings {
                for &(dx, dy) in ring {
                    let sx = x as i64 + dx;
                    let sy = y as i64 + dy;
                    if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                        continue;
                    }
                    let sample = image.get_pixel(sx as u32, sy as u32);
                    if sample[3] < self.hole_threshold {
                        continue;
                    }
                    for c in 0..3 {
                        sums[c] += sample[c] as u64;
                    }
                    total += 1;
                    collected += 1;
                    if collected >= self.max_samples_per_pixel {
                        break 'rings;
                    }
                }
            }
        }

        if total == 0 {
            return [255, 255, 255];
        }
        let average = |c: usize| ((sums[c] as f64 / total as f64).round()) as u8;
        [average(0), average(1), average(2)]
    }
}

impl HoleFiller for LocalAverageFill {
    fn fill(&self, base: &RgbaImage) -> Result<RgbaImage> {
        let colour = self.average_colour(base);
        let mut filled = base.clone();
        let mut holes = 0u64;

        for pixel in filled.pixels_mut() {
            if pixel[3] < self.hole_threshold {
                *pixel = image::Rgba([colour[0], colour[1], colour[2], 255]);
                holes += 1;
            }
        }

        tracing::debug!(holes, ?colour, "Filled holes with average colour");
        Ok(filled)
    }
}

/// Where a native image sits inside a square inpainting canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxPlacement {
    pub size: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

/// Supported square size closest to the image's longer side (ties go up)
pub fn choose_inpaint_size(width: u32, height: u32, sizes: &[u32]) -> u32 {
    let sizes = if sizes.is_empty() { &INPAINT_SIZES[..] } else { sizes };
    let longest = width.max(height) as i64;
    let mut best = sizes[0];
    for &size in sizes {
        let distance = (size as i64 - longest).abs();
        let best_distance = (best as i64 - longest).abs();
        if distance < best_distance || (distance == best_distance && size > best) {
            best = size;
        }
    }
    best
}

pub fn letterbox_placement(width: u32, height: u32, size: u32) -> LetterboxPlacement {
    let longest = width.max(height).max(1) as f64;
    let scale = size as f64 / longest;
    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, size);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, size);
    LetterboxPlacement {
        size,
        offset_x: (size - scaled_width) / 2,
        offset_y: (size - scaled_height) / 2,
        scaled_width,
        scaled_height,
    }
}

/// Flatten over white, scale to fit, and centre on a white square canvas
pub fn letterbox(image: &RgbaImage, placement: &LetterboxPlacement) -> RgbImage {
    let flattened = RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let alpha = pixel[3] as u32;
        let channel = |c: usize| ((pixel[c] as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([channel(0), channel(1), channel(2)])
    });
    let scaled = imageops::resize(
        &flattened,
        placement.scaled_width,
        placement.scaled_height,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(placement.size, placement.size, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, &scaled, placement.offset_x as i64, placement.offset_y as i64);
    canvas
}

/// The fill mask on the same square canvas, as an opaque greyscale RGB image
pub fn letterbox_mask(mask: &Mask, placement: &LetterboxPlacement) -> RgbImage {
    let scaled = imageops::resize(
        mask,
        placement.scaled_width,
        placement.scaled_height,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(placement.size, placement.size, Rgb([255, 255, 255]));
    for (x, y, pixel) in scaled.enumerate_pixels() {
        let v = pixel[0];
        canvas.put_pixel(x + placement.offset_x, y + placement.offset_y, Rgb([v, v, v]));
    }
    canvas
}

/// Crop the letterboxed result and scale it back to native size
pub fn unletterbox(
    result: &RgbaImage,
    placement: &LetterboxPlacement,
    width: u32,
    height: u32,
) -> RgbaImage {
    let result = if result.dimensions() != (placement.size, placement.size) {
        imageops::resize(result, placement.size, placement.size, FilterType::Triangle)
    } else {
        result.clone()
    };
    let cropped = imageops::crop_imm(
        &result,
        placement.offset_x,
        placement.offset_y,
        placement.scaled_width,
        placement.scaled_height,
    )
    .to_image();
    imageops::resize(&cropped, width, height, FilterType::Triangle)
}

/// Merge an inpainting result into the base image.
///
/// Hole pixels take the result at full opacity; opaque pixels inside the
/// feathered margin are blended towards the result by mask weight.
pub fn composite_fill_result(
    base: &RgbaImage,
    result: &RgbaImage,
    fill_mask: &Mask,
    hole_threshold: u8,
) -> Result<RgbaImage> {
    let (width, height) = base.dimensions();
    for (w, h) in [result.dimensions(), fill_mask.dimensions()] {
        if (w, h) != (width, height) {
            return Err(CutoutError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: w,
                height: h,
            });
        }
    }

    let mut output = base.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let filled = result.get_pixel(x, y);
        if pixel[3] < hole_threshold {
            *pixel = image::Rgba([filled[0], filled[1], filled[2], 255]);
            continue;
        }
        let weight = fill_mask.get_pixel(x, y)[0] as u32;
        if weight == 0 {
            continue;
        }
        for c in 0..3 {
            pixel[c] = ((pixel[c] as u32 * (255 - weight) + filled[c] as u32 * weight) / 255) as u8;
        }
    }
    Ok(output)
}

/// Everything an inpainting collaborator needs, plus what is needed to map
/// its answer back.
#[derive(Debug, Clone)]
pub struct InpaintPreparation {
    /// Opaque square image, one of the supported sizes
    pub image: RgbImage,
    /// Opaque square mask on the same canvas
    pub mask: RgbImage,
    pub placement: LetterboxPlacement,
    /// Dilated + feathered fill mask at native resolution
    pub fill_mask: Mask,
    pub native_width: u32,
    pub native_height: u32,
}

impl InpaintPreparation {
    pub fn new(base: &RgbaImage, config: &EngineConfig) -> Self {
        let (native_width, native_height) = base.dimensions();
        let holes = transparency_map(base, config.hole_alpha_threshold);
        let fill_mask = MaskPipeline::fill_mask(config.fill_expand_pixels, config.fill_feather_radius)
            .process(&holes);

        let size = choose_inpaint_size(native_width, native_height, &config.inpaint_sizes);
        let placement = letterbox_placement(native_width, native_height, size);

        Self {
            image: letterbox(base, &placement),
            mask: letterbox_mask(&fill_mask, &placement),
            placement,
            fill_mask,
            native_width,
            native_height,
        }
    }

    pub fn has_holes(&self) -> bool {
        self.fill_mask.pixels().any(|p| p[0] > 0)
    }

    /// Map a decoded inpainting result back onto `base`
    pub fn apply(&self, base: &RgbaImage, result: &RgbaImage, hole_threshold: u8) -> Result<RgbaImage> {
        let native = unletterbox(result, &self.placement, self.native_width, self.native_height);
        composite_fill_result(base, &native, &self.fill_mask, hole_threshold)
    }
}
