use image::RgbaImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::{
    algorithms::geometry::sample_mask,
    config::EngineConfig,
    types::Mask,
};

/// How the white region of a mask is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Inversion {
    /// Decide from the region label and the white/black pixel ratio
    #[default]
    Auto,
    /// White always means "selected"
    Never,
    /// White always means "excluded"
    Always,
}

/// White/black pixel counts of a mask around the keep threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskStats {
    pub white: u64,
    pub black: u64,
}

pub fn mask_stats(mask: &Mask, threshold: u8) -> MaskStats {
    let histogram = imageproc::stats::histogram(mask);
    let counts = &histogram.channels[0];
    let split = threshold as usize + 1;

    let black = counts[..split].iter().map(|&c| c as u64).sum();
    let white = counts[split..].iter().map(|&c| c as u64).sum();
    MaskStats { white, black }
}

pub fn label_suggests_background(label: &str, keywords: &[String]) -> bool {
    let label = label.to_lowercase();
    keywords.iter().any(|keyword| label.contains(keyword.as_str()))
}

/// Output of a single extraction; both images are fresh buffers at the
/// source's native size.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Full-canvas layer holding only the selected pixels
    pub layer_image: RgbaImage,
    /// Source image with the strictly-selected pixels cleared
    pub base_image: RgbaImage,
    pub inverted: bool,
    pub kept_pixels: u64,
    pub removed_pixels: u64,
}

impl ExtractionOutcome {
    pub fn is_empty(&self) -> bool {
        self.kept_pixels == 0
    }
}

/// Applies a mask to a source image, producing a layer and an updated base.
#[derive(Debug, Clone)]
pub struct RegionExtractor {
    pub keep_threshold: u8,
    pub base_removal_threshold: u8,
    pub inversion_ratio: f32,
    pub background_keywords: Vec<String>,
}

impl Default for RegionExtractor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RegionExtractor {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            keep_threshold: config.keep_threshold,
            base_removal_threshold: config.base_removal_threshold,
            inversion_ratio: config.inversion_ratio,
            background_keywords: config.background_keywords.clone(),
        }
    }

    /// Best-effort guess that the segmenter painted the background white.
    pub fn should_invert(&self, label: &str, mask: &Mask) -> bool {
        if label_suggests_background(label, &self.background_keywords) {
            return true;
        }
        let stats = mask_stats(mask, self.keep_threshold);
        stats.white as f64 > self.inversion_ratio as f64 * stats.black as f64
    }

    pub fn resolve_inversion(&self, inversion: Inversion, label: &str, mask: &Mask) -> bool {
        match inversion {
            Inversion::Auto => self.should_invert(label, mask),
            Inversion::Never => false,
            Inversion::Always => true,
        }
    }

    /// Split `source` by `mask`.
    ///
    /// The layer pass keeps pixels above the keep threshold (or at/below it
    /// when inverted) and zeroes the alpha of the rest, leaving RGB as-is.
    /// The base pass clears every pixel whose raw mask intensity exceeds the
    /// stricter removal threshold, regardless of inversion.
    pub fn extract(
        &self,
        source: &RgbaImage,
        mask: &Mask,
        label: &str,
        inversion: Inversion,
    ) -> ExtractionOutcome {
        let inverted = self.resolve_inversion(inversion, label, mask);
        let (width, height) = source.dimensions();

        let mut layer_image = source.clone();
        let mut base_image = source.clone();
        let mut kept_pixels = 0u64;
        let mut removed_pixels = 0u64;

        for y in 0..height {
            for x in 0..width {
                let intensity = sample_mask(mask, x, y, width, height);

                let keep = if inverted {
                    intensity <= self.keep_threshold
                } else {
                    intensity > self.keep_threshold
                };
                if keep {
                    kept_pixels += 1;
                } else {
                    layer_image.get_pixel_mut(x, y)[3] = 0;
                }

                if intensity > self.base_removal_threshold {
                    base_image.get_pixel_mut(x, y)[3] = 0;
                    removed_pixels += 1;
                }
            }
        }

        tracing::debug!(
            width,
            height,
            inverted,
            kept_pixels,
            removed_pixels,
            "Applied mask to source image"
        );

        ExtractionOutcome {
            layer_image,
            base_image,
            inverted,
            kept_pixels,
            removed_pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba};

    fn opaque(width: u32, height: u32, colour: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([colour[0], colour[1], colour[2], 255]))
    }

    #[test]
    fn test_mask_stats_split_at_threshold() {
        let mut mask = GrayImage::new(4, 1);
        mask.put_pixel(0, 0, Luma([128]));
        mask.put_pixel(1, 0, Luma([129]));
        mask.put_pixel(2, 0, Luma([255]));
        assert_eq!(mask_stats(&mask, 128), MaskStats { white: 2, black: 2 });
    }

    #[test]
    fn test_strict_removal_pixels_are_always_removed_from_base() {
        let source = opaque(10, 10, [10, 20, 30]);
        let mask = GrayImage::from_fn(10, 10, |x, _| Luma([(x * 28) as u8]));
        let extractor = RegionExtractor::default();

        for inversion in [Inversion::Never, Inversion::Always, Inversion::Auto] {
            let outcome = extractor.extract(&source, &mask, "object", inversion);
            for (x, y, pixel) in outcome.base_image.enumerate_pixels() {
                if mask.get_pixel(x, y)[0] > 200 {
                    assert_eq!(pixel[3], 0, "pixel ({x},{y}) should be removed");
                } else {
                    assert_eq!(pixel[3], 255);
                }
            }
        }
    }

    #[test]
    fn test_feathered_pixels_are_copied_but_not_removed() {
        let source = opaque(3, 1, [1, 2, 3]);
        let mask = GrayImage::from_raw(3, 1, vec![100, 150, 230]).unwrap();
        let outcome = RegionExtractor::default().extract(&source, &mask, "cat", Inversion::Never);

        let layer_alpha: Vec<u8> = outcome.layer_image.pixels().map(|p| p[3]).collect();
        let base_alpha: Vec<u8> = outcome.base_image.pixels().map(|p| p[3]).collect();
        assert_eq!(layer_alpha, vec![0, 255, 255]);
        assert_eq!(base_alpha, vec![255, 255, 0]);
        // RGB is left untouched even where alpha was cleared
        assert_eq!(outcome.layer_image.get_pixel(0, 0), &Rgba([1, 2, 3, 0]));
    }

    #[test]
    fn test_background_label_with_mostly_white_mask_is_inverted() {
        // 8x8 mask: 58 white cells, 6 black cells
        let black_cells = [(0, 0), (3, 2), (5, 5), (7, 7), (1, 6), (6, 1)];
        let mask = GrayImage::from_fn(8, 8, |x, y| {
            Luma([if black_cells.contains(&(x, y)) { 0 } else { 255 }])
        });
        let source = opaque(16, 16, [200, 100, 50]);

        let outcome = RegionExtractor::default().extract(&source, &mask, "background_wall", Inversion::Auto);
        assert!(outcome.inverted);

        for (x, y, pixel) in outcome.layer_image.enumerate_pixels() {
            let in_black_cell = black_cells.contains(&(x / 2, y / 2));
            assert_eq!(pixel[3] > 0, in_black_cell, "unexpected alpha at ({x},{y})");
        }
        assert_eq!(outcome.kept_pixels, 6 * 4);
    }

    #[test]
    fn test_mostly_white_mask_inverts_without_background_label() {
        let mask = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 9 { 255 } else { 0 }]));
        let extractor = RegionExtractor::default();
        assert!(extractor.should_invert("person", &mask));

        let balanced = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 255 } else { 0 }]));
        assert!(!extractor.should_invert("person", &balanced));
        assert!(extractor.should_invert("BG-sky", &balanced));
    }

    #[test]
    fn test_manual_override_beats_heuristic() {
        let mask = GrayImage::from_pixel(4, 4, Luma([255]));
        let source = opaque(4, 4, [0, 0, 0]);
        let outcome = RegionExtractor::default().extract(&source, &mask, "background", Inversion::Never);
        assert!(!outcome.inverted);
        assert_eq!(outcome.kept_pixels, 16);
    }

    #[test]
    fn test_low_resolution_mask_is_sampled_nearest_neighbour() {
        let mask = GrayImage::from_raw(2, 1, vec![255, 0]).unwrap();
        let source = opaque(4, 2, [9, 9, 9]);
        let outcome = RegionExtractor::default().extract(&source, &mask, "thing", Inversion::Never);

        for (x, _, pixel) in outcome.layer_image.enumerate_pixels() {
            assert_eq!(pixel[3] == 255, x < 2);
        }
    }
}
