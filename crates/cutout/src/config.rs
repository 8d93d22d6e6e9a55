//! Tunable thresholds for the pixel engine.
//!
//! Every magic number the engine relies on lives here as a named default and
//! as a field of [`EngineConfig`], so a host application can override them
//! from a TOML file without touching the algorithms.

use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Mask intensity above which a pixel is copied into the extracted layer.
pub const KEEP_THRESHOLD: u8 = 128;
/// Mask intensity above which a pixel is cleared from the base image.
pub const BASE_REMOVAL_THRESHOLD: u8 = 200;
/// White/black pixel ratio beyond which a mask is treated as inverted.
pub const INVERSION_RATIO: f32 = 3.0;
/// Alpha below which a base pixel counts as a hole.
pub const HOLE_ALPHA_THRESHOLD: u8 = 200;
pub const RING_RADIUS_MIN: u32 = 3;
pub const RING_RADIUS_MAX: u32 = 10;
pub const SAMPLES_PER_RING: u32 = 8;
pub const MAX_SAMPLES_PER_PIXEL: usize = 50;
/// Mask intensity above which a pixel is "white" for outline rendering.
pub const EDGE_THRESHOLD: u8 = 200;
pub const EDGE_HIGHLIGHT: [u8; 4] = [0, 170, 255, 255];
/// Person bounding-box area (fraction of the image) that selects face mode.
pub const FACE_AREA_RATIO: f32 = 0.2;
pub const FILL_EXPAND_PIXELS: u32 = 10;
pub const FILL_FEATHER_RADIUS: u32 = 8;
pub const INPAINT_SIZES: [u32; 3] = [256, 512, 1024];
pub const HISTORY_DEPTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub keep_threshold: u8,
    pub base_removal_threshold: u8,
    pub inversion_ratio: f32,
    /// Lower-case substrings that mark a region label as background.
    pub background_keywords: Vec<String>,
    pub hole_alpha_threshold: u8,
    pub ring_radius_min: u32,
    pub ring_radius_max: u32,
    pub samples_per_ring: u32,
    pub max_samples_per_pixel: usize,
    pub edge_threshold: u8,
    pub edge_highlight: [u8; 4],
    pub face_area_ratio: f32,
    pub fill_expand_pixels: u32,
    pub fill_feather_radius: u32,
    pub inpaint_sizes: Vec<u32>,
    pub history_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keep_threshold: KEEP_THRESHOLD,
            base_removal_threshold: BASE_REMOVAL_THRESHOLD,
            inversion_ratio: INVERSION_RATIO,
            background_keywords: vec!["background".to_string(), "bg".to_string()],
            hole_alpha_threshold: HOLE_ALPHA_THRESHOLD,
            ring_radius_min: RING_RADIUS_MIN,
            ring_radius_max: RING_RADIUS_MAX,
            samples_per_ring: SAMPLES_PER_RING,
            max_samples_per_pixel: MAX_SAMPLES_PER_PIXEL,
            edge_threshold: EDGE_THRESHOLD,
            edge_highlight: EDGE_HIGHLIGHT,
            face_area_ratio: FACE_AREA_RATIO,
            fill_expand_pixels: FILL_EXPAND_PIXELS,
            fill_feather_radius: FILL_FEATHER_RADIUS,
            inpaint_sizes: INPAINT_SIZES.to_vec(),
            history_depth: HISTORY_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from TOML text; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml("keep_threshold = 100\ninpaint_sizes = [512]\n")
            .expect("Should parse partial config");

        assert_eq!(config.keep_threshold, 100);
        assert_eq!(config.inpaint_sizes, vec![512]);
        assert_eq!(config.base_removal_threshold, BASE_REMOVAL_THRESHOLD);
        assert_eq!(config.background_keywords, vec!["background", "bg"]);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml("keep_threshold = \"high\"").unwrap_err();
        assert!(matches!(err, crate::error::CutoutError::Config(_)));
    }
}
