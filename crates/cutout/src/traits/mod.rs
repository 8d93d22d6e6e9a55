use image::RgbaImage;
use crate::{error::Result, types::Mask};

/// Trait for mask-to-mask transforms (dilation, feathering, thresholding)
pub trait MaskFilter: Send + Sync {
    /// Produce a new mask; the input is never modified
    fn apply(&self, mask: &Mask) -> Mask;
}

/// Trait for synchronous hole-filling strategies
pub trait HoleFiller: Send + Sync {
    /// Return a copy of `base` with its transparent gaps reconstructed
    fn fill(&self, base: &RgbaImage) -> Result<RgbaImage>;
}
