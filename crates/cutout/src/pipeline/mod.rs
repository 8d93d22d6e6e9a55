pub mod builder;

use crate::{traits::MaskFilter, types::Mask};

/// An ordered chain of mask filters
pub struct MaskPipeline {
    filters: Vec<Box<dyn MaskFilter>>,
}

impl MaskPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::MaskPipelineBuilder {
        builder::MaskPipelineBuilder::new()
    }

    pub fn new(filters: Vec<Box<dyn MaskFilter>>) -> Self {
        Self { filters }
    }

    /// Grow the mask by `expand_pixels`, then feather it by `feather_radius`.
    ///
    /// Used for AI fill masks so the model sees blending context beyond
    /// the exact hole boundary.
    pub fn fill_mask(expand_pixels: u32, feather_radius: u32) -> Self {
        Self::builder()
            .with_dilation(expand_pixels)
            .with_feather(feather_radius)
            .build()
    }

    /// Run every filter in order; an empty pipeline returns a copy
    pub fn process(&self, mask: &Mask) -> Mask {
        let mut current = mask.clone();
        for filter in &self.filters {
            current = filter.apply(&current);
        }
        current
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
