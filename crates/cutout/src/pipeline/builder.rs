use crate::{
    pipeline::MaskPipeline,
    traits::MaskFilter,
    algorithms::{DilateFilter, FeatherFilter, ThresholdFilter},
};

/// Builder for mask pipelines with a fluent API
pub struct MaskPipelineBuilder {
    filters: Vec<Box<dyn MaskFilter>>,
}

impl MaskPipelineBuilder {
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Append a filter to the pipeline
    pub fn add_filter<F>(mut self, filter: F) -> Self
    where
        F: MaskFilter + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    /// 3x3 max dilation, `iterations` times (0 is skipped)
    pub fn with_dilation(self, iterations: u32) -> Self {
        if iterations == 0 {
            return self;
        }
        self.add_filter(DilateFilter { iterations })
    }

    /// Separable Gaussian feathering (0 is skipped)
    pub fn with_feather(self, radius: u32) -> Self {
        if radius == 0 {
            return self;
        }
        self.add_filter(FeatherFilter { radius })
    }

    pub fn with_threshold(self, threshold: u8) -> Self {
        self.add_filter(ThresholdFilter { threshold })
    }

    pub fn build(self) -> MaskPipeline {
        MaskPipeline::new(self.filters)
    }
}

impl Default for MaskPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
