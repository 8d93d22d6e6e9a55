use std::sync::Arc;

use image::RgbaImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr, VariantNames};

use crate::{
    algorithms::{
        BrushMaskBuilder, InpaintPreparation, Inversion, LocalAverageFill, RegionExtractor,
        edge_overlay, lasso_mask, resize_mask_nearest,
    },
    compositor::{Compositor, Layer, LayerId},
    config::EngineConfig,
    error::{CutoutError, Result},
    history::{History, Snapshot},
    io::decode_image,
    regions::{DetectedRegion, MaskCache},
    traits::HoleFiller,
    types::{Mask, ViewTransform},
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentCommand {
    /// Cut a detected region out of the base image into a new layer
    #[serde(rename = "extract_region")]
    ExtractRegion {
        region: DetectedRegion,
        #[serde(default)]
        inversion: Inversion,
    },

    /// Cut a freehand polygon (display coordinates) into a new layer
    #[serde(rename = "extract_lasso")]
    ExtractLasso {
        #[schemars(length(min = 3))]
        points: Vec<[f32; 2]>,
        view: ViewTransform,
    },

    /// Fill transparent base pixels with the surrounding average colour
    #[serde(rename = "fill_local")]
    FillLocal,

    #[serde(rename = "delete_layer")]
    DeleteLayer { layer_id: String },

    #[serde(rename = "merge_layers")]
    MergeLayers {
        #[schemars(length(min = 2))]
        layer_ids: Vec<String>,
    },

    #[serde(rename = "reorder_layer")]
    ReorderLayer { from: usize, to: usize },

    #[serde(rename = "set_visibility")]
    SetVisibility { layer_id: String, visible: bool },

    #[serde(rename = "set_opacity")]
    SetOpacity {
        layer_id: String,
        #[schemars(range(min = 0.0, max = 1.0))]
        opacity: f32,
    },

    #[serde(rename = "rename_layer")]
    RenameLayer {
        layer_id: String,
        #[schemars(length(min = 1, max = 100))]
        name: String,
    },

    #[serde(rename = "set_locked")]
    SetLocked { layer_id: String, locked: bool },

    #[serde(rename = "undo")]
    Undo,

    #[serde(rename = "redo")]
    Redo,
}

impl DocumentCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DocumentCommand)
    }

    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ExtractRegion { .. } => "Move the pixels of a detected region into a new layer and clear them from the base",
            Self::ExtractLasso { .. } => "Move the pixels inside a freehand polygon into a new layer",
            Self::FillLocal => "Fill transparent base pixels with the average colour around them",
            Self::DeleteLayer { .. } => "Delete an unlocked, non-base layer",
            Self::MergeLayers { .. } => "Flatten two or more layers into one",
            Self::ReorderLayer { .. } => "Move a layer to another stack position above the base",
            Self::SetVisibility { .. } => "Show or hide a layer",
            Self::SetOpacity { .. } => "Set a layer's opacity (0.0-1.0)",
            Self::RenameLayer { .. } => "Rename a layer",
            Self::SetLocked { .. } => "Lock or unlock a layer",
            Self::Undo => "Restore the state before the last destructive operation",
            Self::Redo => "Re-apply the last undone operation",
        }
    }

    /// Whether the command records a history snapshot
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::ExtractRegion { .. }
                | Self::ExtractLasso { .. }
                | Self::FillLocal
                | Self::DeleteLayer { .. }
                | Self::MergeLayers { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    LayerCreated { layer_id: String },
    Changed { revision: u64 },
}

/// Base image, layer stack and undo history of one editing session.
///
/// Destructive operations validate their input and compute every new buffer
/// before touching state, then record a snapshot and commit in one step.
#[derive(Debug)]
pub struct Document {
    compositor: Compositor,
    history: History,
    extractor: RegionExtractor,
    filler: LocalAverageFill,
    masks: MaskCache,
    config: EngineConfig,
    content_revision: u64,
}

impl Document {
    pub fn new(base: RgbaImage) -> Self {
        Self::with_config(base, EngineConfig::default())
    }

    pub fn with_config(base: RgbaImage, config: EngineConfig) -> Self {
        Self {
            compositor: Compositor::new(base),
            history: History::new(config.history_depth),
            extractor: RegionExtractor::from_config(&config),
            filler: LocalAverageFill::from_config(&config),
            masks: MaskCache::new(),
            config,
            content_revision: 0,
        }
    }

    /// Decode an uploaded image (any supported format) to RGBA at native size
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(decode_image(bytes)?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn layers(&self) -> &[Layer] {
        self.compositor.layers()
    }

    pub fn base_image(&self) -> &RgbaImage {
        self.compositor.base_image()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.base_image().dimensions()
    }

    pub fn revision(&self) -> u64 {
        self.compositor.revision()
    }

    /// Moves only on edits that record history (and on undo/redo), never on
    /// presentation changes such as visibility, opacity, names or locks
    pub fn content_revision(&self) -> u64 {
        self.content_revision
    }

    pub fn render(&mut self) -> Arc<RgbaImage> {
        self.compositor.render()
    }

    /// Forget decoded region masks, e.g. after a new segmentation
    pub fn invalidate_region_masks(&mut self) {
        self.masks.invalidate();
    }

    fn snapshot(&self, description: &str) -> Snapshot {
        Snapshot::new(description, self.compositor.layers())
    }

    fn record(&mut self, snapshot: Snapshot) {
        self.history.push(snapshot);
        self.content_revision += 1;
    }

    /// Split the current base by `mask`: the selection becomes a new top
    /// layer named `label` and the base loses the strictly-selected pixels.
    pub fn extract_with_mask(
        &mut self,
        mask: &Mask,
        label: &str,
        inversion: Inversion,
    ) -> Result<LayerId> {
        let outcome = self
            .extractor
            .extract(self.compositor.base_image(), mask, label, inversion);
        let snapshot = self.snapshot(&format!("Extract {label}"));

        self.compositor.replace_base_image(outcome.base_image)?;
        let id = self.compositor.push_layer(label, outcome.layer_image);
        self.record(snapshot);

        tracing::info!(
            layer = %id,
            label,
            inverted = outcome.inverted,
            removed = outcome.removed_pixels,
            "Extracted layer"
        );
        Ok(id)
    }

    /// Decodes the region mask before anything else, so a corrupt mask
    /// leaves the document untouched.
    pub fn extract_region(&mut self, region: &DetectedRegion, inversion: Inversion) -> Result<LayerId> {
        let mask = self.masks.get_or_decode(region)?;
        self.extract_with_mask(&mask, &region.label, inversion)
    }

    /// Extract several regions in order as a single undo step. Every mask is
    /// decoded and every split computed on a working copy of the base first,
    /// so a failure on any region leaves the document untouched.
    pub fn extract_regions(&mut self, regions: &[DetectedRegion], inversion: Inversion) -> Result<Vec<LayerId>> {
        if regions.is_empty() {
            return Ok(Vec::new());
        }
        let masks = regions
            .iter()
            .map(|region| self.masks.get_or_decode(region))
            .collect::<Result<Vec<_>>>()?;

        let mut base = self.compositor.base_image().clone();
        let mut extracted = Vec::with_capacity(regions.len());
        for (region, mask) in regions.iter().zip(&masks) {
            let outcome = self.extractor.extract(&base, mask, &region.label, inversion);
            base = outcome.base_image;
            extracted.push((region.label.as_str(), outcome.layer_image));
        }

        let snapshot = self.snapshot(&format!("Extract {} regions", regions.len()));
        self.compositor.replace_base_image(base)?;
        let ids: Vec<LayerId> = extracted
            .into_iter()
            .map(|(label, image)| self.compositor.push_layer(label, image))
            .collect();
        self.record(snapshot);

        tracing::info!(layers = ids.len(), "Extracted regions");
        Ok(ids)
    }

    pub fn extract_lasso(&mut self, display_points: &[[f32; 2]], view: &ViewTransform) -> Result<LayerId> {
        let mask = lasso_mask(display_points, view)?;
        self.extract_with_mask(&mask, "Lasso selection", Inversion::Never)
    }

    pub fn extract_brush(&mut self, builder: &mut BrushMaskBuilder) -> Result<LayerId> {
        let mask = builder.commit()?;
        let id = self.extract_with_mask(&mask, "Brush selection", Inversion::Never)?;
        builder.clear();
        Ok(id)
    }

    /// Outline preview of a region at base resolution
    pub fn region_outline(&mut self, region: &DetectedRegion) -> Result<RgbaImage> {
        let mask = self.masks.get_or_decode(region)?;
        let (width, height) = self.dimensions();
        let mask = resize_mask_nearest(&mask, width, height);
        Ok(edge_overlay(&mask, self.config.edge_threshold, self.config.edge_highlight))
    }

    /// Replace holes in the base with the locally averaged colour
    pub fn fill_local(&mut self) -> Result<()> {
        let filled = self.filler.fill(self.compositor.base_image())?;
        self.apply_fill(filled, "Fill (local)")
    }

    /// Letterboxed image + mask for an inpainting collaborator
    pub fn inpaint_preparation(&self) -> InpaintPreparation {
        InpaintPreparation::new(self.compositor.base_image(), &self.config)
    }

    /// Map an inpainting result back onto the base image and commit it
    pub fn apply_inpaint_result(&mut self, preparation: &InpaintPreparation, result: &RgbaImage) -> Result<()> {
        let filled = preparation.apply(
            self.compositor.base_image(),
            result,
            self.config.hole_alpha_threshold,
        )?;
        self.apply_fill(filled, "Fill (AI)")
    }

    /// Replace the base pixels with a filled image of the same size
    pub fn apply_fill(&mut self, filled: RgbaImage, description: &str) -> Result<()> {
        let snapshot = self.snapshot(description);
        self.compositor.replace_base_image(filled)?;
        self.record(snapshot);
        tracing::info!(description, "Applied fill to base image");
        Ok(())
    }

    pub fn delete_layer(&mut self, id: LayerId) -> Result<()> {
        let snapshot = self.snapshot("Delete layer");
        self.compositor.delete(id)?;
        self.record(snapshot);
        Ok(())
    }

    pub fn merge_layers(&mut self, ids: &[LayerId]) -> Result<LayerId> {
        let snapshot = self.snapshot("Merge layers");
        let merged = self.compositor.merge(ids)?;
        self.record(snapshot);
        Ok(merged)
    }

    pub fn reorder_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.compositor.reorder(from, to)
    }

    pub fn set_visibility(&mut self, id: LayerId, visible: bool) -> Result<()> {
        self.compositor.set_visibility(id, visible)
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> Result<()> {
        self.compositor.set_opacity(id, opacity)
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        self.compositor.rename(id, name)
    }

    pub fn set_locked(&mut self, id: LayerId, locked: bool) -> Result<()> {
        self.compositor.set_locked(id, locked)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> Result<()> {
        let previous = self.history.undo(self.snapshot("current"))?;
        tracing::debug!(description = %previous.description, "Undo");
        self.compositor.restore(previous.layers);
        self.content_revision += 1;
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let next = self.history.redo(self.snapshot("current"))?;
        tracing::debug!(description = %next.description, "Redo");
        self.compositor.restore(next.layers);
        self.content_revision += 1;
        Ok(())
    }

    pub fn execute(&mut self, command: DocumentCommand) -> Result<CommandOutcome> {
        match command {
            DocumentCommand::ExtractRegion { region, inversion } => {
                let id = self.extract_region(&region, inversion)?;
                Ok(CommandOutcome::LayerCreated { layer_id: id.to_string() })
            }
            DocumentCommand::ExtractLasso { points, view } => {
                let id = self.extract_lasso(&points, &view)?;
                Ok(CommandOutcome::LayerCreated { layer_id: id.to_string() })
            }
            DocumentCommand::FillLocal => {
                self.fill_local()?;
                Ok(self.changed())
            }
            DocumentCommand::DeleteLayer { layer_id } => {
                self.delete_layer(layer_id.parse()?)?;
                Ok(self.changed())
            }
            DocumentCommand::MergeLayers { layer_ids } => {
                let ids = layer_ids
                    .iter()
                    .map(|id| id.parse())
                    .collect::<Result<Vec<LayerId>>>()?;
                let id = self.merge_layers(&ids)?;
                Ok(CommandOutcome::LayerCreated { layer_id: id.to_string() })
            }
            DocumentCommand::ReorderLayer { from, to } => {
                self.reorder_layer(from, to)?;
                Ok(self.changed())
            }
            DocumentCommand::SetVisibility { layer_id, visible } => {
                self.set_visibility(layer_id.parse()?, visible)?;
                Ok(self.changed())
            }
            DocumentCommand::SetOpacity { layer_id, opacity } => {
                self.set_opacity(layer_id.parse()?, opacity)?;
                Ok(self.changed())
            }
            DocumentCommand::RenameLayer { layer_id, name } => {
                if name.trim().is_empty() {
                    return Err(CutoutError::precondition("layer name cannot be empty"));
                }
                self.rename_layer(layer_id.parse()?, name)?;
                Ok(self.changed())
            }
            DocumentCommand::SetLocked { layer_id, locked } => {
                self.set_locked(layer_id.parse()?, locked)?;
                Ok(self.changed())
            }
            DocumentCommand::Undo => {
                self.undo()?;
                Ok(self.changed())
            }
            DocumentCommand::Redo => {
                self.redo()?;
                Ok(self.changed())
            }
        }
    }

    fn changed(&self) -> CommandOutcome {
        CommandOutcome::Changed { revision: self.revision() }
    }
}
