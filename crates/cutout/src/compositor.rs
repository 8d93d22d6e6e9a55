//! Ordered layer stack with the base layer pinned at index 0.

use std::{fmt, str::FromStr, sync::Arc};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CutoutError, Result};

/// Opaque unique layer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LayerId {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(LayerId)
            .map_err(|_| CutoutError::LayerNotFound(s.to_string()))
    }
}

/// A layer's pixels are fixed at creation; only its presentation fields change.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    id: LayerId,
    name: String,
    image: Arc<RgbaImage>,
    position: (i32, i32),
    visible: bool,
    locked: bool,
    opacity: f32,
    created: u64,
    is_base: bool,
}

impl Layer {
    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Shared handle to the pixels, for callers that outlive a borrow
    pub fn image_arc(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.image)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Creation order within the document
    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn is_base(&self) -> bool {
        self.is_base
    }
}

/// Source-over blend of `image` onto `canvas` at `offset`, scaled by `opacity`
pub fn draw_layer(canvas: &mut RgbaImage, image: &RgbaImage, offset: (i32, i32), opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);

    for (x, y, src) in image.enumerate_pixels() {
        let dx = x as i64 + offset.0 as i64;
        let dy = y as i64 + offset.1 as i64;
        if dx < 0 || dy < 0 || dx >= cw || dy >= ch {
            continue;
        }
        let sa = src[3] as f32 / 255.0 * opacity;
        if sa <= 0.0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(dx as u32, dy as u32);
        let da = dst[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        let channel = |c: usize| {
            let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
            value.round().clamp(0.0, 255.0) as u8
        };
        *dst = Rgba([channel(0), channel(1), channel(2), (out_a * 255.0).round() as u8]);
    }
}

/// Layer stack, bottom (index 0, the base layer) to top.
#[derive(Debug, Clone)]
pub struct Compositor {
    layers: Vec<Layer>,
    next_order: u64,
    revision: u64,
    render_cache: Option<(u64, Arc<RgbaImage>)>,
}

impl Compositor {
    pub fn new(base_image: RgbaImage) -> Self {
        let base = Layer {
            id: LayerId::generate(),
            name: "Background".to_string(),
            image: Arc::new(base_image),
            position: (0, 0),
            visible: true,
            locked: false,
            opacity: 1.0,
            created: 0,
            is_base: true,
        };
        Self {
            layers: vec![base],
            next_order: 1,
            revision: 0,
            render_cache: None,
        }
    }

    /// Rebuild a stack from a snapshot's layer list
    pub(crate) fn restore(&mut self, layers: Vec<Layer>) {
        self.next_order = self
            .next_order
            .max(layers.iter().map(|l| l.created + 1).max().unwrap_or(1));
        self.layers = layers;
        self.touch();
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Incremented on every change to the stack
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn base(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn base_image(&self) -> &RgbaImage {
        self.layers[0].image()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    fn require_index(&self, id: LayerId) -> Result<usize> {
        self.index_of(id)
            .ok_or_else(|| CutoutError::LayerNotFound(id.to_string()))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        let index = self.require_index(id)?;
        Ok(&mut self.layers[index])
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.render_cache = None;
    }

    fn new_layer(&mut self, name: String, image: RgbaImage, position: (i32, i32)) -> Layer {
        let created = self.next_order;
        self.next_order += 1;
        Layer {
            id: LayerId::generate(),
            name,
            image: Arc::new(image),
            position,
            visible: true,
            locked: false,
            opacity: 1.0,
            created,
            is_base: false,
        }
    }

    /// Append a full-canvas layer at the top of the stack
    pub fn push_layer(&mut self, name: impl Into<String>, image: RgbaImage) -> LayerId {
        let layer = self.new_layer(name.into(), image, (0, 0));
        let id = layer.id;
        self.layers.push(layer);
        self.touch();
        id
    }

    /// Swap in new base pixels; the base layer keeps its id and position
    pub fn replace_base_image(&mut self, image: RgbaImage) -> Result<()> {
        let (expected_width, expected_height) = self.base().dimensions();
        if image.dimensions() != (expected_width, expected_height) {
            return Err(CutoutError::DimensionMismatch {
                expected_width,
                expected_height,
                width: image.width(),
                height: image.height(),
            });
        }
        self.layers[0].image = Arc::new(image);
        self.touch();
        Ok(())
    }

    pub fn delete(&mut self, id: LayerId) -> Result<Layer> {
        let index = self.require_index(id)?;
        let layer = &self.layers[index];
        if layer.is_base {
            return Err(CutoutError::precondition("the base layer cannot be deleted"));
        }
        if layer.locked {
            return Err(CutoutError::precondition(format!("layer '{}' is locked", layer.name)));
        }
        let removed = self.layers.remove(index);
        self.touch();
        tracing::debug!(layer = %removed.id, "Deleted layer");
        Ok(removed)
    }

    /// Move the layer at `from` to `to`; index 0 is reserved for the base layer
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.layers.len();
        if from >= len || to >= len {
            return Err(CutoutError::precondition(format!(
                "reorder {from} -> {to} is out of range for {len} layers"
            )));
        }
        if from == 0 || to == 0 {
            return Err(CutoutError::precondition("the base layer is fixed at the bottom"));
        }
        if from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
            self.touch();
        }
        Ok(())
    }

    pub fn set_visibility(&mut self, id: LayerId, visible: bool) -> Result<()> {
        self.layer_mut(id)?.visible = visible;
        self.touch();
        Ok(())
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> Result<()> {
        self.layer_mut(id)?.opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        self.touch();
        Ok(())
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        self.layer_mut(id)?.name = name.into();
        self.touch();
        Ok(())
    }

    pub fn set_locked(&mut self, id: LayerId, locked: bool) -> Result<()> {
        self.layer_mut(id)?.locked = locked;
        self.touch();
        Ok(())
    }

    /// Flatten `ids` into one layer placed where the topmost of them was.
    ///
    /// The canvas takes the size and position of the bottom-most selected
    /// layer; layers are drawn in stack order with their opacity.
    pub fn merge(&mut self, ids: &[LayerId]) -> Result<LayerId> {
        let mut indices = Vec::with_capacity(ids.len());
        for &id in ids {
            let index = self.require_index(id)?;
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
        if indices.len() < 2 {
            return Err(CutoutError::precondition(format!(
                "merge needs at least 2 layers, got {}",
                indices.len()
            )));
        }
        indices.sort_unstable();

        for &index in &indices {
            let layer = &self.layers[index];
            if layer.is_base {
                return Err(CutoutError::precondition("the base layer cannot be merged"));
            }
            if layer.locked {
                return Err(CutoutError::precondition(format!("layer '{}' is locked", layer.name)));
            }
        }

        let bottom = &self.layers[indices[0]];
        let (width, height) = bottom.dimensions();
        let origin = bottom.position;
        let mut canvas = RgbaImage::new(width, height);
        for &index in &indices {
            let layer = &self.layers[index];
            let offset = (layer.position.0 - origin.0, layer.position.1 - origin.1);
            draw_layer(&mut canvas, &layer.image, offset, layer.opacity);
        }

        let top_index = indices[indices.len() - 1];
        let name = format!("{} (merged)", self.layers[top_index].name);
        let merged = self.new_layer(name, canvas, origin);
        let merged_id = merged.id;

        for &index in indices.iter().rev() {
            self.layers.remove(index);
        }
        let insert_at = top_index + 1 - indices.len();
        self.layers.insert(insert_at, merged);
        self.touch();

        tracing::debug!(merged = indices.len(), layer = %merged_id, "Merged layers");
        Ok(merged_id)
    }

    /// Flatten every visible layer over a transparent canvas of the base size
    pub fn flatten(&self) -> RgbaImage {
        let (width, height) = self.base().dimensions();
        let mut canvas = RgbaImage::new(width, height);
        for layer in self.layers.iter().filter(|l| l.visible) {
            draw_layer(&mut canvas, &layer.image, layer.position, layer.opacity);
        }
        canvas
    }

    /// Cached [`flatten`](Self::flatten), recomputed after any stack change
    pub fn render(&mut self) -> Arc<RgbaImage> {
        if let Some((revision, image)) = &self.render_cache {
            if *revision == self.revision {
                return Arc::clone(image);
            }
        }
        let image = Arc::new(self.flatten());
        self.render_cache = Some((self.revision, Arc::clone(&image)));
        image
    }
}
