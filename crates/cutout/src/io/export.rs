use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::{compositor::Layer, document::Document, error::Result};

/// One backing layer of a layered export
#[derive(Debug, Clone)]
pub struct ExportLayer {
    pub name: String,
    pub position: (i32, i32),
    pub visible: bool,
    pub opacity: f32,
    pub is_base: bool,
    pub image: Arc<RgbaImage>,
    /// Non-destructive transparency mask derived from the layer alpha
    pub mask: GrayImage,
}

impl ExportLayer {
    fn from_layer(layer: &Layer) -> Self {
        let image = layer.image_arc();
        let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([image.get_pixel(x, y)[3]])
        });
        Self {
            name: layer.name().to_string(),
            position: layer.position(),
            visible: layer.is_visible(),
            opacity: layer.opacity(),
            is_base: layer.is_base(),
            image,
            mask,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Base image plus ordered layers (bottom first), ready for a container writer
#[derive(Debug, Clone)]
pub struct LayeredExport {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<ExportLayer>,
}

impl LayeredExport {
    pub fn from_document(document: &Document) -> Self {
        let (width, height) = document.dimensions();
        Self {
            width,
            height,
            layers: document.layers().iter().map(ExportLayer::from_layer).collect(),
        }
    }
}

/// Serializes a [`LayeredExport`] into some layered container
pub trait LayeredWriter {
    fn write(&self, export: &LayeredExport) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestLayer {
    pub name: String,
    pub image: String,
    pub mask: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub visible: bool,
    pub opacity: f32,
    pub is_base: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<ManifestLayer>,
}

pub const MANIFEST_FILE: &str = "manifest.json";

/// Writes `layer_NN.png`, `layer_NN_mask.png` and a `manifest.json` into a directory
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    root: PathBuf,
}

impl DirectoryWriter {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_manifest(&self) -> Result<Manifest> {
        let content = fs::read_to_string(self.root.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl LayeredWriter for DirectoryWriter {
    fn write(&self, export: &LayeredExport) -> Result<()> {
        fs::create_dir_all(&self.root)?;

        let mut entries = Vec::with_capacity(export.layers.len());
        for (index, layer) in export.layers.iter().enumerate() {
            let image_file = format!("layer_{index:02}.png");
            let mask_file = format!("layer_{index:02}_mask.png");
            layer.image.save(self.root.join(&image_file))?;
            layer.mask.save(self.root.join(&mask_file))?;

            let (width, height) = layer.dimensions();
            entries.push(ManifestLayer {
                name: layer.name.clone(),
                image: image_file,
                mask: mask_file,
                x: layer.position.0,
                y: layer.position.1,
                width,
                height,
                visible: layer.visible,
                opacity: layer.opacity,
                is_base: layer.is_base,
            });
        }

        let manifest = Manifest {
            width: export.width,
            height: export.height,
            layers: entries,
        };
        let file = File::create(self.root.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest)?;

        tracing::info!(layers = manifest.layers.len(), path = %self.root.display(), "Wrote layered export");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{algorithms::Inversion, types::ViewTransform};
    use image::Rgba;

    fn document_with_layer() -> Document {
        let mut document = Document::new(RgbaImage::from_pixel(10, 10, Rgba([20, 40, 60, 255])));
        let square = [[2.0, 2.0], [6.0, 2.0], [6.0, 6.0], [2.0, 6.0]];
        document.extract_lasso(&square, &ViewTransform::identity(10, 10)).unwrap();
        document
    }

    #[test]
    fn test_export_mask_follows_alpha() {
        let export = LayeredExport::from_document(&document_with_layer());
        assert_eq!(export.layers.len(), 2);
        assert!(export.layers[0].is_base);

        let cut = &export.layers[1];
        assert_eq!(cut.mask.get_pixel(3, 3)[0], 255);
        assert_eq!(cut.mask.get_pixel(8, 8)[0], 0);
        assert_eq!(export.layers[0].mask.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn test_directory_writer_round_trips_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DirectoryWriter::new(dir.path().join("out"));
        let mut document = document_with_layer();
        let id = document.layers()[1].id();
        document.set_opacity(id, 0.5).unwrap();
        document.set_visibility(id, false).unwrap();

        writer.write(&LayeredExport::from_document(&document)).unwrap();

        let manifest = writer.read_manifest().unwrap();
        assert_eq!((manifest.width, manifest.height), (10, 10));
        assert_eq!(manifest.layers[1].name, "Lasso selection");
        assert_eq!(manifest.layers[1].opacity, 0.5);
        assert!(!manifest.layers[1].visible);

        let mask = image::open(writer.root().join(&manifest.layers[1].mask)).unwrap().to_luma8();
        assert_eq!(mask.get_pixel(4, 4)[0], 255);
        assert!(writer.root().join("layer_00.png").exists());
    }

    #[test]
    fn test_inverted_extraction_exports_inverse_mask() {
        let mut document = Document::new(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
        let mask = GrayImage::from_fn(4, 4, |x, _| Luma([if x == 0 { 255 } else { 0 }]));
        document.extract_with_mask(&mask, "wall", Inversion::Always).unwrap();

        let export = LayeredExport::from_document(&document);
        assert_eq!(export.layers[1].mask.get_pixel(0, 0)[0], 0);
        assert_eq!(export.layers[1].mask.get_pixel(3, 0)[0], 255);
    }
}
