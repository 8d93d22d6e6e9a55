//! # Cutout Layer Engine
//!
//! Pixel engine for turning regions of a photo into independent layers:
//! decode an upload, cut a detected region, lasso or brush selection out of
//! the base image, fill the hole it leaves behind and composite the result.
//!
//! ## Core Features
//!
//! - **Mask Geometry**: bounding boxes, nearest-neighbour remapping, dilation,
//!   Gaussian feathering and edge outlines
//! - **Region Extraction**: split a base image by a mask, with automatic
//!   inversion for background-style masks
//! - **Freehand Selection**: lasso polygons and soft/hard/dab brush strokes
//! - **Hole Filling**: deterministic local-average fill, plus letterboxed
//!   preparation of inputs for an external inpainting model
//! - **Layer Stack**: pinned base layer, merge, lock, opacity, cached render
//! - **History**: snapshot-based linear undo/redo
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cutout::{Document, ViewTransform};
//!
//! let mut document = Document::from_bytes(&std::fs::read("photo.png")?)?;
//! let (width, height) = document.dimensions();
//!
//! // Lasso in display coordinates
//! let view = ViewTransform::identity(width, height);
//! document.extract_lasso(&[[10.0, 10.0], [120.0, 15.0], [60.0, 90.0]], &view)?;
//!
//! // Patch the hole left in the base
//! document.fill_local()?;
//! let composite = document.render();
//! composite.save("composite.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Function-call contract
//!
//! ```rust,no_run
//! use cutout::{Document, DocumentCommand};
//!
//! # let mut document = Document::new(image::RgbaImage::new(4, 4));
//! let command: DocumentCommand = serde_json::from_str(r#"{"type":"undo"}"#)?;
//! let outcome = document.execute(command)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod config;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod io;
pub mod compositor;
pub mod history;
pub mod regions;
pub mod document;

// Re-exports for convenience
pub use error::{CutoutError, Result};
pub use config::EngineConfig;
pub use types::{Mask, NormalizedBox, PixelRect, ViewTransform};
pub use traits::*;
pub use algorithms::*;
pub use pipeline::{MaskPipeline, builder::MaskPipelineBuilder};
pub use io::*;
pub use compositor::{Compositor, Layer, LayerId, draw_layer};
pub use history::{History, Snapshot};
pub use regions::{
    DetectedRegion, ImageType, MaskCache, PromptMatch, Segmentation,
    classify_image_type, derive_fill_prompt, match_labels,
};
pub use document::{CommandOutcome, Document, DocumentCommand};
