use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Greyscale membership grid: 255 = selected, 0 = excluded, in between = feathered.
pub type Mask = image::GrayImage;

/// Bounding box expressed as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl NormalizedBox {
    /// The "unknown bounds" answer for masks with no selected pixel
    pub const UNIT: NormalizedBox = NormalizedBox {
        xmin: 0.0,
        ymin: 0.0,
        xmax: 1.0,
        ymax: 1.0,
    };

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_unit(&self) -> bool {
        *self == Self::UNIT
    }
}

/// Inclusive pixel-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn normalized(&self, image_width: u32, image_height: u32) -> NormalizedBox {
        NormalizedBox {
            xmin: self.min_x as f32 / image_width as f32,
            ymin: self.min_y as f32 / image_height as f32,
            xmax: (self.max_x + 1) as f32 / image_width as f32,
            ymax: (self.max_y + 1) as f32 / image_height as f32,
        }
    }
}

/// Maps pointer positions on the scaled on-screen image back to native pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViewTransform {
    /// Top-left of the displayed image in display coordinates
    pub offset: [f32; 2],
    /// Displayed image size
    pub display_size: [f32; 2],
    /// Native image size
    pub native_size: [u32; 2],
}

impl ViewTransform {
    /// A 1:1 view with no offset
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            offset: [0.0, 0.0],
            display_size: [width as f32, height as f32],
            native_size: [width, height],
        }
    }

    pub fn scale(&self) -> [f32; 2] {
        let sx = if self.display_size[0] > 0.0 {
            self.native_size[0] as f32 / self.display_size[0]
        } else {
            1.0
        };
        let sy = if self.display_size[1] > 0.0 {
            self.native_size[1] as f32 / self.display_size[1]
        } else {
            1.0
        };
        [sx, sy]
    }

    pub fn to_native(&self, point: [f32; 2]) -> [f32; 2] {
        let [sx, sy] = self.scale();
        [
            (point[0] - self.offset[0]) * sx,
            (point[1] - self.offset[1]) * sy,
        ]
    }
}
